//! Builds the desired Knative Service that sits next to the model's
//! inference service and logs request/response pairs to the Kafka sink.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Probe, ResourceRequirements, TCPSocketAction};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::config::InferenceLoggerConfig;
use crate::crd::kafkatopic::inference_topic_name;
use crate::crd::knative::{RevisionSpec, RevisionTemplateSpec, Service, ServiceSpec};
use crate::crd::modelmonitor::{InferenceLoggerSpec, ModelMonitor, ResourcesSpec};
use crate::defaulting;
use crate::errors::Error;
use crate::utils::{env_var, union_labels};

pub const MODEL_LABEL: &str = "monitoring.model.dev/model";
pub const CONTAINER_NAME: &str = "modelmonitor-container";

pub const KAFKA_BROKERS_ENV: &str = "KAFKA_BROKERS";
pub const KAFKA_TOPIC_ENV: &str = "KAFKA_TOPIC";
pub const KAFKA_TOPIC_PARTITIONS_ENV: &str = "KAFKA_TOPIC_PARTITIONS";
pub const KAFKA_TOPIC_REPLICATION_FACTOR_ENV: &str = "KAFKA_TOPIC_REPLICATION_FACTOR";

pub const CLASS_ANNOTATION: &str = "autoscaling.knative.dev/class";
pub const METRIC_ANNOTATION: &str = "autoscaling.knative.dev/metric";
pub const TARGET_ANNOTATION: &str = "autoscaling.knative.dev/target";
pub const TARGET_UTILIZATION_ANNOTATION: &str = "autoscaling.knative.dev/targetUtilizationPercentage";
pub const WINDOW_ANNOTATION: &str = "autoscaling.knative.dev/window";
pub const PANIC_WINDOW_ANNOTATION: &str = "autoscaling.knative.dev/panicWindowPercentage";
pub const PANIC_THRESHOLD_ANNOTATION: &str = "autoscaling.knative.dev/panicThresholdPercentage";
pub const MIN_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/minScale";
pub const MAX_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/maxScale";

pub const DEFAULT_TIMEOUT_SECONDS: i64 = 300;

/// Parent annotations never forwarded to the revision template. Scale bounds
/// are owned by the spec, and kubectl's bookkeeping has no business there.
const DISALLOWED_ANNOTATIONS: &[&str] = &[
    MIN_SCALE_ANNOTATION,
    MAX_SCALE_ANNOTATION,
    "kubectl.kubernetes.io/last-applied-configuration",
];

pub struct InferenceLoggerBuilder<'a> {
    config: &'a InferenceLoggerConfig,
}

impl<'a> InferenceLoggerBuilder<'a> {
    pub fn new(config: &'a InferenceLoggerConfig) -> Self {
        InferenceLoggerBuilder { config }
    }

    /// Desired Knative Service for this monitor, or `None` when the parent
    /// carries no inferenceLogger section and any prior endpoint should go.
    pub fn desired_service(&self, name: &str, monitor: &ModelMonitor) -> Result<Option<Service>, Error> {
        let scaling = match &monitor.spec.inference_logger {
            Some(partial) => defaulting::fill_scaling(partial),
            None => return Ok(None),
        };

        let metadata = &monitor.metadata;
        let annotations = revision_annotations(metadata.annotations.as_ref(), &scaling);
        let template_labels = union_labels(
            metadata.labels.as_ref(),
            &[(MODEL_LABEL, &monitor.spec.model.name)],
        );

        let storage = &monitor.spec.storage;
        let topic = inference_topic_name(monitor);
        let partitions = storage.inference_log.partitions.unwrap_or(0);
        let replication_factor = storage.inference_log.replication_factor.unwrap_or(0);

        let container = Container {
            name: CONTAINER_NAME.to_owned(),
            image: Some(self.config.container_image.clone()),
            image_pull_policy: Some("Always".to_owned()),
            env: Some(vec![
                env_var(KAFKA_BROKERS_ENV, &storage.brokers),
                env_var(KAFKA_TOPIC_ENV, &topic),
                env_var(KAFKA_TOPIC_PARTITIONS_ENV, &partitions.to_string()),
                env_var(KAFKA_TOPIC_REPLICATION_FACTOR_ENV, &replication_factor.to_string()),
            ]),
            resources: Some(resource_requirements(&scaling.resources)),
            readiness_probe: Some(Probe {
                tcp_socket: Some(TCPSocketAction {
                    host: None,
                    port: IntOrString::Int(0),
                }),
                success_threshold: Some(1),
                ..Probe::default()
            }),
            ..Container::default()
        };

        let mut service = Service::new(
            name,
            ServiceSpec {
                template: RevisionTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(template_labels),
                        annotations: Some(annotations),
                        ..ObjectMeta::default()
                    }),
                    spec: RevisionSpec {
                        timeout_seconds: Some(DEFAULT_TIMEOUT_SECONDS),
                        container_concurrency: Some(i64::from(scaling.target)),
                        containers: vec![container],
                    },
                },
            },
        );
        service.metadata.namespace = metadata.namespace.clone();
        service.metadata.labels = metadata.labels.clone();

        Ok(Some(service))
    }
}

/// Autoscaling annotations for the revision template. Parent annotations are
/// forwarded first (minus the disallowed set) and always win; each scaling
/// key is then filled from the merged sub-spec.
fn revision_annotations(
    parent: Option<&BTreeMap<String, String>>,
    scaling: &InferenceLoggerSpec,
) -> BTreeMap<String, String> {
    let mut annotations: BTreeMap<String, String> = parent
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|(key, _)| !DISALLOWED_ANNOTATIONS.contains(&key.as_str()))
        .collect();

    let entries = [
        (CLASS_ANNOTATION, scaling.class.clone()),
        (METRIC_ANNOTATION, scaling.metric.clone()),
        (TARGET_ANNOTATION, scaling.target.to_string()),
        (TARGET_UTILIZATION_ANNOTATION, scaling.target_utilization.to_string()),
        (WINDOW_ANNOTATION, scaling.window.clone()),
        (PANIC_WINDOW_ANNOTATION, scaling.panic_window.to_string()),
        (PANIC_THRESHOLD_ANNOTATION, scaling.panic_threshold.to_string()),
        (MIN_SCALE_ANNOTATION, scaling.min_replicas.to_string()),
    ];
    for (key, value) in entries.iter() {
        annotations.entry(key.to_string()).or_insert_with(|| value.clone());
    }

    // Zero max keeps the endpoint unbounded, which Knative expresses by
    // omitting the annotation entirely.
    if scaling.max_replicas != 0 {
        annotations
            .entry(MAX_SCALE_ANNOTATION.to_owned())
            .or_insert_with(|| scaling.max_replicas.to_string());
    }

    annotations
}

fn resource_requirements(resources: &ResourcesSpec) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(quantity_map(&resources.requests)),
        limits: Some(quantity_map(&resources.limits)),
    }
}

fn quantity_map(values: &BTreeMap<String, String>) -> BTreeMap<String, Quantity> {
    values
        .iter()
        .map(|(key, value)| (key.clone(), Quantity(value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::modelmonitor::{ModelMonitorSpec, ModelSpec, StorageSpec, TopicSpec};
    use crate::defaulting::{DEFAULT_MIN_REPLICAS, DEFAULT_SCALING_CLASS, DEFAULT_SCALING_TARGET};

    fn logger_config() -> InferenceLoggerConfig {
        InferenceLoggerConfig {
            container_image: "registry/inference-logger:0.3.0".to_owned(),
        }
    }

    fn monitor(inference_logger: Option<InferenceLoggerSpec>) -> ModelMonitor {
        let mut monitor = ModelMonitor::new(
            "m1",
            ModelMonitorSpec {
                model: ModelSpec {
                    name: "m1".to_owned(),
                    ..ModelSpec::default()
                },
                storage: StorageSpec {
                    brokers: "kafka:9092".to_owned(),
                    inference_log: TopicSpec {
                        partitions: Some(3),
                        replication_factor: Some(2),
                        ..TopicSpec::default()
                    },
                    ..StorageSpec::default()
                },
                inference_logger,
                ..ModelMonitorSpec::default()
            },
        );
        monitor.metadata.namespace = Some("default".to_owned());
        monitor
    }

    fn annotations_of(service: &Service) -> BTreeMap<String, String> {
        service
            .spec
            .template
            .metadata
            .clone()
            .and_then(|metadata| metadata.annotations)
            .unwrap_or_default()
    }

    #[test]
    fn test_disabled_section_yields_no_service() {
        let config = logger_config();
        let desired = InferenceLoggerBuilder::new(&config)
            .desired_service("m1-inference-logger", &monitor(None))
            .unwrap();
        assert!(desired.is_none());
    }

    #[test]
    fn test_zero_fields_take_scaling_defaults() {
        let config = logger_config();
        let desired = InferenceLoggerBuilder::new(&config)
            .desired_service("m1-inference-logger", &monitor(Some(InferenceLoggerSpec::default())))
            .unwrap()
            .unwrap();

        let annotations = annotations_of(&desired);
        assert_eq!(
            annotations.get(TARGET_ANNOTATION).map(String::as_str),
            Some(DEFAULT_SCALING_TARGET.to_string().as_str())
        );
        assert_eq!(
            annotations.get(MIN_SCALE_ANNOTATION),
            Some(&DEFAULT_MIN_REPLICAS.to_string())
        );
        assert_eq!(annotations.get(CLASS_ANNOTATION).map(String::as_str), Some(DEFAULT_SCALING_CLASS));
        assert!(annotations.get(MAX_SCALE_ANNOTATION).is_none());
    }

    #[test]
    fn test_explicit_scaling_values_survive() {
        let config = logger_config();
        let scaling = InferenceLoggerSpec {
            target: 5,
            min_replicas: 2,
            max_replicas: 10,
            ..InferenceLoggerSpec::default()
        };
        let desired = InferenceLoggerBuilder::new(&config)
            .desired_service("m1-inference-logger", &monitor(Some(scaling)))
            .unwrap()
            .unwrap();

        let annotations = annotations_of(&desired);
        assert_eq!(annotations.get(TARGET_ANNOTATION).map(String::as_str), Some("5"));
        assert_eq!(annotations.get(MIN_SCALE_ANNOTATION).map(String::as_str), Some("2"));
        assert_eq!(annotations.get(MAX_SCALE_ANNOTATION).map(String::as_str), Some("10"));
        assert_eq!(desired.spec.template.spec.container_concurrency, Some(5));
    }

    #[test]
    fn test_parent_annotation_wins_over_spec() {
        let config = logger_config();
        let mut parent = monitor(Some(InferenceLoggerSpec {
            target: 5,
            ..InferenceLoggerSpec::default()
        }));
        let mut annotations = BTreeMap::new();
        annotations.insert(TARGET_ANNOTATION.to_owned(), "42".to_owned());
        annotations.insert(MIN_SCALE_ANNOTATION.to_owned(), "9".to_owned());
        parent.metadata.annotations = Some(annotations);

        let desired = InferenceLoggerBuilder::new(&config)
            .desired_service("m1-inference-logger", &parent)
            .unwrap()
            .unwrap();

        let annotations = annotations_of(&desired);
        // The explicit target annotation wins, while scale bounds are
        // disallowed pass-throughs and come from the sub-spec.
        assert_eq!(annotations.get(TARGET_ANNOTATION).map(String::as_str), Some("42"));
        assert_eq!(
            annotations.get(MIN_SCALE_ANNOTATION),
            Some(&DEFAULT_MIN_REPLICAS.to_string())
        );
    }

    #[test]
    fn test_kafka_env_contract() {
        let config = logger_config();
        let desired = InferenceLoggerBuilder::new(&config)
            .desired_service("m1-inference-logger", &monitor(Some(InferenceLoggerSpec::default())))
            .unwrap()
            .unwrap();

        let env = desired.spec.template.spec.containers[0].env.clone().unwrap();
        let lookup = |name: &str| {
            env.iter()
                .find(|entry| entry.name == name)
                .and_then(|entry| entry.value.clone())
        };
        assert_eq!(lookup(KAFKA_BROKERS_ENV).as_deref(), Some("kafka:9092"));
        assert_eq!(lookup(KAFKA_TOPIC_ENV).as_deref(), Some("m1-topic"));
        assert_eq!(lookup(KAFKA_TOPIC_PARTITIONS_ENV).as_deref(), Some("3"));
        assert_eq!(lookup(KAFKA_TOPIC_REPLICATION_FACTOR_ENV).as_deref(), Some("2"));
    }

    #[test]
    fn test_translation_is_deterministic() {
        let config = logger_config();
        let parent = monitor(Some(InferenceLoggerSpec::default()));
        let builder = InferenceLoggerBuilder::new(&config);

        let first = builder.desired_service("m1-inference-logger", &parent).unwrap();
        let second = builder.desired_service("m1-inference-logger", &parent).unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}

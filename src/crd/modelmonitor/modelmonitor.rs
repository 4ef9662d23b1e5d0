use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Represents the 'spec' field of a ModelMonitor resource
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "monitoring.model.dev",
    version = "v1beta1",
    kind = "ModelMonitor",
    plural = "modelmonitors",
    shortname = "modelmonitor",
    status = "ModelMonitorStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ModelMonitorSpec {
    pub model: ModelSpec,
    #[serde(default)]
    pub monitoring: MonitoringSpec,
    pub storage: StorageSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_logger: Option<InferenceLoggerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobSpec>,
}

/// Identity of the model being monitored. The name should match the
/// inference service the logged requests come from.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<ModelSchemasSpec>,
}

/// References to the schemas of the traffic being logged.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelSchemasSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerSpec>,
    #[serde(default)]
    pub stats: Vec<StatSpec>,
    #[serde(default)]
    pub outliers: Vec<OutlierSpec>,
    #[serde(default)]
    pub drift: Vec<DriftSpec>,
}

impl MonitoringSpec {
    /// The analysis job only runs when at least one detector is configured.
    pub fn is_enabled(&self) -> bool {
        !self.stats.is_empty() || !self.outliers.is_empty() || !self.drift.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSpec {
    pub window: WindowSpec,
}

/// Streaming window the analysis job aggregates over, all in milliseconds.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    pub duration: i64,
    pub slide: i64,
    pub watermark_delay: i64,
}

/// A named statistic over the logged traffic
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatSpec {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// A named outlier detector
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutlierSpec {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// A named drift detector with its alerting threshold
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriftSpec {
    pub name: String,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub show_all: bool,
}

/// Destinations of the logged traffic and of each analysis stream.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    pub brokers: String,
    #[serde(default)]
    pub inference_log: TopicSpec,
    #[serde(default)]
    pub analysis: AnalysisSinksSpec,
}

/// A topic descriptor. Partitions and replication factor left unset are
/// defaulted by the messaging layer, not by this controller.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<i16>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSinksSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TopicSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outliers: Option<TopicSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<TopicSpec>,
}

/// Scaling and sizing of the inference logger endpoint. Zero or empty
/// fields are filled with the static defaults at translation time.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InferenceLoggerSpec {
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub target: i32,
    #[serde(default)]
    pub target_utilization: i32,
    #[serde(default)]
    pub window: String,
    #[serde(default)]
    pub panic_window: i32,
    #[serde(default)]
    pub panic_threshold: i32,
    #[serde(default)]
    pub min_replicas: i32,
    #[serde(default)]
    pub max_replicas: i32,
    #[serde(default)]
    pub resources: ResourcesSpec,
}

/// Compute resources as quantity strings, mirroring the core
/// ResourceRequirements shape.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// Sizing overrides for the analysis job
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub driver: DriverSpec,
    #[serde(default)]
    pub executor: ExecutorSpec,
    #[serde(default)]
    pub expose_metrics: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriverSpec {
    #[serde(default)]
    pub cores: i32,
    #[serde(default)]
    pub core_limit: String,
    #[serde(default)]
    pub memory: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorSpec {
    #[serde(default)]
    pub cores: i32,
    #[serde(default)]
    pub core_limit: String,
    #[serde(default)]
    pub memory: String,
    #[serde(default)]
    pub instances: i32,
}

/// Represents the observed state of a ModelMonitor resource
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelMonitorStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_enabled_only_with_detectors() {
        let mut monitoring = MonitoringSpec::default();
        assert!(!monitoring.is_enabled());

        monitoring.stats.push(StatSpec {
            name: "mean".to_owned(),
            params: BTreeMap::new(),
        });
        assert!(monitoring.is_enabled());

        let drift_only = MonitoringSpec {
            drift: vec![DriftSpec {
                name: "wasserstein".to_owned(),
                threshold: 2.5,
                show_all: false,
            }],
            ..MonitoringSpec::default()
        };
        assert!(drift_only.is_enabled());
    }

    #[test]
    fn test_spec_parses_with_minimal_sections() {
        let spec: ModelMonitorSpec = serde_json::from_value(serde_json::json!({
            "model": { "name": "m1" },
            "storage": { "brokers": "kafka:9092" }
        }))
        .unwrap();

        assert_eq!(spec.model.name, "m1");
        assert!(spec.inference_logger.is_none());
        assert!(spec.job.is_none());
        assert!(!spec.monitoring.is_enabled());
        assert_eq!(spec.storage.inference_log, TopicSpec::default());
    }
}

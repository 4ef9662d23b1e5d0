use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::modelmonitor::{ModelMonitor, ResourceFamily};

/// Strimzi-style topic resource for the inference log sink.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta2",
    kind = "KafkaTopic",
    status = "KafkaTopicStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaTopicSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaTopicStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_name: Option<String>,
}

/// Default topic name for a model's inference log, used whenever the topic
/// descriptor does not name one explicitly.
pub fn default_topic_name(model_name: &str) -> String {
    ResourceFamily::KafkaTopic.default_name(model_name)
}

/// Resolved name of the inference-log topic for this monitor.
pub fn inference_topic_name(monitor: &ModelMonitor) -> String {
    monitor
        .spec
        .storage
        .inference_log
        .name
        .clone()
        .unwrap_or_else(|| default_topic_name(&monitor.spec.model.name))
}

/// Desired topic object for the inference log sink. Partition count and
/// replication factor left unset in the descriptor stay unset here and are
/// defaulted by the messaging layer.
pub fn desired_topic(name: &str, monitor: &ModelMonitor) -> KafkaTopic {
    let descriptor = &monitor.spec.storage.inference_log;

    let mut topic = KafkaTopic::new(
        name,
        KafkaTopicSpec {
            topic_name: Some(name.to_owned()),
            partitions: descriptor.partitions,
            replicas: descriptor.replication_factor.map(i32::from),
            config: None,
        },
    );
    topic.metadata.namespace = monitor.metadata.namespace.clone();
    topic.metadata.labels = monitor.metadata.labels.clone();
    topic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::modelmonitor::{ModelMonitorSpec, ModelSpec, StorageSpec, TopicSpec};

    fn monitor_with_descriptor(descriptor: TopicSpec) -> ModelMonitor {
        ModelMonitor::new(
            "m1",
            ModelMonitorSpec {
                model: ModelSpec {
                    name: "fraud-model".to_owned(),
                    ..ModelSpec::default()
                },
                storage: StorageSpec {
                    brokers: "kafka:9092".to_owned(),
                    inference_log: descriptor,
                    ..StorageSpec::default()
                },
                ..ModelMonitorSpec::default()
            },
        )
    }

    #[test]
    fn test_topic_name_defaults_from_model_name() {
        let monitor = monitor_with_descriptor(TopicSpec::default());
        assert_eq!(inference_topic_name(&monitor), "fraud-model-topic");
    }

    #[test]
    fn test_topic_name_from_descriptor_wins() {
        let monitor = monitor_with_descriptor(TopicSpec {
            name: Some("custom-log".to_owned()),
            ..TopicSpec::default()
        });
        assert_eq!(inference_topic_name(&monitor), "custom-log");
    }

    #[test]
    fn test_unset_sizing_stays_unset() {
        let monitor = monitor_with_descriptor(TopicSpec::default());
        let topic = desired_topic("fraud-model-topic", &monitor);
        assert_eq!(topic.spec.partitions, None);
        assert_eq!(topic.spec.replicas, None);
    }

    #[test]
    fn test_descriptor_sizing_is_copied() {
        let monitor = monitor_with_descriptor(TopicSpec {
            partitions: Some(6),
            replication_factor: Some(3),
            ..TopicSpec::default()
        });
        let topic = desired_topic("fraud-model-topic", &monitor);
        assert_eq!(topic.spec.partitions, Some(6));
        assert_eq!(topic.spec.replicas, Some(3));
    }
}

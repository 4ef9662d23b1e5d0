//! Generic converge loop for the dependent objects of a ModelMonitor:
//! fetch the current object and create, update or delete it so that it
//! matches the desired definition. Conflicts are surfaced to the caller's
//! requeue mechanism, never retried here.

use std::fmt::Debug;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    api::{Api, DeleteParams, PostParams},
    Resource,
};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::Error;

/// Child resource kinds the converge loop can manage. The projection covers
/// exactly the fields this controller owns: the object spec and its labels.
/// Everything else on the persisted object belongs to the API server or to
/// the child's own operator and must survive an update untouched.
pub trait Convergeable:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug
{
    /// The object's spec as a JSON document.
    fn spec_value(&self) -> Value;

    /// Copy the reconciled fields onto the existing object, leaving the
    /// store's bookkeeping metadata (uid, resourceVersion, system fields)
    /// alone.
    fn overwrite_reconciled_fields(desired: &Self, existing: &mut Self);
}

/// Compare the reconciled projections of two objects, ignoring unset-vs-empty
/// differences introduced by the store's normalization.
pub fn semantic_equals<K: Convergeable>(desired: &K, existing: &K) -> bool {
    let desired_labels = desired.meta().labels.clone().unwrap_or_default();
    let existing_labels = existing.meta().labels.clone().unwrap_or_default();
    desired_labels == existing_labels && semantic_value_eq(&desired.spec_value(), &existing.spec_value())
}

/// Semantic JSON equality in the spirit of apimachinery's semantic
/// DeepEqual: null members, empty maps and empty arrays compare equal to
/// their absence.
pub fn semantic_value_eq(a: &Value, b: &Value) -> bool {
    prune(a) == prune(b)
}

fn prune(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .iter()
                .map(|(key, member)| (key.clone(), prune(member)))
                .filter(|(_, member)| !is_empty(member))
                .collect();
            Value::Object(pruned)
        }
        Value::Array(items) => Value::Array(items.iter().map(prune).collect()),
        other => other.clone(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists")
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409)
}

/// Converge the object at `name` towards `desired`. A `None` desired state
/// deletes any existing object with background propagation; dependents are
/// collected asynchronously by the store. Returns the observed state, or
/// `None` once nothing remains.
pub async fn converge<K: Convergeable>(
    api: &Api<K>,
    owner: &OwnerReference,
    name: &str,
    desired: Option<K>,
) -> Result<Option<K>, Error> {
    let kind = K::kind(&()).to_string();

    let mut desired = match desired {
        Some(desired) => desired,
        None => return finalize(api, &kind, name).await,
    };

    // The back reference must be in place before the object is persisted,
    // so that a deleted parent always garbage-collects its children.
    desired
        .meta_mut()
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(owner.clone());

    let existing = match api.get(name).await {
        Ok(existing) => existing,
        Err(err) if is_not_found(&err) => {
            info!("Creating {} '{}'", kind, name);
            return match api.create(&PostParams::default(), &desired).await {
                Ok(created) => Ok(Some(created)),
                // Lost a creation race: the object is there, which is all
                // this cycle needs. The next cycle diffs against it.
                Err(err) if is_already_exists(&err) => Ok(Some(desired)),
                Err(source) => Err(Error::ApiError {
                    action: "create",
                    kind,
                    name: name.to_owned(),
                    source,
                }),
            };
        }
        Err(source) => {
            return Err(Error::LookupError {
                kind,
                name: name.to_owned(),
                source,
            })
        }
    };

    if semantic_equals(&desired, &existing) {
        return Ok(Some(existing));
    }

    let mut updated = existing;
    K::overwrite_reconciled_fields(&desired, &mut updated);

    info!("Updating {} '{}'", kind, name);
    match api.replace(name, &PostParams::default(), &updated).await {
        Ok(current) => Ok(Some(current)),
        Err(err) if is_conflict(&err) => Err(Error::ConflictError {
            kind,
            name: name.to_owned(),
        }),
        Err(source) => Err(Error::ApiError {
            action: "update",
            kind,
            name: name.to_owned(),
            source,
        }),
    }
}

/// Delete the object at `name` if it still exists. Absence, observed before
/// or during the delete, counts as success.
async fn finalize<K: Convergeable>(api: &Api<K>, kind: &str, name: &str) -> Result<Option<K>, Error> {
    match api.get(name).await {
        Ok(_) => (),
        Err(err) if is_not_found(&err) => return Ok(None),
        Err(source) => {
            return Err(Error::LookupError {
                kind: kind.to_owned(),
                name: name.to_owned(),
                source,
            })
        }
    }

    info!("Deleting {} '{}'", kind, name);
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => Ok(None),
        Err(err) if is_not_found(&err) => Ok(None),
        Err(source) => Err(Error::ApiError {
            action: "delete",
            kind: kind.to_owned(),
            name: name.to_owned(),
            source,
        }),
    }
}

impl Convergeable for crate::crd::knative::Service {
    fn spec_value(&self) -> Value {
        serde_json::to_value(&self.spec).unwrap_or_default()
    }

    fn overwrite_reconciled_fields(desired: &Self, existing: &mut Self) {
        existing.spec = desired.spec.clone();
        existing.metadata.labels = desired.metadata.labels.clone();
    }
}

impl Convergeable for crate::crd::sparkapp::SparkApplication {
    fn spec_value(&self) -> Value {
        serde_json::to_value(&self.spec).unwrap_or_default()
    }

    fn overwrite_reconciled_fields(desired: &Self, existing: &mut Self) {
        existing.spec = desired.spec.clone();
        existing.metadata.labels = desired.metadata.labels.clone();
    }
}

impl Convergeable for crate::crd::kafkatopic::KafkaTopic {
    fn spec_value(&self) -> Value {
        serde_json::to_value(&self.spec).unwrap_or_default()
    }

    fn overwrite_reconciled_fields(desired: &Self, existing: &mut Self) {
        existing.spec = desired.spec.clone();
        existing.metadata.labels = desired.metadata.labels.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::kafkatopic::{KafkaTopic, KafkaTopicSpec};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn topic(name: &str, partitions: Option<i32>) -> KafkaTopic {
        KafkaTopic::new(
            name,
            KafkaTopicSpec {
                topic_name: Some(name.to_owned()),
                partitions,
                replicas: None,
                config: None,
            },
        )
    }

    #[test]
    fn test_semantic_value_eq_ignores_unset_vs_empty() {
        assert!(semantic_value_eq(
            &json!({"labels": {}, "partitions": 3}),
            &json!({"partitions": 3})
        ));
        assert!(semantic_value_eq(&json!({"config": null}), &json!({})));
        assert!(!semantic_value_eq(&json!({"partitions": 3}), &json!({"partitions": 4})));
    }

    #[test]
    fn test_semantic_equals_ignores_missing_label_map() {
        let desired = topic("m1-topic", Some(3));
        let mut existing = topic("m1-topic", Some(3));
        existing.metadata.labels = Some(BTreeMap::new());
        existing.metadata.resource_version = Some("42".to_owned());

        assert!(semantic_equals(&desired, &existing));
    }

    #[test]
    fn test_semantic_equals_detects_spec_divergence() {
        let desired = topic("m1-topic", Some(6));
        let existing = topic("m1-topic", Some(3));
        assert!(!semantic_equals(&desired, &existing));
    }

    #[test]
    fn test_semantic_equals_detects_label_divergence() {
        let desired = {
            let mut topic = topic("m1-topic", Some(3));
            topic.metadata.labels = Some(
                vec![("app".to_owned(), "monitoring".to_owned())]
                    .into_iter()
                    .collect(),
            );
            topic
        };
        let existing = topic("m1-topic", Some(3));
        assert!(!semantic_equals(&desired, &existing));
    }

    #[test]
    fn test_overwrite_preserves_bookkeeping_metadata() {
        let desired = topic("m1-topic", Some(6));
        let mut existing = topic("m1-topic", Some(3));
        existing.metadata.resource_version = Some("42".to_owned());
        existing.metadata.uid = Some("abc-123".to_owned());

        KafkaTopic::overwrite_reconciled_fields(&desired, &mut existing);
        assert_eq!(existing.spec.partitions, Some(6));
        assert_eq!(existing.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(existing.metadata.uid.as_deref(), Some("abc-123"));
    }
}

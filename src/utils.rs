use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::EnvVar,
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference},
};
use kube::api::Resource;

use crate::errors::Error;

/// Build the controller-owner back reference pointing at `meta`'s object.
pub fn object_to_owner_reference<K: Resource<DynamicType = ()>>(
    meta: ObjectMeta,
) -> Result<OwnerReference, Error> {
    Ok(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: meta.name.ok_or(Error::MissingKey(".metadata.name"))?,
        uid: meta.uid.ok_or(Error::MissingKey(".metadata.uid"))?,
        controller: Some(true),
        block_owner_deletion: Some(true),
        ..OwnerReference::default()
    })
}

pub fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

/// Union of the parent's labels and a set of controller-managed entries.
/// Controller entries win on key collisions.
pub fn union_labels(base: Option<&BTreeMap<String, String>>, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut labels = base.cloned().unwrap_or_default();
    for (key, value) in extra {
        labels.insert(key.to_string(), value.to_string());
    }
    labels
}

//! Ensures the identity the analysis job runs under: a service account, a
//! role over pod and service resources, and the binding between the two.
//! All three are named from a fixed assignee, so every monitor in a
//! namespace shares one triplet. They are created at most once and never
//! reconciled afterwards.

use std::collections::BTreeMap;
use std::fmt::Debug;

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, PostParams},
    Client, Resource,
};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::Error;

/// The fixed identity analysis jobs execute under.
pub const MONITORING_JOB_ASSIGNEE: &str = "monitoring-job";

const ROLE_VERBS: &[&str] = &["get", "list", "watch", "create", "delete"];
const ROLE_RESOURCES: &[&str] = &["pods", "services"];

pub fn default_service_account_name(assignee: &str) -> String {
    format!("{}-service-account", assignee)
}

pub fn default_role_name(assignee: &str) -> String {
    format!("{}-role", assignee)
}

pub fn default_role_binding_name(assignee: &str) -> String {
    format!("{}-role-binding", assignee)
}

/// Builder for the permission triplet of one assignee
pub struct PermissionsBuilder {
    pub assignee: &'static str,
}

impl PermissionsBuilder {
    pub fn new() -> Self {
        PermissionsBuilder {
            assignee: MONITORING_JOB_ASSIGNEE,
        }
    }

    fn metadata(&self, name: String, namespace: &str, labels: Option<&BTreeMap<String, String>>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(namespace.to_owned()),
            labels: labels.cloned(),
            ..ObjectMeta::default()
        }
    }

    pub fn service_account(&self, namespace: &str, labels: Option<&BTreeMap<String, String>>) -> ServiceAccount {
        ServiceAccount {
            metadata: self.metadata(default_service_account_name(self.assignee), namespace, labels),
            ..ServiceAccount::default()
        }
    }

    pub fn role(&self, namespace: &str, labels: Option<&BTreeMap<String, String>>) -> Role {
        Role {
            metadata: self.metadata(default_role_name(self.assignee), namespace, labels),
            rules: Some(
                ROLE_RESOURCES
                    .iter()
                    .map(|resource| PolicyRule {
                        api_groups: Some(vec!["".to_owned()]),
                        resources: Some(vec![resource.to_string()]),
                        verbs: ROLE_VERBS.iter().map(|verb| verb.to_string()).collect(),
                        ..PolicyRule::default()
                    })
                    .collect(),
            ),
        }
    }

    pub fn role_binding(&self, namespace: &str, labels: Option<&BTreeMap<String, String>>) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata(default_role_binding_name(self.assignee), namespace, labels),
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_owned(),
                name: default_service_account_name(self.assignee),
                namespace: Some(namespace.to_owned()),
                ..Subject::default()
            }]),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_owned(),
                kind: "Role".to_owned(),
                name: default_role_name(self.assignee),
            },
        }
    }

    /// Make sure the whole triplet exists, in order: service account, role,
    /// binding. Any failure other than a lost already-exists race aborts the
    /// sequence; the dependent job must not be submitted without it.
    pub async fn ensure(
        &self,
        client: &Client,
        namespace: &str,
        labels: Option<&BTreeMap<String, String>>,
    ) -> Result<String, Error> {
        let service_account_name = default_service_account_name(self.assignee);

        let service_accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
        self.ensure_exists(
            &service_accounts,
            &service_account_name,
            self.service_account(namespace, labels),
        )
        .await?;

        let roles: Api<Role> = Api::namespaced(client.clone(), namespace);
        self.ensure_exists(&roles, &default_role_name(self.assignee), self.role(namespace, labels))
            .await?;

        let role_bindings: Api<RoleBinding> = Api::namespaced(client.clone(), namespace);
        self.ensure_exists(
            &role_bindings,
            &default_role_binding_name(self.assignee),
            self.role_binding(namespace, labels),
        )
        .await?;

        Ok(service_account_name)
    }

    async fn ensure_exists<K>(&self, api: &Api<K>, name: &str, desired: K) -> Result<(), Error>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        let kind = K::kind(&()).to_string();

        match api.get(name).await {
            Ok(_) => return Ok(()),
            Err(err) if is_not_found(&err) => (),
            Err(source) => {
                return Err(Error::ProvisioningError {
                    kind,
                    name: name.to_owned(),
                    assignee: self.assignee,
                    source,
                })
            }
        }

        info!("Creating {} '{}' for assignee '{}'", kind, name, self.assignee);
        match api.create(&PostParams::default(), &desired).await {
            Ok(_) => Ok(()),
            // Another reconcile provisioned it first, which is just as good.
            Err(err) if is_already_exists(&err) => Ok(()),
            Err(source) => Err(Error::ProvisioningError {
                kind,
                name: name.to_owned(),
                assignee: self.assignee,
                source,
            }),
        }
    }
}

impl Default for PermissionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_names_derive_from_assignee() {
        assert_eq!(default_service_account_name("monitoring-job"), "monitoring-job-service-account");
        assert_eq!(default_role_name("monitoring-job"), "monitoring-job-role");
        assert_eq!(default_role_binding_name("monitoring-job"), "monitoring-job-role-binding");
    }

    #[test]
    fn test_role_grants_fixed_verbs_over_pods_and_services() {
        let role = PermissionsBuilder::new().role("default", None);
        let rules = role.rules.unwrap();
        assert_eq!(rules.len(), 2);

        let resources: Vec<String> = rules
            .iter()
            .flat_map(|rule| rule.resources.clone().unwrap_or_default())
            .collect();
        assert_eq!(resources, vec!["pods".to_owned(), "services".to_owned()]);
        for rule in &rules {
            assert_eq!(rule.verbs.len(), ROLE_VERBS.len());
        }
    }

    #[test]
    fn test_binding_links_account_to_role() {
        let builder = PermissionsBuilder::new();
        let binding = builder.role_binding("default", None);

        assert_eq!(binding.role_ref.name, default_role_name(MONITORING_JOB_ASSIGNEE));
        let subjects = binding.subjects.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, default_service_account_name(MONITORING_JOB_ASSIGNEE));
        assert_eq!(subjects[0].namespace.as_deref(), Some("default"));
    }
}

pub mod modelmonitor;
pub use modelmonitor::*;

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Context};
use kube::{Client, Resource, ResourceExt};
use log::{error, warn};
use serde_json::json;

use crate::config::MonitorConfig;
use crate::crd::kafkatopic::{self, KafkaTopic};
use crate::crd::knative;
use crate::crd::sparkapp::SparkApplication;
use crate::errors::Error;
use crate::inference_logger::InferenceLoggerBuilder;
use crate::monitoring_job::MonitoringJobBuilder;
use crate::permissions::PermissionsBuilder;
use crate::reconcile::converge;
use crate::utils::object_to_owner_reference;
use crate::{metrics, ControllerContext};

/// Closed set of resource families managed for one ModelMonitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceFamily {
    InferenceLogger,
    MonitoringJob,
    KafkaTopic,
    Permissions,
}

impl ResourceFamily {
    /// Families converged from a translated desired object. Permissions are
    /// provisioned from within the job family, never converged.
    pub const CHILDREN: [ResourceFamily; 3] = [
        ResourceFamily::InferenceLogger,
        ResourceFamily::KafkaTopic,
        ResourceFamily::MonitoringJob,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            ResourceFamily::InferenceLogger => "inference-logger",
            ResourceFamily::MonitoringJob => "monitoring-job",
            ResourceFamily::KafkaTopic => "topic",
            ResourceFamily::Permissions => "permissions",
        }
    }

    /// Deterministic child name: the owning name plus the family suffix.
    pub fn default_name(&self, owner: &str) -> String {
        format!("{}-{}", owner, self.suffix())
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            ResourceFamily::InferenceLogger => "inference_logger",
            ResourceFamily::MonitoringJob => "monitoring_job",
            ResourceFamily::KafkaTopic => "kafka_topic",
            ResourceFamily::Permissions => "permissions",
        }
    }
}

pub async fn reconcile(monitor: Arc<ModelMonitor>, ctx: Context<ControllerContext>) -> Result<Action, Error> {
    let context = ctx.get_ref();
    reconcile_modelmonitor(&monitor, &context.client, &context.config).await?;
    patch_monitor_status(&monitor, &context.client).await;
    Ok(Action::requeue(Duration::from_secs(context.requeue_seconds)))
}

pub fn error_policy(error: &Error, _ctx: Context<ControllerContext>) -> Action {
    error!("Reconcile failed: {:?}", error);
    metrics::error_happened("reconcile");
    Action::requeue(Duration::from_secs(5))
}

/// Converge every child family of this monitor. A failing family does not
/// keep its siblings from reconciling; the first error is reported at the
/// end so the outer dispatch requeues the parent.
pub async fn reconcile_modelmonitor(
    monitor: &ModelMonitor,
    client: &Client,
    config: &MonitorConfig,
) -> Result<(), Error> {
    let namespace = monitor
        .namespace()
        .ok_or(Error::MissingKey(".metadata.namespace"))?;
    let owner = object_to_owner_reference::<ModelMonitor>(monitor.meta().clone())?;

    let mut first_failure = None;
    for family in ResourceFamily::CHILDREN.iter().copied() {
        let result = match family {
            ResourceFamily::InferenceLogger => {
                reconcile_inference_logger(monitor, &namespace, client, config, &owner).await
            }
            ResourceFamily::KafkaTopic => reconcile_kafka_topic(monitor, &namespace, client, &owner).await,
            ResourceFamily::MonitoringJob => {
                reconcile_monitoring_job(monitor, &namespace, client, config, &owner).await
            }
            ResourceFamily::Permissions => Ok(()),
        };

        if let Err(err) = result {
            error!(
                "Failed reconciling {} of ModelMonitor '{}': {}",
                family.as_label(),
                monitor.name(),
                err
            );
            metrics::reconcile_failed(family.as_label());
            if first_failure.is_none() {
                first_failure = Some(err);
            }
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn reconcile_inference_logger(
    monitor: &ModelMonitor,
    namespace: &str,
    client: &Client,
    config: &MonitorConfig,
    owner: &OwnerReference,
) -> Result<(), Error> {
    let name = ResourceFamily::InferenceLogger.default_name(&monitor.name());
    let desired = InferenceLoggerBuilder::new(&config.inference_logger).desired_service(&name, monitor)?;

    let services: Api<knative::Service> = Api::namespaced(client.clone(), namespace);
    converge(&services, owner, &name, desired).await?;
    Ok(())
}

async fn reconcile_kafka_topic(
    monitor: &ModelMonitor,
    namespace: &str,
    client: &Client,
    owner: &OwnerReference,
) -> Result<(), Error> {
    let name = kafkatopic::inference_topic_name(monitor);
    let desired = kafkatopic::desired_topic(&name, monitor);

    let topics: Api<KafkaTopic> = Api::namespaced(client.clone(), namespace);
    converge(&topics, owner, &name, Some(desired)).await?;
    Ok(())
}

async fn reconcile_monitoring_job(
    monitor: &ModelMonitor,
    namespace: &str,
    client: &Client,
    config: &MonitorConfig,
    owner: &OwnerReference,
) -> Result<(), Error> {
    let name = ResourceFamily::MonitoringJob.default_name(&monitor.name());
    let desired = MonitoringJobBuilder::new(&config.job).desired_spark_app(&name, monitor)?;

    // The job must never be submitted before its identity and permissions
    // are in place.
    if desired.is_some() {
        PermissionsBuilder::new()
            .ensure(client, namespace, monitor.meta().labels.as_ref())
            .await?;
    }

    let jobs: Api<SparkApplication> = Api::namespaced(client.clone(), namespace);
    converge(&jobs, owner, &name, desired).await?;
    Ok(())
}

/// Record the generation this cycle converged. Status is best effort; a
/// failing patch only logs and counts.
async fn patch_monitor_status(monitor: &ModelMonitor, client: &Client) {
    let namespace = match monitor.namespace() {
        Some(namespace) => namespace,
        None => return,
    };
    let monitors: Api<ModelMonitor> = Api::namespaced(client.clone(), &namespace);

    let status = json!({
        "status": ModelMonitorStatus {
            observed_generation: monitor.metadata.generation,
        }
    });
    if let Err(err) = monitors
        .patch_status(&monitor.name(), &PatchParams::default(), &Patch::Merge(&status))
        .await
    {
        warn!("Failed to patch status of ModelMonitor '{}': {:?}", monitor.name(), err);
        metrics::kube_error_happened("patch_status", &err);
    }
}

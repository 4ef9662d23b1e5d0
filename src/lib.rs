use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Context, Controller};
use kube::Client;
use log::{debug, warn};
use serde::Deserialize;

pub mod config;
pub mod crd;
pub mod defaulting;
pub mod errors;
pub mod inference_logger;
pub mod metrics;
pub mod monitoring_job;
pub mod permissions;
pub mod reconcile;
pub mod utils;
pub mod views;

pub use crate::config::MonitorConfig;
pub use crate::crd::modelmonitor::{ModelMonitor, ResourceFamily};
pub use crate::errors::Error;

#[derive(Deserialize, Debug, Clone)]
pub struct MonitorEnvironmentConfig {
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_config_map")]
    pub config_map: String,
    #[serde(default = "default_requeue_seconds")]
    pub requeue_seconds: u64,
}

fn default_server_host() -> String {
    "0.0.0.0".to_owned()
}
fn default_server_port() -> u16 {
    8888
}
fn default_namespace() -> String {
    "model-monitoring-system".to_owned()
}
fn default_config_map() -> String {
    "model-monitoring-modelmonitor-config".to_owned()
}
fn default_requeue_seconds() -> u64 {
    300
}

impl Default for MonitorEnvironmentConfig {
    fn default() -> Self {
        MonitorEnvironmentConfig {
            server_host: default_server_host(),
            server_port: default_server_port(),
            namespace: default_namespace(),
            config_map: default_config_map(),
            requeue_seconds: default_requeue_seconds(),
        }
    }
}

/// Shared state handed to every reconcile invocation.
#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub config: MonitorConfig,
    pub namespace: String,
    pub requeue_seconds: u64,
}

/// Load the operator config and watch ModelMonitors until the stream ends.
/// Construction fails instead of aborting when the operator config is
/// missing or malformed, so the caller decides whether to retry or exit.
pub async fn init_controller(client: Client, env_config: MonitorEnvironmentConfig) -> Result<(), Error> {
    let config = MonitorConfig::load(&client, &env_config.namespace, &env_config.config_map).await?;

    let context = Context::new(ControllerContext {
        client: client.clone(),
        config,
        namespace: env_config.namespace.clone(),
        requeue_seconds: env_config.requeue_seconds,
    });

    let monitors: Api<ModelMonitor> = Api::namespaced(client, &env_config.namespace);
    Controller::new(monitors, ListParams::default())
        .run(crd::modelmonitor::reconcile, crd::modelmonitor::error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((monitor, _)) => debug!("Reconciled ModelMonitor '{}'", monitor.name),
                Err(err) => warn!("Reconcile dispatch failed: {:?}", err),
            }
        })
        .await;

    Ok(())
}

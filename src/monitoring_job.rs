//! Builds the desired SparkApplication that runs the streaming analysis of
//! the logged traffic. The job reads its whole configuration from four
//! JSON-valued environment entries on the driver.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::JobConfig;
use crate::crd::modelmonitor::ModelMonitor;
use crate::crd::sparkapp::{
    DriverPodSpec, ExecutorPodSpec, PrometheusSpec, RestartPolicy, SparkApplication, SparkApplicationSpec,
    SparkMonitoringSpec,
};
use crate::defaulting;
use crate::errors::Error;
use crate::permissions::{default_service_account_name, MONITORING_JOB_ASSIGNEE};

pub const MODEL_INFO_ENV: &str = "MODEL_INFO";
pub const MONITORING_CONFIG_ENV: &str = "MONITORING_CONFIG";
pub const STORAGE_CONFIG_ENV: &str = "STORAGE_CONFIG";
pub const JOB_CONFIG_ENV: &str = "JOB_CONFIG";

const SPARK_VERSION: &str = "3.0.0";
const SPARK_VERSION_LABEL: &str = "version";
const APPLICATION_TYPE: &str = "Scala";
const DEPLOY_MODE: &str = "cluster";

const PROMETHEUS_JMX_EXPORTER_JAR: &str = "/prometheus/jmx_prometheus_javaagent-0.11.0.jar";
const PROMETHEUS_PORT: i32 = 8090;

pub struct MonitoringJobBuilder<'a> {
    config: &'a JobConfig,
}

impl<'a> MonitoringJobBuilder<'a> {
    pub fn new(config: &'a JobConfig) -> Self {
        MonitoringJobBuilder { config }
    }

    /// Desired SparkApplication for this monitor, or `None` when no detector
    /// is configured and any previously submitted job should be removed.
    pub fn desired_spark_app(&self, name: &str, monitor: &ModelMonitor) -> Result<Option<SparkApplication>, Error> {
        if !monitor.spec.monitoring.is_enabled() {
            return Ok(None);
        }

        let job = defaulting::fill_job(monitor.spec.job.as_ref());
        let service_account = default_service_account_name(MONITORING_JOB_ASSIGNEE);

        // The four configuration documents travel as opaque strings; a
        // failure to serialize one is reported for that document alone.
        let env_vars: BTreeMap<String, String> = vec![
            (MODEL_INFO_ENV, env_document("model", name, &monitor.spec.model)?),
            (
                MONITORING_CONFIG_ENV,
                env_document("monitoring", name, &monitor.spec.monitoring)?,
            ),
            (
                STORAGE_CONFIG_ENV,
                env_document("storage", name, &monitor.spec.storage)?,
            ),
            (JOB_CONFIG_ENV, env_document("job", name, &job)?),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect();

        let version_labels: BTreeMap<String, String> =
            vec![(SPARK_VERSION_LABEL.to_owned(), SPARK_VERSION.to_owned())]
                .into_iter()
                .collect();

        let mut spark_app = SparkApplication::new(
            name,
            SparkApplicationSpec {
                type_: APPLICATION_TYPE.to_owned(),
                mode: DEPLOY_MODE.to_owned(),
                image: Some(self.config.container_image.clone()),
                image_pull_policy: Some("Always".to_owned()),
                main_class: Some(self.config.main_class.clone()),
                main_application_file: Some(self.config.main_application_file.clone()),
                spark_version: SPARK_VERSION.to_owned(),
                restart_policy: RestartPolicy {
                    type_: "Never".to_owned(),
                },
                driver: DriverPodSpec {
                    cores: Some(job.driver.cores),
                    core_limit: Some(job.driver.core_limit.clone()),
                    memory: Some(job.driver.memory.clone()),
                    labels: version_labels.clone(),
                    service_account: Some(service_account),
                    env_vars,
                },
                executor: ExecutorPodSpec {
                    cores: Some(job.executor.cores),
                    core_limit: Some(job.executor.core_limit.clone()),
                    memory: Some(job.executor.memory.clone()),
                    labels: version_labels,
                    instances: Some(job.executor.instances),
                    env_vars: BTreeMap::new(),
                },
                monitoring: if job.expose_metrics {
                    Some(SparkMonitoringSpec {
                        expose_driver_metrics: true,
                        expose_executor_metrics: true,
                        prometheus: Some(PrometheusSpec {
                            jmx_exporter_jar: PROMETHEUS_JMX_EXPORTER_JAR.to_owned(),
                            port: Some(PROMETHEUS_PORT),
                        }),
                    })
                } else {
                    None
                },
            },
        );
        spark_app.metadata.namespace = monitor.metadata.namespace.clone();
        spark_app.metadata.labels = monitor.metadata.labels.clone();

        Ok(Some(spark_app))
    }
}

fn env_document<T: Serialize>(doc: &'static str, name: &str, value: &T) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|source| Error::TranslationError {
        doc,
        name: name.to_owned(),
        source,
    })
}

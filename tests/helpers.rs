use serde_json::Value;
use serde_yaml;

use modelmonitor_controller::config::{MonitorConfig, INFERENCE_LOGGER_CONFIG_KEY, JOB_CONFIG_KEY};
use modelmonitor_controller::ModelMonitor;

use k8s_openapi::api::core::v1::ConfigMap;

// Get the repo's example `ModelMonitor` manifest
pub fn example_config(name: &str) -> Value {
    let config_str = std::fs::read_to_string(format!("{}/{}", env!("CARGO_MANIFEST_DIR"), name))
        .expect("Failed to read config file");
    serde_yaml::from_str(&config_str).expect("Unable to parse config file into yaml")
}

pub fn example_modelmonitor() -> ModelMonitor {
    serde_json::from_value(example_config("example-modelmonitor.yaml"))
        .expect("Unable to parse the example ModelMonitor")
}

// Operator ConfigMap the way the deployment manifests ship it
pub fn operator_config() -> MonitorConfig {
    let mut data = std::collections::BTreeMap::new();
    data.insert(
        INFERENCE_LOGGER_CONFIG_KEY.to_owned(),
        r#"{"containerImage": "registry/inference-logger:0.3.0"}"#.to_owned(),
    );
    data.insert(
        JOB_CONFIG_KEY.to_owned(),
        concat!(
            r#"{"containerImage": "registry/monitoring-job:0.3.0", "#,
            r#""mainClass": "io.monitoring.job.Main", "#,
            r#""mainApplicationFile": "local:///app/monitoring-job.jar"}"#
        )
        .to_owned(),
    );

    let config_map = ConfigMap {
        data: Some(data),
        ..ConfigMap::default()
    };
    MonitorConfig::from_config_map(&config_map).expect("Unable to parse the operator ConfigMap")
}

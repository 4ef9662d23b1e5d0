use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::{api::Api, Client};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// ConfigMap key carrying the inference logger document
pub const INFERENCE_LOGGER_CONFIG_KEY: &str = "inferenceLogger";
/// ConfigMap key carrying the analysis job document
pub const JOB_CONFIG_KEY: &str = "job";

/// Operator-wide configuration for the inference logger endpoint
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceLoggerConfig {
    pub container_image: String,
}

/// Operator-wide configuration for the analysis job
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub container_image: String,
    pub main_class: String,
    pub main_application_file: String,
}

/// Operator-wide defaults, one JSON document per target-resource family.
/// Loaded once at controller construction; a malformed document aborts
/// startup rather than producing a partially configured operator.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    pub inference_logger: InferenceLoggerConfig,
    pub job: JobConfig,
}

impl MonitorConfig {
    /// Parse the operator config out of its ConfigMap.
    pub fn from_config_map(config_map: &ConfigMap) -> Result<Self, Error> {
        let data = config_map
            .data
            .as_ref()
            .ok_or_else(|| Error::ConfigError("operator ConfigMap has no data".to_owned()))?;

        let inference_logger: InferenceLoggerConfig = parse_component(data, INFERENCE_LOGGER_CONFIG_KEY)?;
        if inference_logger.container_image.is_empty() {
            return Err(Error::ConfigError(format!(
                "'{}' entry has an empty containerImage",
                INFERENCE_LOGGER_CONFIG_KEY
            )));
        }

        let job: JobConfig = parse_component(data, JOB_CONFIG_KEY)?;
        if job.container_image.is_empty() || job.main_class.is_empty() || job.main_application_file.is_empty() {
            return Err(Error::ConfigError(format!(
                "'{}' entry needs containerImage, mainClass and mainApplicationFile",
                JOB_CONFIG_KEY
            )));
        }

        Ok(MonitorConfig { inference_logger, job })
    }

    /// Fetch and parse the operator config from the cluster.
    pub async fn load(client: &Client, namespace: &str, name: &str) -> Result<Self, Error> {
        let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
        let config_map = config_maps.get(name).await.map_err(|source| Error::LookupError {
            kind: "ConfigMap".to_owned(),
            name: name.to_owned(),
            source,
        })?;
        let config = Self::from_config_map(&config_map)?;
        debug!("Loaded operator config from '{}/{}'", namespace, name);
        Ok(config)
    }
}

fn parse_component<T: DeserializeOwned>(data: &BTreeMap<String, String>, key: &str) -> Result<T, Error> {
    let raw = data
        .get(key)
        .ok_or_else(|| Error::ConfigError(format!("missing '{}' entry", key)))?;
    serde_json::from_str(raw).map_err(|err| Error::ConfigError(format!("malformed '{}' entry: {}", key, err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map_with(entries: &[(&str, &str)]) -> ConfigMap {
        let mut data = BTreeMap::new();
        for (key, value) in entries {
            data.insert(key.to_string(), value.to_string());
        }
        ConfigMap {
            data: Some(data),
            ..ConfigMap::default()
        }
    }

    #[test]
    fn test_config_parses_both_documents() {
        let config_map = config_map_with(&[
            (INFERENCE_LOGGER_CONFIG_KEY, r#"{"containerImage": "registry/logger:1.0"}"#),
            (
                JOB_CONFIG_KEY,
                r#"{"containerImage": "registry/job:1.0", "mainClass": "io.monitoring.Job", "mainApplicationFile": "local:///app/job.jar"}"#,
            ),
        ]);

        let config = MonitorConfig::from_config_map(&config_map).unwrap();
        assert_eq!(config.inference_logger.container_image, "registry/logger:1.0");
        assert_eq!(config.job.main_class, "io.monitoring.Job");
    }

    #[test]
    fn test_config_missing_entry_fails() {
        let config_map = config_map_with(&[(
            INFERENCE_LOGGER_CONFIG_KEY,
            r#"{"containerImage": "registry/logger:1.0"}"#,
        )]);

        let err = MonitorConfig::from_config_map(&config_map).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_config_malformed_json_fails() {
        let config_map = config_map_with(&[
            (INFERENCE_LOGGER_CONFIG_KEY, "not-json"),
            (JOB_CONFIG_KEY, r#"{"containerImage": "x", "mainClass": "y", "mainApplicationFile": "z"}"#),
        ]);

        let err = MonitorConfig::from_config_map(&config_map).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_config_empty_required_field_fails() {
        let config_map = config_map_with(&[
            (INFERENCE_LOGGER_CONFIG_KEY, r#"{"containerImage": ""}"#),
            (JOB_CONFIG_KEY, r#"{"containerImage": "x", "mainClass": "y", "mainApplicationFile": "z"}"#),
        ]);

        let err = MonitorConfig::from_config_map(&config_map).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}

//! Fills unset fields of the user-facing sub-specs from static defaults.
//! A field counts as unset only when it holds its zero value; explicit user
//! values are never replaced.

use std::collections::BTreeMap;

use crate::crd::modelmonitor::{DriverSpec, ExecutorSpec, InferenceLoggerSpec, JobSpec, ResourcesSpec};

pub const DEFAULT_SCALING_CLASS: &str = "kpa.autoscaling.knative.dev";
pub const DEFAULT_SCALING_METRIC: &str = "concurrency";
pub const DEFAULT_SCALING_TARGET: i32 = 1;
pub const DEFAULT_TARGET_UTILIZATION: i32 = 70;
pub const DEFAULT_SCALING_WINDOW: &str = "60s";
pub const DEFAULT_PANIC_WINDOW: i32 = 10;
pub const DEFAULT_PANIC_THRESHOLD: i32 = 200;
pub const DEFAULT_MIN_REPLICAS: i32 = 1;
/// Zero keeps the endpoint unbounded upwards.
pub const DEFAULT_MAX_REPLICAS: i32 = 0;

pub const DEFAULT_LOGGER_RESOURCE_REQUESTS: &[(&str, &str)] = &[("cpu", "100m"), ("memory", "256Mi")];
pub const DEFAULT_LOGGER_RESOURCE_LIMITS: &[(&str, &str)] = &[("cpu", "1"), ("memory", "1Gi")];

pub const DEFAULT_JOB_TIMEOUT: i64 = 3600;
pub const DEFAULT_DRIVER_CORES: i32 = 1;
pub const DEFAULT_DRIVER_CORE_LIMIT: &str = "1200m";
pub const DEFAULT_DRIVER_MEMORY: &str = "512m";
pub const DEFAULT_EXECUTOR_CORES: i32 = 1;
pub const DEFAULT_EXECUTOR_CORE_LIMIT: &str = "1200m";
pub const DEFAULT_EXECUTOR_MEMORY: &str = "512m";
pub const DEFAULT_EXECUTOR_INSTANCES: i32 = 1;

fn or_default(value: i32, default: i32) -> i32 {
    if value == 0 {
        default
    } else {
        value
    }
}

fn or_default_i64(value: i64, default: i64) -> i64 {
    if value == 0 {
        default
    } else {
        value
    }
}

fn or_default_str(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_owned()
    } else {
        value.to_owned()
    }
}

/// Insert every default entry whose key the partial map does not carry.
/// Existing keys are never overwritten.
pub fn merge_map_defaults(partial: &mut BTreeMap<String, String>, defaults: &[(&str, &str)]) {
    for (key, value) in defaults {
        partial
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
}

/// Complete compute resources, requests and limits merged independently.
pub fn fill_resources(partial: &ResourcesSpec) -> ResourcesSpec {
    let mut resources = partial.clone();
    merge_map_defaults(&mut resources.requests, DEFAULT_LOGGER_RESOURCE_REQUESTS);
    merge_map_defaults(&mut resources.limits, DEFAULT_LOGGER_RESOURCE_LIMITS);
    resources
}

/// Complete scaling sub-spec for the inference logger endpoint.
pub fn fill_scaling(partial: &InferenceLoggerSpec) -> InferenceLoggerSpec {
    InferenceLoggerSpec {
        class: or_default_str(&partial.class, DEFAULT_SCALING_CLASS),
        metric: or_default_str(&partial.metric, DEFAULT_SCALING_METRIC),
        target: or_default(partial.target, DEFAULT_SCALING_TARGET),
        target_utilization: or_default(partial.target_utilization, DEFAULT_TARGET_UTILIZATION),
        window: or_default_str(&partial.window, DEFAULT_SCALING_WINDOW),
        panic_window: or_default(partial.panic_window, DEFAULT_PANIC_WINDOW),
        panic_threshold: or_default(partial.panic_threshold, DEFAULT_PANIC_THRESHOLD),
        min_replicas: or_default(partial.min_replicas, DEFAULT_MIN_REPLICAS),
        max_replicas: or_default(partial.max_replicas, DEFAULT_MAX_REPLICAS),
        resources: fill_resources(&partial.resources),
    }
}

/// Complete driver/executor sizing for the analysis job. Accepts a missing
/// sub-spec, in which case every field takes its default.
pub fn fill_job(partial: Option<&JobSpec>) -> JobSpec {
    let job = partial.cloned().unwrap_or_default();
    JobSpec {
        timeout: or_default_i64(job.timeout, DEFAULT_JOB_TIMEOUT),
        driver: DriverSpec {
            cores: or_default(job.driver.cores, DEFAULT_DRIVER_CORES),
            core_limit: or_default_str(&job.driver.core_limit, DEFAULT_DRIVER_CORE_LIMIT),
            memory: or_default_str(&job.driver.memory, DEFAULT_DRIVER_MEMORY),
        },
        executor: ExecutorSpec {
            cores: or_default(job.executor.cores, DEFAULT_EXECUTOR_CORES),
            core_limit: or_default_str(&job.executor.core_limit, DEFAULT_EXECUTOR_CORE_LIMIT),
            memory: or_default_str(&job.executor.memory, DEFAULT_EXECUTOR_MEMORY),
            instances: or_default(job.executor.instances, DEFAULT_EXECUTOR_INSTANCES),
        },
        expose_metrics: job.expose_metrics,
    }
}

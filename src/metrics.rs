use prometheus::{IntCounterVec, Opts, Registry};

use kube::Error;
use lazy_static::lazy_static;

pub const METRICS_NAMESPACE: &str = "modelmonitor_controller";

lazy_static! {
    pub static ref KUBE_ERRORS: IntCounterVec = IntCounterVec::new(
      Opts::new("kube_errors", "modelmonitor-controller k8s related errors")
      .namespace(METRICS_NAMESPACE),
      &["action", "kube_name"]
    ).unwrap();
    pub static ref ERRORS: IntCounterVec = IntCounterVec::new(
      Opts::new("errors", "modelmonitor-controller errors")
      .namespace(METRICS_NAMESPACE),
      &["name"]
    ).unwrap();
    pub static ref RECONCILE_FAILURES: IntCounterVec = IntCounterVec::new(
      Opts::new("reconcile_failures", "modelmonitor-controller reconcile failures per resource family")
      .namespace(METRICS_NAMESPACE),
      &["family"]
    ).unwrap();
}

pub fn custom_metrics(registry: &Registry) {
    registry.register(Box::new(KUBE_ERRORS.clone())).unwrap();
    registry.register(Box::new(ERRORS.clone())).unwrap();
    registry.register(Box::new(RECONCILE_FAILURES.clone())).unwrap();
}

pub fn kube_error_name<'a>(err: &Error) -> &'a str {
    match err {
        Error::Api(_) => "api",
        Error::HyperError(_) => "hyper_error",
        Error::Service(_) => "service_error",
        Error::HttpError(_) => "http_error",
        Error::SerdeError(_) => "serde_error",
        Error::BuildRequest(_) => "request_build",
        Error::InferConfig(_) => "kube_config",
        Error::Discovery(_) => "discovery",
        Error::Auth(_) => "auth",
        _ => "other",
    }
}

pub fn kube_error_happened(action: &str, err: &Error) {
    KUBE_ERRORS.with_label_values(&[action, kube_error_name(err)]).inc_by(1);
}

pub fn error_happened(name: &str) {
    ERRORS.with_label_values(&[name]).inc_by(1);
}

pub fn reconcile_failed(family: &str) {
    RECONCILE_FAILURES.with_label_values(&[family]).inc_by(1);
}

pub mod kafkatopic;
pub mod knative;
pub mod modelmonitor;
pub mod sparkapp;

pub mod knative;
pub use knative::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid operator configuration: {0}")]
    ConfigError(String),

    #[error("Failed to serialize the '{doc}' document of '{name}': {source}")]
    TranslationError {
        doc: &'static str,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to fetch {kind} '{name}': {source}")]
    LookupError {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Conflicting concurrent write to {kind} '{name}'")]
    ConflictError { kind: String, name: String },

    #[error("Failed to {action} {kind} '{name}': {source}")]
    ApiError {
        action: &'static str,
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Failed to provision {kind} '{name}' for assignee '{assignee}': {source}")]
    ProvisioningError {
        kind: String,
        name: String,
        assignee: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("Kube API Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Key '{0}' is empty")]
    MissingKey(&'static str),
}

use thiserror::Error;

/// Top-level error type for the provenance scanner.
#[derive(Error, Debug)]
pub enum ProvenanceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("required tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("could not determine remote OS for host {host}")]
    RemoteOsUnknown { host: String },

    #[error("agent deployment to {host} failed: {reason}")]
    DeployFailed { host: String, reason: String },

    #[error("remote execution on {host} failed: {reason}")]
    ExecuteFailed { host: String, reason: String },

    #[error("collecting results from {host} failed: {reason}")]
    CollectFailed { host: String, reason: String },

    #[error("probe of {target} timed out")]
    ProbeTimeout { target: String },

    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("graph sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProvenanceError>;

//! Domain-level error taxonomy for Testloop.
//!
//! A resource's own failed/timeout/error outcome is not an error: it is a
//! [`TestResult`](crate::domain::result::TestResult) value. The variants here
//! cover configuration and contract violations only.

/// Testloop domain errors.
#[derive(Debug, thiserror::Error)]
pub enum TestLoopError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("required collaborator unavailable: {service}")]
    MissingCollaborator { service: &'static str },

    #[error("a repair cycle is already in progress for this session")]
    CycleInProgress,

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Testloop domain operations.
pub type Result<T> = std::result::Result<T, TestLoopError>;

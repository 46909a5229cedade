// Service Error Types
// Top-level error type for workflow execution

use crate::execution::matrix::ConfigError;
use crate::workflow::error::ParseError;

use thiserror::Error;

/// Errors surfaced by the workflow service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Workflow file could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Matrix configuration is invalid
    #[error("matrix error: {0}")]
    Matrix(#[from] ConfigError),

    /// The workflow's trigger does not fire for the given event
    #[error("workflow '{workflow}' is not triggered by '{event}' events")]
    TriggerMismatch { workflow: String, event: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

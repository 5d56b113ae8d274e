//! Error types for form-level operations

use thiserror::Error;

/// Result type for section navigation
pub type FlowResult<T> = std::result::Result<T, FlowError>;

/// Section transition errors.
///
/// These signal misuse by the host (navigating to an unknown section, moving
/// on from an incomplete one) and are returned rather than degraded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("Section not found: {0}")]
    NotFound(String),

    #[error("Section is not visible: {0}")]
    NotVisible(String),

    #[error("Back navigation is disabled")]
    NavigationDisabled,

    #[error("Section is incomplete: {0}")]
    Incomplete(String),
}

/// Configuration and state (de)serialization errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

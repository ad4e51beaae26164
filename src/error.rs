//! Error taxonomy shared across the orchestrator

use thiserror::Error;

/// Errors that can occur while orchestrating and executing tasks
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Invalid arguments, unknown tool, bad regex, missing path
    #[error("Invalid input: {0}")]
    Input(String),

    /// Pool at capacity, backend saturated, no instance or model available
    #[error("Resource unavailable: {0}")]
    Resource(String),

    /// Non-2xx from a backend or a malformed response
    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    /// Task or tool exceeded its wall-clock budget
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Tool or subprocess failed with a non-zero exit
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Invariant violation or unhandled failure in a callback
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwarmError {
    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, SwarmError::Timeout(_))
    }

    /// Check if the operation can be retried against another backend
    pub fn is_retryable(&self) -> bool {
        match self {
            SwarmError::Backend { status, .. } => *status >= 500,
            SwarmError::Network(_) | SwarmError::Timeout(_) => true,
            SwarmError::Resource(_) => true,
            _ => false,
        }
    }
}

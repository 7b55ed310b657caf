//! Error taxonomy shared by every layer of the bridge
//!
//! Remote failures are translated into these kinds at the adapter boundary;
//! the driver never sees raw transport errors.

use thiserror::Error;

/// Bridge errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("{resource} is in state '{status}', expected {expected}")]
    InvalidState {
        resource: String,
        status: String,
        expected: String,
    },

    #[error("Timeout after {waited_secs}s waiting for {operation}")]
    Timeout { operation: String, waited_secs: u64 },

    #[error("Transient remote failure: {0}")]
    TransientRemoteFailure(String),

    #[error("Remote service unreachable: {0}")]
    Transport(String),

    #[error("Resource already exists: {0}")]
    Conflict(String),

    #[error("Remote API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Mapping store error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        CloudError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn invalid_state(
        resource: impl Into<String>,
        status: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        CloudError::InvalidState {
            resource: resource.into(),
            status: status.into(),
            expected: expected.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound { .. })
    }

    /// Whether the failure may succeed if the same call is repeated
    ///
    /// Only the narrow administrative retries consult this; lifecycle
    /// operations never retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CloudError::TransientRemoteFailure(_) | CloudError::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

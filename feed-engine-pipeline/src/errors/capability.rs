//! Error types for the external capabilities (follower lookup, entity
//! resolution).
use thiserror::Error;

/// Represents errors returned by a domain capability.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Decode error: {0}")]
    Decode(String),
}

impl CapabilityError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Server-side and throttling failures are worth retrying; a malformed
    /// response is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(err) => !err.is_decode(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

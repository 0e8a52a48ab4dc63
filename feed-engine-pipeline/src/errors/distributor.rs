//! Error types for the fan-out distributor.
use feed_engine_repository::RepositoryError;
use thiserror::Error;

use crate::errors::CapabilityError;

/// Represents errors that can occur while replicating an aggregate to feeds
/// and inboxes.
#[derive(Debug, Error)]
pub enum DistributorError {
    #[error("Fan-out repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Follower lookup error: {0}")]
    Capability(#[from] CapabilityError),
}

impl DistributorError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repository(err) => err.is_transient(),
            Self::Capability(err) => err.is_transient(),
        }
    }
}

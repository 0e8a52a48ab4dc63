//! Error types for the feed read/write service.
use feed_engine_repository::RepositoryError;
use feed_engine_shared::types::{AggregateId, ReactionKindId};
use thiserror::Error;

use crate::errors::{CapabilityError, MaintenanceError};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Entity resolver error: {0}")]
    Capability(#[from] CapabilityError),
    #[error("Reaction rollup error: {0}")]
    Maintenance(#[from] MaintenanceError),
    #[error("Unknown reaction kind: {0}")]
    UnknownReactionKind(ReactionKindId),
    #[error("Aggregate not found: {0}")]
    AggregateNotFound(AggregateId),
}

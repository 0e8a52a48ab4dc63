//! Error types for the reverse maintainer and the reaction rollup.
use feed_engine_repository::RepositoryError;
use thiserror::Error;

use crate::errors::DistributorError;

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("Aggregate repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Distributor error: {0}")]
    Distributor(#[from] DistributorError),
    #[error("Gave up stripping {entity} from aggregate {aggregate_id} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted {
        entity: String,
        aggregate_id: uuid::Uuid,
        attempts: usize,
    },
    #[error("References to {0} remain after the pass limit")]
    IncompleteRemoval(String),
}

impl MaintenanceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Repository(err) if err.is_conflict())
    }

    /// Every maintenance operation is safely re-runnable, so anything short of
    /// bad stored data is worth another pass.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repository(err) => err.is_transient(),
            Self::Distributor(err) => err.is_transient(),
            Self::ConflictRetriesExhausted { .. } | Self::IncompleteRemoval(_) => true,
        }
    }
}

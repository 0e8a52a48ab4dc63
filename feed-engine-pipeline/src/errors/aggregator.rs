//! Error types for the aggregator module of the Feed Engine Pipeline.
use feed_engine_repository::RepositoryError;
use feed_engine_shared::types::CategoryError;
use thiserror::Error;

/// Represents errors that can occur while merging an event into an aggregate.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Aggregate repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Category error: {0}")]
    Category(#[from] CategoryError),
    #[error("Merge instruction for {0} adds nothing")]
    EmptyMerge(String),
    #[error("Gave up merging into {key} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted { key: String, attempts: usize },
}

impl AggregatorError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Repository(err) if err.is_conflict())
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repository(err) => err.is_transient(),
            Self::ConflictRetriesExhausted { .. } => true,
            Self::Category(_) | Self::EmptyMerge(_) => false,
        }
    }
}

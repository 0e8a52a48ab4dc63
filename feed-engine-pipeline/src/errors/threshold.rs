//! Error types for the threshold detector.
use feed_engine_repository::RepositoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("Threshold repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ThresholdError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repository(err) => err.is_transient(),
        }
    }
}

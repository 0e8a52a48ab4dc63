//! Error types for the orchestrator module of the Feed Engine Pipeline.
//! Wraps every component error so a single event outcome can be derived from
//! whichever stage failed.
use thiserror::Error;

use crate::errors::{
    AggregatorError, ConsumerError, DistributorError, MaintenanceError, ProcessorError,
    ThresholdError,
};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),
    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),
    #[error("Aggregator error: {0}")]
    Aggregator(#[from] AggregatorError),
    #[error("Threshold error: {0}")]
    Threshold(#[from] ThresholdError),
    #[error("Distributor error: {0}")]
    Distributor(#[from] DistributorError),
    #[error("Maintenance error: {0}")]
    Maintenance(#[from] MaintenanceError),
    #[error("Worker pool closed")]
    WorkerPoolClosed,
}

impl OrchestratorError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Consumer(err) => err.is_transient(),
            Self::Processor(_) => false,
            Self::Aggregator(err) => err.is_transient(),
            Self::Threshold(err) => err.is_transient(),
            Self::Distributor(err) => err.is_transient(),
            Self::Maintenance(err) => err.is_transient(),
            Self::WorkerPoolClosed => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_engine_repository::RepositoryError;

    #[test]
    fn test_outcome_classification_follows_the_failing_stage() {
        let malformed = OrchestratorError::from(ProcessorError::missing("followee_id"));
        assert!(!malformed.is_transient());

        let conflict = OrchestratorError::from(AggregatorError::from(RepositoryError::conflict(
            "version moved",
        )));
        assert!(conflict.is_transient());

        let missing = OrchestratorError::from(MaintenanceError::from(RepositoryError::invalid(
            "bad category payload",
        )));
        assert!(!missing.is_transient());
    }
}

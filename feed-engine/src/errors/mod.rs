//! Error types for the Feed Engine application.
//! Consolidates the errors that can stop the engine during startup or while
//! the orchestrator runs.
use feed_engine_pipeline::errors::OrchestratorError;
use feed_engine_repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IndexingError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

//! Error types for the consumer module of the Feed Engine Pipeline.
//! Defines errors raised while polling and acknowledging queued events.
use feed_engine_repository::RepositoryError;
use thiserror::Error;

/// Represents errors that can occur within the event consumer.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Event queue error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Error sending message through channel: {0}")]
    ChannelSend(String),
}

impl ConsumerError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repository(err) => err.is_transient(),
            Self::ChannelSend(_) => false,
        }
    }
}

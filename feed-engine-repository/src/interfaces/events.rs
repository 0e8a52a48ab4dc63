use chrono::{DateTime, Duration, Utc};
use feed_engine_shared::types::{Event, EventId, EventStatus, NewEvent};

use crate::errors::RepositoryError;

/// A status change requested by `ack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTransition {
    pub status: EventStatus,
    /// New `scheduled_at`, set when the event is delayed.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub increment_retry: bool,
    pub error: Option<String>,
}

impl EventTransition {
    pub fn to(status: EventStatus) -> Self {
        Self {
            status,
            scheduled_at: None,
            increment_retry: false,
            error: None,
        }
    }

    pub fn delayed_until(scheduled_at: DateTime<Utc>) -> Self {
        Self {
            status: EventStatus::Delayed,
            scheduled_at: Some(scheduled_at),
            increment_retry: false,
            error: None,
        }
    }

    pub fn with_retry(mut self) -> Self {
        self.increment_retry = true;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Durable staging log of domain events awaiting processing.
#[async_trait::async_trait]
pub trait EventQueueRepository: Send + Sync {
    /// Appends an event and returns its queue position.
    async fn enqueue(&self, event: &NewEvent) -> Result<EventId, RepositoryError>;

    /// Claims up to `batch_size` due events, moving them to `Started`.
    ///
    /// Due means `New` or `Delayed` with `scheduled_at <= now`, or `Started`
    /// with a lease older than `lease`. Events are returned in id order.
    async fn poll(
        &self,
        batch_size: usize,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, RepositoryError>;

    /// Applies a transition to a `Started` event. Returns `false`, changing
    /// nothing, when the event is in any other state.
    async fn transition(
        &self,
        event_id: EventId,
        transition: &EventTransition,
    ) -> Result<bool, RepositoryError>;

    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, RepositoryError>;

    /// Events that exhausted their retries or failed permanently, oldest first.
    async fn failed_events(&self, limit: usize) -> Result<Vec<Event>, RepositoryError>;

    /// Moves an `Error` event back to `New` with a fresh retry budget.
    async fn requeue(&self, event_id: EventId, now: DateTime<Utc>) -> Result<bool, RepositoryError>;
}

use chrono::{DateTime, Utc};
use feed_engine_shared::types::{EntityRef, EventId, Milestone, NewEvent, ThresholdMark, ThresholdSample};

use crate::errors::RepositoryError;

/// Threshold samples and the exactly-once marks guarding milestone events.
#[async_trait::async_trait]
pub trait ThresholdRepository: Send + Sync {
    /// Stores a density sample. An actor contributes at most one sample per
    /// entity and milestone; returns `false` when one already existed.
    async fn record_sample(&self, sample: &ThresholdSample) -> Result<bool, RepositoryError>;

    /// Sample timestamps for an entity, newest first.
    async fn recent_samples(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
        limit: usize,
    ) -> Result<Vec<DateTime<Utc>>, RepositoryError>;

    /// Drops samples of an entity that occurred before `before`. Returns the
    /// number removed.
    async fn prune_samples(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
        before: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Drops every sample of an entity, once its milestone is marked.
    async fn clear_samples(&self, entity: &EntityRef, milestone: Milestone) -> Result<u64, RepositoryError>;

    /// Creates the mark and enqueues `event` atomically. Only the caller whose
    /// insert succeeds gets the event id back; everyone else gets `None`.
    async fn try_mark(
        &self,
        mark: &ThresholdMark,
        event: &NewEvent,
    ) -> Result<Option<EventId>, RepositoryError>;

    async fn get_mark(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
    ) -> Result<Option<ThresholdMark>, RepositoryError>;
}

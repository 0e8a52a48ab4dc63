use feed_engine_shared::types::{
    Aggregate, AggregateId, EntityRef, EventId, ReactionCounts, ReferenceScope,
};
use uuid::Uuid;

use crate::errors::RepositoryError;

/// Storage of aggregates together with their reverse index.
///
/// Every write that changes categories also rewrites the aggregate's reverse
/// index rows in the same transaction.
#[async_trait::async_trait]
pub trait AggregateRepository: Send + Sync {
    /// The aggregate with the highest generation for a grouping key.
    async fn latest_for_key(&self, grouping_key: &str) -> Result<Option<Aggregate>, RepositoryError>;

    async fn get_aggregate(&self, id: AggregateId) -> Result<Option<Aggregate>, RepositoryError>;

    /// Missing ids are skipped. Order is unspecified.
    async fn get_aggregates(&self, ids: &[AggregateId]) -> Result<Vec<Aggregate>, RepositoryError>;

    /// The aggregate an event was already merged into under `grouping_key`,
    /// whatever its generation.
    async fn aggregate_for_event(
        &self,
        grouping_key: &str,
        event_id: EventId,
    ) -> Result<Option<Aggregate>, RepositoryError>;

    /// Fails with `Conflict` if `(grouping_key, generation)` already exists.
    /// Records `origin_event_id` as a contribution of the new aggregate.
    async fn insert_aggregate(&self, aggregate: &Aggregate) -> Result<(), RepositoryError>;

    /// Writes categories, language and anchor if the stored version still
    /// equals `aggregate.version`, and returns the stored row with its bumped
    /// version. Fails with `Conflict` when another writer got there first.
    async fn update_aggregate(&self, aggregate: &Aggregate) -> Result<Aggregate, RepositoryError>;

    /// `update_aggregate` plus recording `event_id` as a contribution, in one
    /// transaction.
    async fn append_aggregate(
        &self,
        aggregate: &Aggregate,
        event_id: EventId,
    ) -> Result<Aggregate, RepositoryError>;

    /// Records that `event_id` was merged into `aggregate_id` without changing
    /// it. Returns `false` when the event was already recorded.
    async fn record_contribution(
        &self,
        grouping_key: &str,
        event_id: EventId,
        aggregate_id: AggregateId,
    ) -> Result<bool, RepositoryError>;

    /// Deletes the aggregate and, by cascade, its fan-out, notification,
    /// vote and reverse index rows.
    async fn delete_aggregate(&self, id: AggregateId) -> Result<bool, RepositoryError>;

    /// `delete_aggregate` guarded by the version the caller read. Fails with
    /// `Conflict` when the aggregate changed since; returns `false` when it is
    /// already gone.
    async fn delete_aggregate_if(
        &self,
        id: AggregateId,
        expected_version: i64,
    ) -> Result<bool, RepositoryError>;

    /// Aggregates whose categories reference `entity`, oldest first.
    async fn referencing_aggregates(
        &self,
        entity: &EntityRef,
        scope: &ReferenceScope,
        limit: usize,
    ) -> Result<Vec<Aggregate>, RepositoryError>;

    async fn anchored_aggregates(&self, anchor: &EntityRef) -> Result<Vec<Aggregate>, RepositoryError>;

    /// Aggregates owned by `owner_id`, newest first.
    async fn aggregates_owned_by(
        &self,
        owner_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Aggregate>, RepositoryError>;

    /// Re-tags every aggregate of an owner. Returns the number touched.
    async fn set_language(&self, owner_id: Uuid, language: Option<&str>) -> Result<u64, RepositoryError>;

    /// Replaces the stored reaction counts without touching the version.
    async fn set_reaction_counts(
        &self,
        id: AggregateId,
        counts: &ReactionCounts,
    ) -> Result<bool, RepositoryError>;
}

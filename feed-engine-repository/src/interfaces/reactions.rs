use std::collections::HashMap;

use feed_engine_shared::types::{AggregateId, ReactionCounts, ReactionKind, ReactionKindId, ReactionVote};
use uuid::Uuid;

use crate::errors::RepositoryError;

/// Reaction catalog and vote rows.
#[async_trait::async_trait]
pub trait ReactionRepository: Send + Sync {
    /// Every reaction kind ordered by `sort_order`.
    async fn reaction_catalog(&self) -> Result<Vec<ReactionKind>, RepositoryError>;

    /// Returns `false` when the voter already holds this reaction.
    async fn insert_vote(&self, vote: &ReactionVote) -> Result<bool, RepositoryError>;

    async fn delete_vote(
        &self,
        aggregate_id: AggregateId,
        voter_id: Uuid,
        reaction_kind_id: ReactionKindId,
    ) -> Result<bool, RepositoryError>;

    /// Full recount of the existing votes of an aggregate.
    async fn count_votes(&self, aggregate_id: AggregateId) -> Result<ReactionCounts, RepositoryError>;

    /// The viewer's reactions on each of the given aggregates.
    async fn votes_by_voter(
        &self,
        voter_id: Uuid,
        aggregate_ids: &[AggregateId],
    ) -> Result<HashMap<AggregateId, Vec<ReactionKindId>>, RepositoryError>;
}

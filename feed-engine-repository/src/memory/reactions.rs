use std::collections::HashMap;

use async_trait::async_trait;
use feed_engine_shared::types::{AggregateId, ReactionCounts, ReactionKind, ReactionKindId, ReactionVote};
use uuid::Uuid;

use super::MemoryFeedStore;
use crate::errors::RepositoryError;
use crate::interfaces::ReactionRepository;

#[async_trait]
impl ReactionRepository for MemoryFeedStore {
    async fn reaction_catalog(&self) -> Result<Vec<ReactionKind>, RepositoryError> {
        let mut catalog = self.read().reaction_kinds.clone();
        catalog.sort_by_key(|kind| (kind.sort_order, kind.id));
        Ok(catalog)
    }

    async fn insert_vote(&self, vote: &ReactionVote) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        if !state.aggregates.contains_key(&vote.aggregate_id) {
            return Err(RepositoryError::not_found(format!("aggregate {}", vote.aggregate_id)));
        }
        let key = (vote.aggregate_id, vote.voter_id, vote.reaction_kind_id);
        if state.votes.contains_key(&key) {
            return Ok(false);
        }
        state.votes.insert(key, vote.clone());
        Ok(true)
    }

    async fn delete_vote(
        &self,
        aggregate_id: AggregateId,
        voter_id: Uuid,
        reaction_kind_id: ReactionKindId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        Ok(state
            .votes
            .remove(&(aggregate_id, voter_id, reaction_kind_id))
            .is_some())
    }

    async fn count_votes(&self, aggregate_id: AggregateId) -> Result<ReactionCounts, RepositoryError> {
        let mut counts = ReactionCounts::new();
        for (voted_on, _, kind) in self.read().votes.keys() {
            if *voted_on == aggregate_id {
                *counts.entry(*kind).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn votes_by_voter(
        &self,
        voter_id: Uuid,
        aggregate_ids: &[AggregateId],
    ) -> Result<HashMap<AggregateId, Vec<ReactionKindId>>, RepositoryError> {
        let mut votes: HashMap<AggregateId, Vec<ReactionKindId>> = HashMap::new();
        for (aggregate_id, voter, kind) in self.read().votes.keys() {
            if *voter == voter_id && aggregate_ids.contains(aggregate_id) {
                votes.entry(*aggregate_id).or_default().push(*kind);
            }
        }
        for kinds in votes.values_mut() {
            kinds.sort_unstable();
        }
        Ok(votes)
    }
}

use std::sync::Arc;

use feed_engine_repository::{AggregateRepository, ReactionRepository};
use feed_engine_shared::types::{AggregateId, ReactionCounts};
use tracing::debug;

use crate::errors::MaintenanceError;
use crate::locks::KeyLocks;

/// Recomputes an aggregate's reaction counts from its vote rows.
///
/// A recount is a pure function of the votes that exist when it runs, so a
/// dropped or duplicated trigger is healed by the next one. Recounts of the
/// same aggregate are serialised so an older count never overwrites a newer
/// one.
pub struct ReactionRollup {
    aggregates: Arc<dyn AggregateRepository>,
    reactions: Arc<dyn ReactionRepository>,
    locks: KeyLocks,
}

impl ReactionRollup {
    pub fn new(aggregates: Arc<dyn AggregateRepository>, reactions: Arc<dyn ReactionRepository>) -> Self {
        Self {
            aggregates,
            reactions,
            locks: KeyLocks::new(),
        }
    }

    /// Returns the stored counts, or `None` when the aggregate is gone.
    pub async fn recompute(&self, aggregate_id: AggregateId) -> Result<Option<ReactionCounts>, MaintenanceError> {
        let _guard = self.locks.lock(&aggregate_id.to_string()).await;
        let counts = self.reactions.count_votes(aggregate_id).await?;
        if !self.aggregates.set_reaction_counts(aggregate_id, &counts).await? {
            debug!(aggregate_id = %aggregate_id, "Rollup target no longer exists");
            return Ok(None);
        }
        debug!(aggregate_id = %aggregate_id, kinds = counts.len(), "Recomputed reaction counts");
        Ok(Some(counts))
    }
}

//! Maintenance of existing aggregates: reverse-index cleanup when entities go
//! away, and reaction count rollups.
//!
//! Both run off the event path through [`MaintenanceTask`]s and are safely
//! re-runnable.
mod reactions;
mod reverse;

pub use reactions::ReactionRollup;
pub use reverse::{RemovalSummary, ReverseMaintainer, StripOutcome};

use feed_engine_shared::types::{AggregateId, EntityRef, ReferenceScope};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct MaintenanceConfig {
    /// Referencing aggregates loaded per reverse-index pass.
    pub batch_size: usize,
    /// Passes after which a removal gives up and reports itself incomplete.
    pub max_passes: usize,
    pub max_conflict_retries: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_passes: 50,
            max_conflict_retries: 5,
        }
    }
}

/// Work scheduled onto the orchestrator's worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceTask {
    RecomputeReactions(AggregateId),
    RemoveReference { entity: EntityRef, scope: ReferenceScope },
    DeleteAnchored(EntityRef),
    Backfill {
        follower_id: Uuid,
        target_id: Uuid,
        limit: usize,
    },
}

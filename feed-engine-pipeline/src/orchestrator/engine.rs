use std::sync::Arc;

use feed_engine_shared::types::{Event, EventOutcome};
use tracing::{debug, instrument, warn};

use crate::aggregator::Aggregator;
use crate::distributor::FanoutDistributor;
use crate::errors::{OrchestratorError, ProcessorError};
use crate::maintenance::{MaintenanceTask, ReactionRollup, ReverseMaintainer};
use crate::processor::{EventPlan, ProcessEvents};
use crate::threshold::ThresholdDetector;

/// What applying one plan did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub aggregates_touched: usize,
    pub milestones_fired: usize,
    pub fanout_inserted: u64,
    pub notifications_inserted: u64,
}

/// Applies classified events and maintenance tasks to the stores. Holds no
/// state of its own beyond the components it drives.
pub struct FeedEngine {
    processor: Arc<dyn ProcessEvents>,
    aggregator: Arc<Aggregator>,
    threshold: Arc<ThresholdDetector>,
    distributor: Arc<FanoutDistributor>,
    maintainer: Arc<ReverseMaintainer>,
    rollup: Arc<ReactionRollup>,
}

impl FeedEngine {
    pub fn new(
        processor: Arc<dyn ProcessEvents>,
        aggregator: Arc<Aggregator>,
        threshold: Arc<ThresholdDetector>,
        distributor: Arc<FanoutDistributor>,
        maintainer: Arc<ReverseMaintainer>,
        rollup: Arc<ReactionRollup>,
    ) -> Self {
        Self {
            processor,
            aggregator,
            threshold,
            distributor,
            maintainer,
            rollup,
        }
    }

    pub fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        self.processor.classify(event)
    }

    /// Classifies and applies one event, returning the outcome to ack.
    pub async fn handle(&self, event: &Event) -> EventOutcome {
        match self.classify(event) {
            Ok(Some(plan)) => {
                let result = self.apply(event, &plan).await;
                Self::outcome(&plan, &result)
            }
            Ok(None) => EventOutcome::Empty,
            Err(err) => EventOutcome::Permanent(err.to_string()),
        }
    }

    /// Maps an apply result onto the queue outcome.
    ///
    /// A plan that only checks thresholds and fires nothing leaves the feeds
    /// untouched, which is an `Empty` event rather than a `Finished` one.
    pub fn outcome(plan: &EventPlan, result: &Result<ApplyReport, OrchestratorError>) -> EventOutcome {
        match result {
            Ok(report) if !plan.has_mutations() && report.milestones_fired == 0 => EventOutcome::Empty,
            Ok(_) => EventOutcome::Finished,
            Err(err) if err.is_transient() => EventOutcome::Transient(err.to_string()),
            Err(err) => EventOutcome::Permanent(err.to_string()),
        }
    }

    #[instrument(skip(self, event, plan), fields(event_id = event.id, entity = %event.entity()))]
    pub async fn apply(&self, event: &Event, plan: &EventPlan) -> Result<ApplyReport, OrchestratorError> {
        let mut report = ApplyReport::default();

        if let Some(change) = &plan.language {
            let touched = self
                .maintainer
                .set_language(change.owner_id, change.language.as_deref())
                .await?;
            report.aggregates_touched += touched as usize;
        }

        for instruction in &plan.merges {
            let merged = self.aggregator.merge(event, instruction).await?;
            if merged.changed {
                report.aggregates_touched += 1;
            }
            // Distribution is idempotent, and a redelivered event may have
            // crashed between the merge and the fan-out.
            let summary = self.distributor.distribute(&merged.aggregate).await?;
            report.fanout_inserted += summary.fanout_inserted;
            report.notifications_inserted += summary.notifications_inserted;
        }

        for removal in &plan.removals {
            let summary = self.maintainer.remove_scoped(&removal.entity, &removal.scope).await?;
            report.aggregates_touched += summary.updated + summary.deleted;
        }
        for anchor in &plan.anchored_deletions {
            report.aggregates_touched += self.maintainer.delete_anchored(anchor).await?;
        }
        for owner in &plan.owner_purges {
            report.aggregates_touched += self.maintainer.purge_owner(*owner).await?;
        }

        for check in &plan.counters {
            if self.threshold.check_counter(check).await? {
                report.milestones_fired += 1;
            }
        }
        for sample in &plan.samples {
            if self.threshold.observe(sample).await? {
                report.milestones_fired += 1;
            }
        }

        debug!(
            aggregates_touched = report.aggregates_touched,
            milestones_fired = report.milestones_fired,
            fanout_inserted = report.fanout_inserted,
            "Applied event"
        );
        Ok(report)
    }

    pub async fn run_task(&self, task: &MaintenanceTask) -> Result<(), OrchestratorError> {
        match task {
            MaintenanceTask::RecomputeReactions(aggregate_id) => {
                self.rollup.recompute(*aggregate_id).await?;
            }
            MaintenanceTask::RemoveReference { entity, scope } => {
                self.maintainer.remove_scoped(entity, scope).await?;
            }
            MaintenanceTask::DeleteAnchored(anchor) => {
                self.maintainer.delete_anchored(anchor).await?;
            }
            MaintenanceTask::Backfill {
                follower_id,
                target_id,
                limit,
            } => {
                self.distributor
                    .backfill_follower(*follower_id, *target_id, *limit)
                    .await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FeedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedEngine").finish_non_exhaustive()
    }
}

pub(crate) fn log_task_failure(task: &MaintenanceTask, err: &OrchestratorError) {
    warn!(task = ?task, error = %err, transient = err.is_transient(), "Maintenance task failed");
}

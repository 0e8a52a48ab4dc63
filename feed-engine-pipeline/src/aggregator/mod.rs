//! Merges classified events into aggregates.
//!
//! An event already merged under a grouping key goes back to the aggregate it
//! landed in, and an anchored instruction goes to the aggregate of its join
//! row, whatever their generation. Anything else lands in the latest
//! aggregate for its key, unless that one is older than the rotation window
//! or the instruction asks for a new one, in which case the next generation
//! is created. Writes are optimistic: a version or uniqueness conflict re-runs
//! the whole merge from a fresh read.
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use feed_engine_repository::AggregateRepository;
use feed_engine_shared::types::{Aggregate, CategoryError, Event};
use tokio_retry::{
    RetryIf,
    strategy::{ExponentialBackoff, jitter},
};
use tracing::{debug, instrument, warn};

use crate::errors::AggregatorError;
use crate::locks::KeyLocks;
use crate::processor::MergeInstruction;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// How long after its creation an aggregate keeps absorbing events.
    pub window: ChronoDuration,
    pub max_conflict_retries: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: ChronoDuration::hours(24),
            max_conflict_retries: 5,
        }
    }
}

/// Result of one merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub aggregate: Aggregate,
    pub created: bool,
    /// `false` when every id was already present, as on redelivery.
    pub changed: bool,
}

pub struct Aggregator {
    repository: Arc<dyn AggregateRepository>,
    config: AggregatorConfig,
    locks: KeyLocks,
}

impl Aggregator {
    pub fn new(repository: Arc<dyn AggregateRepository>, config: AggregatorConfig) -> Self {
        Self {
            repository,
            config,
            locks: KeyLocks::new(),
        }
    }

    #[instrument(skip(self, event, instruction), fields(event_id = event.id, key = %instruction.key))]
    pub async fn merge(
        &self,
        event: &Event,
        instruction: &MergeInstruction,
    ) -> Result<MergeOutcome, AggregatorError> {
        let key = instruction.key.to_string();
        if instruction.additions.is_empty() {
            return Err(AggregatorError::EmptyMerge(key));
        }

        let _guard = self.locks.lock(&key).await;
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(5)
            .max_delay(Duration::from_millis(500))
            .map(jitter)
            .take(self.config.max_conflict_retries);

        let outcome = RetryIf::spawn(
            strategy,
            || self.try_merge(&key, event, instruction),
            |err: &AggregatorError| {
                if err.is_conflict() {
                    debug!(error = %err, "Merge conflict, retrying");
                }
                err.is_conflict()
            },
        )
        .await;

        match outcome {
            Err(err) if err.is_conflict() => {
                warn!(key = %key, "Merge conflicts exhausted the retry budget");
                Err(AggregatorError::ConflictRetriesExhausted {
                    key,
                    attempts: self.config.max_conflict_retries + 1,
                })
            }
            other => other,
        }
    }

    async fn try_merge(
        &self,
        key: &str,
        event: &Event,
        instruction: &MergeInstruction,
    ) -> Result<MergeOutcome, AggregatorError> {
        if let Some(previous) = self.repository.aggregate_for_event(key, event.id).await? {
            debug!(aggregate_id = %previous.id, "Event already merged, replaying into its aggregate");
            return self.append(previous, event, instruction).await;
        }
        if let Some(anchor) = &instruction.anchor {
            let anchored = self
                .repository
                .anchored_aggregates(anchor)
                .await?
                .into_iter()
                .find(|aggregate| aggregate.grouping_key == key);
            if let Some(aggregate) = anchored {
                return self.append(aggregate, event, instruction).await;
            }
        }

        match self.repository.latest_for_key(key).await? {
            Some(current) if self.reuses(&current, event, instruction) => {
                self.append(current, event, instruction).await
            }
            Some(current) => self.create(current.generation + 1, event, instruction).await,
            None => self.create(0, event, instruction).await,
        }
    }

    /// Rotation policy for the latest aggregate of a key.
    fn reuses(&self, current: &Aggregate, event: &Event, instruction: &MergeInstruction) -> bool {
        !instruction.start_new && event.occurred_at < current.created_at + self.config.window
    }

    async fn append(
        &self,
        mut aggregate: Aggregate,
        event: &Event,
        instruction: &MergeInstruction,
    ) -> Result<MergeOutcome, AggregatorError> {
        if !apply_instruction(&mut aggregate, instruction)? {
            debug!(aggregate_id = %aggregate.id, "Merge is a no-op");
            self.repository
                .record_contribution(&aggregate.grouping_key, event.id, aggregate.id)
                .await?;
            return Ok(MergeOutcome {
                aggregate,
                created: false,
                changed: false,
            });
        }
        aggregate.updated_at = aggregate.updated_at.max(event.occurred_at);
        let stored = self.repository.append_aggregate(&aggregate, event.id).await?;
        debug!(aggregate_id = %stored.id, version = stored.version, "Merged into aggregate");
        Ok(MergeOutcome {
            aggregate: stored,
            created: false,
            changed: true,
        })
    }

    async fn create(
        &self,
        generation: i64,
        event: &Event,
        instruction: &MergeInstruction,
    ) -> Result<MergeOutcome, AggregatorError> {
        let mut aggregate = Aggregate::new(&instruction.key, generation, event.id, event.occurred_at);
        apply_instruction(&mut aggregate, instruction)?;
        self.repository.insert_aggregate(&aggregate).await?;
        debug!(aggregate_id = %aggregate.id, generation, "Created aggregate");
        Ok(MergeOutcome {
            aggregate,
            created: true,
            changed: true,
        })
    }
}

/// Applies the merge rules of an instruction in memory. Returns whether the
/// aggregate changed.
pub fn apply_instruction(
    aggregate: &mut Aggregate,
    instruction: &MergeInstruction,
) -> Result<bool, CategoryError> {
    let mut changed = false;
    for addition in &instruction.additions {
        changed |= aggregate.append(addition.category, addition.id, addition.group.as_deref())?;
    }
    if let Some(language) = &instruction.language {
        if aggregate.language.as_ref() != Some(language) {
            aggregate.language = Some(language.clone());
            changed = true;
        }
    }
    if aggregate.anchor.is_none() && instruction.anchor.is_some() {
        aggregate.anchor = instruction.anchor;
        changed = true;
    }
    Ok(changed)
}

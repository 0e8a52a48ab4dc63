//! Threshold detection.
//!
//! Two triggers lead to a community milestone: a monotonic counter crossing
//! its threshold upward, and a burst of sub-events (distinct actors) landing
//! within a rolling window. Either way the milestone fires through
//! [`ThresholdRepository::try_mark`], whose unique mark row is the only thing
//! standing between concurrent crossings and a duplicate event.
use std::sync::Arc;

use chrono::{Duration, Utc};
use feed_engine_repository::ThresholdRepository;
use feed_engine_shared::types::{
    EntityRef, EntityType, EventId, Milestone, NewEvent, ThresholdMark, ThresholdSample,
};
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::errors::ThresholdError;
use crate::processor::CounterCheck;

#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    pub user_followers: i64,
    pub review_likes: i64,
    pub review_comments: i64,
    /// Distinct owners within `game_owned_window` that make a game popular.
    pub game_owned_count: usize,
    pub game_owned_window: Duration,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            user_followers: 100,
            review_likes: 25,
            review_comments: 25,
            game_owned_count: 20,
            game_owned_window: Duration::hours(24),
        }
    }
}

impl ThresholdConfig {
    /// Counter threshold for edge-triggered milestones.
    pub fn counter_threshold(&self, milestone: Milestone) -> Option<i64> {
        match milestone {
            Milestone::UserPopular => Some(self.user_followers),
            Milestone::ReviewPopular => Some(self.review_likes),
            Milestone::ReviewDiscussed => Some(self.review_comments),
            Milestone::GamePopular => None,
        }
    }

    /// `(count, window)` for density milestones.
    pub fn density_window(&self, milestone: Milestone) -> Option<(usize, Duration)> {
        match milestone {
            Milestone::GamePopular => Some((self.game_owned_count, self.game_owned_window)),
            _ => None,
        }
    }
}

/// Upward crossing: `old < threshold <= new`.
pub fn crossed(old: i64, new: i64, threshold: i64) -> bool {
    old < threshold && threshold <= new
}

/// Whether the `count`-th most recent timestamp is within `window` of the
/// most recent one. `timestamps` are newest first.
pub fn dense_enough(timestamps: &[chrono::DateTime<Utc>], count: usize, window: Duration) -> bool {
    if count == 0 || timestamps.len() < count {
        return false;
    }
    timestamps[0] - timestamps[count - 1] <= window
}

pub struct ThresholdDetector {
    repository: Arc<dyn ThresholdRepository>,
    config: ThresholdConfig,
}

impl ThresholdDetector {
    pub fn new(repository: Arc<dyn ThresholdRepository>, config: ThresholdConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Edge-triggered check. Returns whether this call fired the milestone.
    pub async fn check_counter(&self, check: &CounterCheck) -> Result<bool, ThresholdError> {
        let Some(threshold) = self.config.counter_threshold(check.milestone) else {
            return Ok(false);
        };
        if !crossed(check.old, check.new, threshold) {
            return Ok(false);
        }
        Ok(self.fire(check.subject, check.milestone).await?.is_some())
    }

    /// Records a density sub-event and evaluates the window incrementally.
    ///
    /// The window is evaluated even when the actor was already sampled, so a
    /// redelivered sub-event still gets a chance to fire a milestone a crash
    /// may have missed. Samples that fell out of the window are dropped, and
    /// once the milestone is marked the entity keeps none at all.
    pub async fn observe(&self, sample: &ThresholdSample) -> Result<bool, ThresholdError> {
        let Some((count, window)) = self.config.density_window(sample.milestone) else {
            return Ok(false);
        };
        if self
            .repository
            .get_mark(&sample.entity, sample.milestone)
            .await?
            .is_some()
        {
            self.repository
                .clear_samples(&sample.entity, sample.milestone)
                .await?;
            return Ok(false);
        }

        if !self.repository.record_sample(sample).await? {
            debug!(entity = %sample.entity, actor = %sample.actor_id, "Actor already sampled");
        }
        let pruned = self
            .repository
            .prune_samples(&sample.entity, sample.milestone, sample.occurred_at - window)
            .await?;
        if pruned > 0 {
            debug!(entity = %sample.entity, pruned, "Dropped samples outside the window");
        }

        let fired = self
            .maybe_fire(
                sample.entity.entity_type,
                sample.entity.id,
                sample.milestone,
                count,
                window,
            )
            .await?;
        if fired {
            self.repository
                .clear_samples(&sample.entity, sample.milestone)
                .await?;
        }
        Ok(fired)
    }

    /// Fires `milestone` for the entity once `window_count` samples fall
    /// within `window_duration` of the latest one.
    #[instrument(skip(self))]
    pub async fn maybe_fire(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        milestone: Milestone,
        window_count: usize,
        window_duration: Duration,
    ) -> Result<bool, ThresholdError> {
        let entity = EntityRef::new(entity_type, entity_id);
        let timestamps = self
            .repository
            .recent_samples(&entity, milestone, window_count)
            .await?;
        if !dense_enough(&timestamps, window_count, window_duration) {
            return Ok(false);
        }
        Ok(self.fire(entity, milestone).await?.is_some())
    }

    /// Claims the mark and enqueues the milestone event. Only the winning
    /// caller gets an event id.
    pub async fn fire(
        &self,
        subject: EntityRef,
        milestone: Milestone,
    ) -> Result<Option<EventId>, ThresholdError> {
        let now = Utc::now();
        let mark = ThresholdMark::new(subject, milestone, now);
        let event = NewEvent::addition(EntityType::Milestone, subject.id)
            .with_extra(json!({
                "milestone": milestone.as_str(),
                "subject_type": subject.entity_type.as_str(),
            }))
            .at(now);

        let fired = self.repository.try_mark(&mark, &event).await?;
        match fired {
            Some(event_id) => info!(event_id, subject = %subject, milestone = %milestone, "Milestone fired"),
            None => debug!(subject = %subject, milestone = %milestone, "Milestone already marked"),
        }
        Ok(fired)
    }
}

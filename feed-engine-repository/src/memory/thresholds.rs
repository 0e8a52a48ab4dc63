use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_engine_shared::types::{EntityRef, EventId, Milestone, NewEvent, ThresholdMark, ThresholdSample};

use super::MemoryFeedStore;
use crate::errors::RepositoryError;
use crate::interfaces::ThresholdRepository;

#[async_trait]
impl ThresholdRepository for MemoryFeedStore {
    async fn record_sample(&self, sample: &ThresholdSample) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        let key = (sample.entity, sample.milestone, sample.actor_id);
        if state.samples.contains_key(&key) {
            return Ok(false);
        }
        state.samples.insert(key, sample.occurred_at);
        Ok(true)
    }

    async fn recent_samples(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
        limit: usize,
    ) -> Result<Vec<DateTime<Utc>>, RepositoryError> {
        let mut timestamps: Vec<DateTime<Utc>> = self
            .read()
            .samples
            .iter()
            .filter(|((sampled, sampled_milestone, _), _)| sampled == entity && *sampled_milestone == milestone)
            .map(|(_, occurred_at)| *occurred_at)
            .collect();
        timestamps.sort_by(|a, b| b.cmp(a));
        timestamps.truncate(limit);
        Ok(timestamps)
    }

    async fn prune_samples(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
        before: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        let count = state.samples.len();
        state.samples.retain(|(sampled, sampled_milestone, _), occurred_at| {
            sampled != entity || *sampled_milestone != milestone || *occurred_at >= before
        });
        Ok((count - state.samples.len()) as u64)
    }

    async fn clear_samples(&self, entity: &EntityRef, milestone: Milestone) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        let count = state.samples.len();
        state
            .samples
            .retain(|(sampled, sampled_milestone, _), _| sampled != entity || *sampled_milestone != milestone);
        Ok((count - state.samples.len()) as u64)
    }

    async fn try_mark(
        &self,
        mark: &ThresholdMark,
        event: &NewEvent,
    ) -> Result<Option<EventId>, RepositoryError> {
        let mut state = self.write()?;
        let key = (mark.entity(), mark.milestone);
        if state.marks.contains_key(&key) {
            return Ok(None);
        }
        state.marks.insert(key, mark.clone());
        Ok(Some(state.push_event(event, Utc::now())))
    }

    async fn get_mark(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
    ) -> Result<Option<ThresholdMark>, RepositoryError> {
        Ok(self.read().marks.get(&(*entity, milestone)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_engine_shared::types::EntityType;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_try_mark_succeeds_once() {
        let store = MemoryFeedStore::new();
        let game = EntityRef::game(Uuid::new_v4());
        let mark = ThresholdMark::new(game, Milestone::GamePopular, Utc::now());
        let event = NewEvent::addition(EntityType::Milestone, game.id);

        assert!(store.try_mark(&mark, &event).await.unwrap().is_some());
        assert!(store.try_mark(&mark, &event).await.unwrap().is_none());
        assert_eq!(store.mark_count(), 1);
        assert_eq!(store.events().len(), 1);
    }

    #[tokio::test]
    async fn test_one_sample_per_actor() {
        let store = MemoryFeedStore::new();
        let game = EntityRef::game(Uuid::new_v4());
        let actor = Uuid::new_v4();
        let sample = ThresholdSample {
            entity: game,
            milestone: Milestone::GamePopular,
            actor_id: actor,
            occurred_at: Utc::now(),
        };

        assert!(store.record_sample(&sample).await.unwrap());
        assert!(!store.record_sample(&sample).await.unwrap());
        assert_eq!(store.recent_samples(&game, Milestone::GamePopular, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_and_other_entities() {
        let store = MemoryFeedStore::new();
        let game = EntityRef::game(Uuid::new_v4());
        let other = EntityRef::game(Uuid::new_v4());
        let now = Utc::now();
        for (entity, age) in [(game, 48), (game, 1), (other, 48)] {
            let sample = ThresholdSample {
                entity,
                milestone: Milestone::GamePopular,
                actor_id: Uuid::new_v4(),
                occurred_at: now - chrono::Duration::hours(age),
            };
            store.record_sample(&sample).await.unwrap();
        }

        let cutoff = now - chrono::Duration::hours(24);
        assert_eq!(store.prune_samples(&game, Milestone::GamePopular, cutoff).await.unwrap(), 1);
        assert_eq!(store.sample_count(), 2);

        assert_eq!(store.clear_samples(&game, Milestone::GamePopular).await.unwrap(), 1);
        assert_eq!(store.sample_count(), 1);
    }
}

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use feed_engine_repository::{EventQueueRepository, EventTransition};
use feed_engine_shared::types::{Event, EventId, EventOutcome, EventStatus, NewEvent, RetryPolicy};
use tracing::{debug, error, warn};

use crate::errors::ConsumerError;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch_size: usize,
    /// Sleep between polls that came back empty.
    pub idle_interval: std::time::Duration,
    /// A `Started` event older than this is handed out again.
    pub lease: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            idle_interval: std::time::Duration::from_millis(500),
            lease: Duration::seconds(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// The event queue as seen by the pipeline.
pub struct EventQueue {
    repository: Arc<dyn EventQueueRepository>,
    config: QueueConfig,
}

impl EventQueue {
    pub fn new(repository: Arc<dyn EventQueueRepository>, config: QueueConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub async fn enqueue(&self, event: &NewEvent) -> Result<EventId, ConsumerError> {
        Ok(self.repository.enqueue(event).await?)
    }

    /// Claims the next batch of due events.
    pub async fn poll(&self) -> Result<Vec<Event>, ConsumerError> {
        Ok(self
            .repository
            .poll(self.config.batch_size, self.config.lease, Utc::now())
            .await?)
    }

    /// The transition an outcome maps to for an event in its current retry
    /// state.
    pub fn transition_for(&self, event: &Event, outcome: &EventOutcome, now: DateTime<Utc>) -> EventTransition {
        let policy = &self.config.retry;
        match outcome {
            EventOutcome::Finished => EventTransition::to(EventStatus::Finished),
            EventOutcome::Empty => EventTransition::to(EventStatus::Empty),
            EventOutcome::Deferred(until) => EventTransition::delayed_until(*until),
            EventOutcome::Transient(reason) => {
                let attempt = event.retry_count + 1;
                if policy.exhausted(attempt) {
                    EventTransition::to(EventStatus::Error)
                        .with_retry()
                        .with_error(format!("retries exhausted: {reason}"))
                } else {
                    EventTransition::delayed_until(now + policy.delay_for(attempt))
                        .with_retry()
                        .with_error(reason.clone())
                }
            }
            EventOutcome::Permanent(reason) => EventTransition::to(EventStatus::Error).with_error(reason.clone()),
        }
    }

    /// Records the outcome of processing `event` and returns the transition
    /// that was requested.
    pub async fn ack(&self, event: &Event, outcome: &EventOutcome) -> Result<EventTransition, ConsumerError> {
        let transition = self.transition_for(event, outcome, Utc::now());
        let applied = self.repository.transition(event.id, &transition).await?;
        if !applied {
            warn!(event_id = event.id, status = %transition.status, "Ack ignored, event no longer started");
            return Ok(transition);
        }
        match transition.status {
            EventStatus::Error => error!(
                event_id = event.id,
                entity = %event.entity(),
                action = %event.action,
                retry_count = event.retry_count,
                error = transition.error.as_deref().unwrap_or_default(),
                "Event failed"
            ),
            EventStatus::Delayed => debug!(
                event_id = event.id,
                scheduled_at = ?transition.scheduled_at,
                "Event delayed"
            ),
            status => debug!(event_id = event.id, status = %status, "Event acked"),
        }
        Ok(transition)
    }

    /// Events that ended in `Error`, for operators.
    pub async fn failed_events(&self, limit: usize) -> Result<Vec<Event>, ConsumerError> {
        Ok(self.repository.failed_events(limit).await?)
    }

    pub async fn requeue(&self, event_id: EventId) -> Result<bool, ConsumerError> {
        Ok(self.repository.requeue(event_id, Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_engine_repository::MemoryFeedStore;
    use feed_engine_shared::types::EntityType;
    use uuid::Uuid;

    fn queue(store: Arc<MemoryFeedStore>, max_retries: i32) -> EventQueue {
        EventQueue::new(
            store,
            QueueConfig {
                retry: RetryPolicy {
                    max_retries,
                    ..RetryPolicy::default()
                },
                ..QueueConfig::default()
            },
        )
    }

    async fn claimed(queue: &EventQueue) -> Event {
        queue
            .enqueue(&NewEvent::addition(EntityType::Review, Uuid::new_v4()))
            .await
            .unwrap();
        queue.poll().await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_poll_returns_created_order() {
        let store = Arc::new(MemoryFeedStore::new());
        let queue = queue(store, 5);
        for _ in 0..3 {
            queue
                .enqueue(&NewEvent::addition(EntityType::Game, Uuid::new_v4()))
                .await
                .unwrap();
        }
        let events = queue.poll().await.unwrap();
        let ids: Vec<EventId> = events.iter().map(|event| event.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(events.iter().all(|event| event.status == EventStatus::Started));
        assert!(queue.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_rescheduled_with_backoff() {
        let store = Arc::new(MemoryFeedStore::new());
        let queue = queue(store.clone(), 5);
        let event = claimed(&queue).await;

        let before = Utc::now();
        let transition = queue
            .ack(&event, &EventOutcome::Transient("pool timed out".to_string()))
            .await
            .unwrap();
        assert_eq!(transition.status, EventStatus::Delayed);
        assert!(transition.scheduled_at.unwrap() >= before + Duration::seconds(1));

        let stored = &store.events()[0];
        assert_eq!(stored.status, EventStatus::Delayed);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("pool timed out"));
        assert!(queue.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_bound_ends_in_error() {
        let store = Arc::new(MemoryFeedStore::new());
        let queue = queue(store.clone(), 0);
        let event = claimed(&queue).await;

        queue
            .ack(&event, &EventOutcome::Transient("still down".to_string()))
            .await
            .unwrap();
        assert_eq!(store.events()[0].status, EventStatus::Error);
        assert_eq!(queue.failed_events(10).await.unwrap().len(), 1);

        assert!(queue.requeue(event.id).await.unwrap());
        assert_eq!(queue.poll().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deferred_keeps_the_retry_budget() {
        let store = Arc::new(MemoryFeedStore::new());
        let queue = queue(store.clone(), 5);
        let event = claimed(&queue).await;

        let until = Utc::now() + Duration::seconds(30);
        queue.ack(&event, &EventOutcome::Deferred(until)).await.unwrap();
        let stored = &store.events()[0];
        assert_eq!(stored.status, EventStatus::Delayed);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.scheduled_at, until);
    }

    #[tokio::test]
    async fn test_terminal_events_ignore_later_acks() {
        let store = Arc::new(MemoryFeedStore::new());
        let queue = queue(store.clone(), 5);
        let event = claimed(&queue).await;

        queue.ack(&event, &EventOutcome::Empty).await.unwrap();
        queue
            .ack(&event, &EventOutcome::Permanent("late".to_string()))
            .await
            .unwrap();
        let stored = &store.events()[0];
        assert_eq!(stored.status, EventStatus::Empty);
        assert!(stored.last_error.is_none());
    }

    #[test]
    fn test_permanent_outcome_does_not_consume_retries() {
        let queue = queue(Arc::new(MemoryFeedStore::new()), 5);
        let event = Event::from_new(1, &NewEvent::addition(EntityType::Review, Uuid::new_v4()), Utc::now());
        let transition = queue.transition_for(&event, &EventOutcome::Permanent("missing actor_id".into()), Utc::now());
        assert_eq!(transition.status, EventStatus::Error);
        assert!(!transition.increment_retry);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use feed_engine_shared::types::{Event, EventId, EventStatus, NewEvent};

use super::{MemoryFeedStore, MemoryState};
use crate::errors::RepositoryError;
use crate::interfaces::{EventQueueRepository, EventTransition};

impl MemoryState {
    pub(super) fn push_event(&mut self, event: &NewEvent, now: DateTime<Utc>) -> EventId {
        self.next_event_id += 1;
        let id = self.next_event_id;
        self.events.insert(id, Event::from_new(id, event, now));
        id
    }
}

fn is_due(event: &Event, lease_expired_before: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match event.status {
        EventStatus::New | EventStatus::Delayed => event.scheduled_at <= now,
        EventStatus::Started => event
            .started_at
            .is_some_and(|started_at| started_at <= lease_expired_before),
        _ => false,
    }
}

#[async_trait]
impl EventQueueRepository for MemoryFeedStore {
    async fn enqueue(&self, event: &NewEvent) -> Result<EventId, RepositoryError> {
        let mut state = self.write()?;
        Ok(state.push_event(event, Utc::now()))
    }

    async fn poll(
        &self,
        batch_size: usize,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, RepositoryError> {
        let mut state = self.write()?;
        let lease_expired_before = now - lease;

        let mut claimed = Vec::new();
        for event in state.events.values_mut() {
            if claimed.len() >= batch_size {
                break;
            }
            if is_due(event, lease_expired_before, now) {
                event.status = EventStatus::Started;
                event.started_at = Some(now);
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    async fn transition(
        &self,
        event_id: EventId,
        transition: &EventTransition,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        let Some(event) = state.events.get_mut(&event_id) else {
            return Ok(false);
        };
        if event.status != EventStatus::Started {
            return Ok(false);
        }

        event.status = transition.status;
        if let Some(scheduled_at) = transition.scheduled_at {
            event.scheduled_at = scheduled_at;
        }
        if transition.increment_retry {
            event.retry_count += 1;
        }
        if let Some(error) = &transition.error {
            event.last_error = Some(error.clone());
        }
        Ok(true)
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, RepositoryError> {
        Ok(self.read().events.get(&event_id).cloned())
    }

    async fn failed_events(&self, limit: usize) -> Result<Vec<Event>, RepositoryError> {
        Ok(self
            .read()
            .events
            .values()
            .filter(|event| event.status == EventStatus::Error)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn requeue(&self, event_id: EventId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        match state.events.get_mut(&event_id) {
            Some(event) if event.status == EventStatus::Error => {
                event.status = EventStatus::New;
                event.retry_count = 0;
                event.scheduled_at = now;
                event.started_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

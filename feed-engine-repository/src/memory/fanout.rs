use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_engine_shared::types::{
    AggregateId, FanoutEntry, FeedCursor, FeedEntry, FeedSource, NotificationEntry,
};
use uuid::Uuid;

use super::MemoryFeedStore;
use crate::errors::RepositoryError;
use crate::interfaces::FanoutRepository;

#[async_trait]
impl FanoutRepository for MemoryFeedStore {
    async fn upsert_fanout(
        &self,
        aggregate_id: AggregateId,
        follower_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        if !state.aggregates.contains_key(&aggregate_id) {
            return Err(RepositoryError::not_found(format!("aggregate {}", aggregate_id)));
        }

        let mut inserted = 0;
        for follower_id in follower_ids {
            state
                .fanout
                .entry((aggregate_id, *follower_id))
                .or_insert_with(|| {
                    inserted += 1;
                    FanoutEntry {
                        id: Uuid::new_v4(),
                        aggregate_id,
                        follower_id: *follower_id,
                        created_at,
                        is_new: true,
                        hidden: false,
                    }
                });
        }
        Ok(inserted)
    }

    async fn upsert_notification(
        &self,
        aggregate_id: AggregateId,
        recipient_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        if !state.aggregates.contains_key(&aggregate_id) {
            return Err(RepositoryError::not_found(format!("aggregate {}", aggregate_id)));
        }
        if state.notifications.contains_key(&(aggregate_id, recipient_id)) {
            return Ok(false);
        }
        state.notifications.insert(
            (aggregate_id, recipient_id),
            NotificationEntry {
                id: Uuid::new_v4(),
                aggregate_id,
                recipient_id,
                created_at,
                is_new: true,
            },
        );
        Ok(true)
    }

    async fn feed_entries(
        &self,
        viewer_id: Uuid,
        before: Option<FeedCursor>,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, RepositoryError> {
        let state = self.read();
        let feed = state
            .fanout
            .values()
            .filter(|entry| entry.follower_id == viewer_id && !entry.hidden)
            .map(|entry| FeedEntry {
                aggregate_id: entry.aggregate_id,
                created_at: entry.created_at,
                is_new: entry.is_new,
                source: FeedSource::Feed,
            });
        let notifications = state
            .notifications
            .values()
            .filter(|entry| entry.recipient_id == viewer_id)
            .map(|entry| FeedEntry {
                aggregate_id: entry.aggregate_id,
                created_at: entry.created_at,
                is_new: entry.is_new,
                source: FeedSource::Notification,
            });

        let mut entries: Vec<FeedEntry> = feed
            .chain(notifications)
            .filter(|entry| {
                before.is_none_or(|cursor| cursor.is_before(entry.created_at, entry.aggregate_id))
            })
            .collect();
        entries.sort_by(|a, b| b.cursor().cmp(&a.cursor()));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn unread_notifications(&self, recipient_id: Uuid) -> Result<i64, RepositoryError> {
        let count = self
            .read()
            .notifications
            .values()
            .filter(|entry| entry.recipient_id == recipient_id && entry.is_new)
            .count();
        Ok(count as i64)
    }

    async fn mark_notifications_read(&self, recipient_id: Uuid) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        let mut cleared = 0;
        for entry in state.notifications.values_mut() {
            if entry.recipient_id == recipient_id && entry.is_new {
                entry.is_new = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn mark_feed_read(&self, follower_id: Uuid) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        let mut cleared = 0;
        for entry in state.fanout.values_mut() {
            if entry.follower_id == follower_id && entry.is_new {
                entry.is_new = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn hide_entry(&self, follower_id: Uuid, aggregate_id: AggregateId) -> Result<bool, RepositoryError> {
        let mut state = self.write()?;
        match state.fanout.get_mut(&(aggregate_id, follower_id)) {
            Some(entry) if !entry.hidden => {
                entry.hidden = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fanout_entries_for(&self, aggregate_id: AggregateId) -> Result<Vec<FanoutEntry>, RepositoryError> {
        let mut entries: Vec<FanoutEntry> = self
            .read()
            .fanout
            .values()
            .filter(|entry| entry.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.follower_id);
        Ok(entries)
    }

    async fn notification_entries_for(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<NotificationEntry>, RepositoryError> {
        let mut entries: Vec<NotificationEntry> = self
            .read()
            .notifications
            .values()
            .filter(|entry| entry.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.recipient_id);
        Ok(entries)
    }
}

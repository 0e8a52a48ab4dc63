use chrono::{DateTime, Utc};
use feed_engine_shared::types::{AggregateId, FanoutEntry, FeedCursor, FeedEntry, NotificationEntry};
use uuid::Uuid;

use crate::errors::RepositoryError;

/// Personal feed and notification inbox rows.
#[async_trait::async_trait]
pub trait FanoutRepository: Send + Sync {
    /// Inserts one feed entry per follower, skipping pairs that already exist.
    /// Returns the number of rows actually inserted.
    async fn upsert_fanout(
        &self,
        aggregate_id: AggregateId,
        follower_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Inserts a notification unless the pair already exists.
    async fn upsert_notification(
        &self,
        aggregate_id: AggregateId,
        recipient_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// The viewer's visible feed and notification entries, newest first,
    /// strictly older than `before` when given.
    async fn feed_entries(
        &self,
        viewer_id: Uuid,
        before: Option<FeedCursor>,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, RepositoryError>;

    async fn unread_notifications(&self, recipient_id: Uuid) -> Result<i64, RepositoryError>;

    async fn mark_notifications_read(&self, recipient_id: Uuid) -> Result<u64, RepositoryError>;

    async fn mark_feed_read(&self, follower_id: Uuid) -> Result<u64, RepositoryError>;

    async fn hide_entry(&self, follower_id: Uuid, aggregate_id: AggregateId) -> Result<bool, RepositoryError>;

    async fn fanout_entries_for(&self, aggregate_id: AggregateId) -> Result<Vec<FanoutEntry>, RepositoryError>;

    async fn notification_entries_for(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<NotificationEntry>, RepositoryError>;
}

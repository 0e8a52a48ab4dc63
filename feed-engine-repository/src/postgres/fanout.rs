use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_engine_shared::types::{
    AggregateId, FanoutEntry, FeedCursor, FeedEntry, FeedSource, NotificationEntry,
};
use sqlx::Row;
use uuid::Uuid;

use super::PostgresFeedStore;
use super::rows::{limit, map_missing_aggregate};
use crate::errors::RepositoryError;
use crate::interfaces::FanoutRepository;

#[async_trait]
impl FanoutRepository for PostgresFeedStore {
    async fn upsert_fanout(
        &self,
        aggregate_id: AggregateId,
        follower_ids: &[Uuid],
        created_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        if follower_ids.is_empty() {
            return Ok(0);
        }

        let entry_ids: Vec<Uuid> = follower_ids.iter().map(|_| Uuid::new_v4()).collect();
        let result = sqlx::query(
            r#"
            INSERT INTO fanout_entries (id, aggregate_id, follower_id, created_at)
            SELECT entry_id, $2, follower_id, $4
            FROM UNNEST($1::uuid[], $3::uuid[]) AS t (entry_id, follower_id)
            ON CONFLICT (aggregate_id, follower_id) DO NOTHING
            "#,
        )
        .bind(&entry_ids)
        .bind(aggregate_id)
        .bind(follower_ids)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| map_missing_aggregate(err, aggregate_id))?;

        Ok(result.rows_affected())
    }

    async fn upsert_notification(
        &self,
        aggregate_id: AggregateId,
        recipient_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notification_entries (id, aggregate_id, recipient_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (aggregate_id, recipient_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(aggregate_id)
        .bind(recipient_id)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| map_missing_aggregate(err, aggregate_id))?;

        Ok(result.rows_affected() == 1)
    }

    async fn feed_entries(
        &self,
        viewer_id: Uuid,
        before: Option<FeedCursor>,
        max: usize,
    ) -> Result<Vec<FeedEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT aggregate_id, created_at, is_new, source FROM (
                SELECT aggregate_id, created_at, is_new, 'feed' AS source
                FROM fanout_entries WHERE follower_id = $1 AND NOT hidden
                UNION ALL
                SELECT aggregate_id, created_at, is_new, 'notification' AS source
                FROM notification_entries WHERE recipient_id = $1
            ) entries
            WHERE $2::timestamptz IS NULL OR (created_at, aggregate_id) < ($2, $3::uuid)
            ORDER BY created_at DESC, aggregate_id DESC
            LIMIT $4
            "#,
        )
        .bind(viewer_id)
        .bind(before.map(|cursor| cursor.created_at))
        .bind(before.map(|cursor| cursor.aggregate_id))
        .bind(limit(max))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<FeedEntry, RepositoryError> {
                let source: String = row.try_get("source")?;
                Ok(FeedEntry {
                    aggregate_id: row.try_get("aggregate_id")?,
                    created_at: row.try_get("created_at")?,
                    is_new: row.try_get("is_new")?,
                    source: if source == "notification" {
                        FeedSource::Notification
                    } else {
                        FeedSource::Feed
                    },
                })
            })
            .collect()
    }

    async fn unread_notifications(&self, recipient_id: Uuid) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notification_entries WHERE recipient_id = $1 AND is_new",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_notifications_read(&self, recipient_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notification_entries SET is_new = FALSE WHERE recipient_id = $1 AND is_new",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_feed_read(&self, follower_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query("UPDATE fanout_entries SET is_new = FALSE WHERE follower_id = $1 AND is_new")
            .bind(follower_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn hide_entry(&self, follower_id: Uuid, aggregate_id: AggregateId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE fanout_entries SET hidden = TRUE WHERE follower_id = $1 AND aggregate_id = $2 AND NOT hidden",
        )
        .bind(follower_id)
        .bind(aggregate_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fanout_entries_for(&self, aggregate_id: AggregateId) -> Result<Vec<FanoutEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, aggregate_id, follower_id, created_at, is_new, hidden FROM fanout_entries WHERE aggregate_id = $1 ORDER BY follower_id",
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<FanoutEntry, RepositoryError> {
                Ok(FanoutEntry {
                    id: row.try_get("id")?,
                    aggregate_id: row.try_get("aggregate_id")?,
                    follower_id: row.try_get("follower_id")?,
                    created_at: row.try_get("created_at")?,
                    is_new: row.try_get("is_new")?,
                    hidden: row.try_get("hidden")?,
                })
            })
            .collect()
    }

    async fn notification_entries_for(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<NotificationEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, aggregate_id, recipient_id, created_at, is_new FROM notification_entries WHERE aggregate_id = $1 ORDER BY recipient_id",
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<NotificationEntry, RepositoryError> {
                Ok(NotificationEntry {
                    id: row.try_get("id")?,
                    aggregate_id: row.try_get("aggregate_id")?,
                    recipient_id: row.try_get("recipient_id")?,
                    created_at: row.try_get("created_at")?,
                    is_new: row.try_get("is_new")?,
                })
            })
            .collect()
    }
}

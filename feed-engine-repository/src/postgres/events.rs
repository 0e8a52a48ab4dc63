use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use feed_engine_shared::types::{Event, EventId, EventStatus, NewEvent};
use sqlx::{Postgres, Row, Transaction};

use super::PostgresFeedStore;
use super::rows::{EVENT_COLUMNS, event_from_row, limit};
use crate::errors::RepositoryError;
use crate::interfaces::{EventQueueRepository, EventTransition};

impl PostgresFeedStore {
    /// Appends an event inside the caller's transaction, so it only becomes
    /// visible to the poller once the domain write that produced it commits.
    pub async fn enqueue_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: &NewEvent,
    ) -> Result<EventId, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO feed_events (entity_type, entity_id, action, actor_id, extra, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(event.entity_type.as_str())
        .bind(event.entity_id)
        .bind(event.action.as_str())
        .bind(event.actor_id)
        .bind(&event.extra)
        .bind(event.occurred_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.try_get("id")?)
    }
}

#[async_trait]
impl EventQueueRepository for PostgresFeedStore {
    async fn enqueue(&self, event: &NewEvent) -> Result<EventId, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let id = Self::enqueue_in_tx(&mut tx, event).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn poll(
        &self,
        batch_size: usize,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, RepositoryError> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let query = format!(
            r#"
            UPDATE feed_events SET status = 'started', started_at = $1
            WHERE id IN (
                SELECT id FROM feed_events
                WHERE (status IN ('new', 'delayed') AND scheduled_at <= $1)
                   OR (status = 'started' AND started_at <= $2)
                ORDER BY id
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {EVENT_COLUMNS}
            "#
        );

        let rows = sqlx::query(&query)
            .bind(now)
            .bind(now - lease)
            .bind(limit(batch_size))
            .fetch_all(&self.pool)
            .await?;

        let mut events = rows.iter().map(event_from_row).collect::<Result<Vec<_>, _>>()?;
        events.sort_by_key(|event| event.id);
        Ok(events)
    }

    async fn transition(
        &self,
        event_id: EventId,
        transition: &EventTransition,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE feed_events SET
                status = $2,
                scheduled_at = COALESCE($3, scheduled_at),
                retry_count = retry_count + CASE WHEN $4 THEN 1 ELSE 0 END,
                last_error = COALESCE($5, last_error)
            WHERE id = $1 AND status = 'started'
            "#,
        )
        .bind(event_id)
        .bind(transition.status.as_str())
        .bind(transition.scheduled_at)
        .bind(transition.increment_retry)
        .bind(transition.error.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, RepositoryError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM feed_events WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn failed_events(&self, max: usize) -> Result<Vec<Event>, RepositoryError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM feed_events WHERE status = $1 ORDER BY id LIMIT $2");
        let rows = sqlx::query(&query)
            .bind(EventStatus::Error.as_str())
            .bind(limit(max))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn requeue(&self, event_id: EventId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE feed_events SET status = 'new', retry_count = 0, scheduled_at = $2, started_at = NULL
            WHERE id = $1 AND status = 'error'
            "#,
        )
        .bind(event_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_engine_shared::types::{EntityRef, EventId, Milestone, NewEvent, ThresholdMark, ThresholdSample};
use sqlx::Row;

use super::PostgresFeedStore;
use super::rows::limit;
use crate::errors::RepositoryError;
use crate::interfaces::ThresholdRepository;

#[async_trait]
impl ThresholdRepository for PostgresFeedStore {
    async fn record_sample(&self, sample: &ThresholdSample) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO threshold_samples (entity_type, entity_id, milestone, actor_id, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(sample.entity.entity_type.as_str())
        .bind(sample.entity.id)
        .bind(sample.milestone.as_str())
        .bind(sample.actor_id)
        .bind(sample.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn recent_samples(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
        max: usize,
    ) -> Result<Vec<DateTime<Utc>>, RepositoryError> {
        let timestamps = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT occurred_at FROM threshold_samples
            WHERE entity_type = $1 AND entity_id = $2 AND milestone = $3
            ORDER BY occurred_at DESC
            LIMIT $4
            "#,
        )
        .bind(entity.entity_type.as_str())
        .bind(entity.id)
        .bind(milestone.as_str())
        .bind(limit(max))
        .fetch_all(&self.pool)
        .await?;

        Ok(timestamps)
    }

    async fn prune_samples(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
        before: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM threshold_samples
            WHERE entity_type = $1 AND entity_id = $2 AND milestone = $3 AND occurred_at < $4
            "#,
        )
        .bind(entity.entity_type.as_str())
        .bind(entity.id)
        .bind(milestone.as_str())
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn clear_samples(&self, entity: &EntityRef, milestone: Milestone) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM threshold_samples WHERE entity_type = $1 AND entity_id = $2 AND milestone = $3",
        )
        .bind(entity.entity_type.as_str())
        .bind(entity.id)
        .bind(milestone.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn try_mark(
        &self,
        mark: &ThresholdMark,
        event: &NewEvent,
    ) -> Result<Option<EventId>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO threshold_marks (entity_type, entity_id, action, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (entity_type, entity_id, action) DO NOTHING
            "#,
        )
        .bind(mark.entity_type.as_str())
        .bind(mark.entity_id)
        .bind(mark.milestone.as_str())
        .bind(mark.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            tx.rollback().await?;
            return Ok(None);
        }

        let event_id = Self::enqueue_in_tx(&mut tx, event).await?;
        tx.commit().await?;
        Ok(Some(event_id))
    }

    async fn get_mark(
        &self,
        entity: &EntityRef,
        milestone: Milestone,
    ) -> Result<Option<ThresholdMark>, RepositoryError> {
        let row = sqlx::query(
            "SELECT created_at FROM threshold_marks WHERE entity_type = $1 AND entity_id = $2 AND action = $3",
        )
        .bind(entity.entity_type.as_str())
        .bind(entity.id)
        .bind(milestone.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<ThresholdMark, RepositoryError> {
            Ok(ThresholdMark::new(*entity, milestone, row.try_get("created_at")?))
        })
        .transpose()
    }
}

use async_trait::async_trait;
use feed_engine_shared::types::{
    Aggregate, AggregateId, EntityRef, EventId, ReactionCounts, ReferenceScope,
};
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::PostgresFeedStore;
use super::rows::{AGGREGATE_COLUMNS, aggregate_from_row, aggregates_from_rows, limit};
use crate::errors::RepositoryError;
use crate::interfaces::AggregateRepository;

const UNIQUE_VIOLATION: &str = "23505";

impl PostgresFeedStore {
    /// Replaces the reverse index rows of an aggregate within an active
    /// transaction.
    async fn write_references_tx(
        aggregate: &Aggregate,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM aggregate_references WHERE aggregate_id = $1")
            .bind(aggregate.id)
            .execute(&mut **tx)
            .await?;

        let references = aggregate.references();
        if references.is_empty() {
            return Ok(());
        }

        let mut query_builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO aggregate_references (aggregate_id, category, entity_type, entity_id, owner_id, action) ",
        );
        query_builder.push_values(&references, |mut b, (category, entity)| {
            b.push_bind(aggregate.id)
                .push_bind(category.as_str())
                .push_bind(entity.entity_type.as_str())
                .push_bind(entity.id)
                .push_bind(aggregate.owner_id)
                .push_bind(aggregate.action.as_str());
        });
        query_builder.push(" ON CONFLICT DO NOTHING");
        query_builder.build().execute(&mut **tx).await?;

        Ok(())
    }

    async fn record_contribution_tx(
        grouping_key: &str,
        event_id: EventId,
        aggregate_id: AggregateId,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO aggregate_contributions (grouping_key, event_id, aggregate_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(grouping_key)
        .bind(event_id)
        .bind(aggregate_id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Version-checked update of the mutable columns plus the reverse index.
    async fn update_aggregate_tx(
        aggregate: &Aggregate,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Aggregate, RepositoryError> {
        let query = format!(
            r#"
            UPDATE aggregates SET
                categories = $3,
                language = $4,
                anchor_type = $5,
                anchor_id = $6,
                updated_at = $7,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {AGGREGATE_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(aggregate.id)
            .bind(aggregate.version)
            .bind(serde_json::to_value(&aggregate.categories)?)
            .bind(aggregate.language.as_deref())
            .bind(aggregate.anchor.map(|anchor| anchor.entity_type.as_str()))
            .bind(aggregate.anchor.map(|anchor| anchor.id))
            .bind(aggregate.updated_at)
            .fetch_optional(&mut **tx)
            .await?;

        let Some(row) = row else {
            return Err(RepositoryError::conflict(format!(
                "aggregate {} moved past version {}",
                aggregate.id, aggregate.version
            )));
        };
        let stored = aggregate_from_row(&row)?;

        Self::write_references_tx(&stored, tx).await?;
        Ok(stored)
    }
}

fn map_unique_violation(err: sqlx::Error, aggregate: &Aggregate) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            RepositoryError::conflict(format!(
                "aggregate {} generation {} already exists",
                aggregate.grouping_key, aggregate.generation
            ))
        }
        _ => RepositoryError::DatabaseError(err),
    }
}

#[async_trait]
impl AggregateRepository for PostgresFeedStore {
    async fn latest_for_key(&self, grouping_key: &str) -> Result<Option<Aggregate>, RepositoryError> {
        let query = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM aggregates WHERE grouping_key = $1 ORDER BY generation DESC LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(grouping_key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(aggregate_from_row).transpose()
    }

    async fn get_aggregate(&self, id: AggregateId) -> Result<Option<Aggregate>, RepositoryError> {
        let query = format!("SELECT {AGGREGATE_COLUMNS} FROM aggregates WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(aggregate_from_row).transpose()
    }

    async fn get_aggregates(&self, ids: &[AggregateId]) -> Result<Vec<Aggregate>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!("SELECT {AGGREGATE_COLUMNS} FROM aggregates WHERE id = ANY($1)");
        let rows = sqlx::query(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        aggregates_from_rows(&rows)
    }

    async fn aggregate_for_event(
        &self,
        grouping_key: &str,
        event_id: EventId,
    ) -> Result<Option<Aggregate>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {AGGREGATE_COLUMNS} FROM aggregates
            WHERE id = (
                SELECT aggregate_id FROM aggregate_contributions
                WHERE grouping_key = $1 AND event_id = $2
            )
            "#
        );
        let row = sqlx::query(&query)
            .bind(grouping_key)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(aggregate_from_row).transpose()
    }

    async fn insert_aggregate(&self, aggregate: &Aggregate) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO aggregates (
                id, action, owner_id, grouping_key, generation, version, language, categories,
                reaction_counts, anchor_type, anchor_id, origin_event_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(aggregate.id)
        .bind(aggregate.action.as_str())
        .bind(aggregate.owner_id)
        .bind(&aggregate.grouping_key)
        .bind(aggregate.generation)
        .bind(aggregate.version)
        .bind(aggregate.language.as_deref())
        .bind(serde_json::to_value(&aggregate.categories)?)
        .bind(serde_json::to_value(&aggregate.reaction_counts)?)
        .bind(aggregate.anchor.map(|anchor| anchor.entity_type.as_str()))
        .bind(aggregate.anchor.map(|anchor| anchor.id))
        .bind(aggregate.origin_event_id)
        .bind(aggregate.created_at)
        .bind(aggregate.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| map_unique_violation(err, aggregate))?;

        Self::write_references_tx(aggregate, &mut tx).await?;
        Self::record_contribution_tx(
            &aggregate.grouping_key,
            aggregate.origin_event_id,
            aggregate.id,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_aggregate(&self, aggregate: &Aggregate) -> Result<Aggregate, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::update_aggregate_tx(aggregate, &mut tx).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn append_aggregate(
        &self,
        aggregate: &Aggregate,
        event_id: EventId,
    ) -> Result<Aggregate, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::update_aggregate_tx(aggregate, &mut tx).await?;
        Self::record_contribution_tx(&stored.grouping_key, event_id, stored.id, &mut tx).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn record_contribution(
        &self,
        grouping_key: &str,
        event_id: EventId,
        aggregate_id: AggregateId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO aggregate_contributions (grouping_key, event_id, aggregate_id)
            SELECT $1, $2, id FROM aggregates WHERE id = $3
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(grouping_key)
        .bind(event_id)
        .bind(aggregate_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_aggregate(&self, id: AggregateId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM aggregates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_aggregate_if(
        &self,
        id: AggregateId,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM aggregates WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(expected_version)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM aggregates WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            return Err(RepositoryError::conflict(format!(
                "aggregate {id} moved past version {expected_version}"
            )));
        }
        Ok(false)
    }

    async fn referencing_aggregates(
        &self,
        entity: &EntityRef,
        scope: &ReferenceScope,
        max: usize,
    ) -> Result<Vec<Aggregate>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {AGGREGATE_COLUMNS} FROM aggregates
            WHERE id IN (
                SELECT aggregate_id FROM aggregate_references
                WHERE entity_type = $1 AND entity_id = $2
                  AND ($3::uuid IS NULL OR owner_id = $3)
                  AND ($4::text IS NULL OR action = $4)
            )
            ORDER BY created_at, id
            LIMIT $5
            "#
        );
        let rows = sqlx::query(&query)
            .bind(entity.entity_type.as_str())
            .bind(entity.id)
            .bind(scope.owner_id)
            .bind(scope.action.map(|action| action.as_str()))
            .bind(limit(max))
            .fetch_all(&self.pool)
            .await?;

        aggregates_from_rows(&rows)
    }

    async fn anchored_aggregates(&self, anchor: &EntityRef) -> Result<Vec<Aggregate>, RepositoryError> {
        let query = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM aggregates WHERE anchor_type = $1 AND anchor_id = $2 ORDER BY created_at"
        );
        let rows = sqlx::query(&query)
            .bind(anchor.entity_type.as_str())
            .bind(anchor.id)
            .fetch_all(&self.pool)
            .await?;

        aggregates_from_rows(&rows)
    }

    async fn aggregates_owned_by(
        &self,
        owner_id: Uuid,
        max: usize,
    ) -> Result<Vec<Aggregate>, RepositoryError> {
        let query = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM aggregates WHERE owner_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .bind(limit(max))
            .fetch_all(&self.pool)
            .await?;

        aggregates_from_rows(&rows)
    }

    async fn set_language(&self, owner_id: Uuid, language: Option<&str>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE aggregates SET language = $2 WHERE owner_id = $1 AND language IS DISTINCT FROM $2",
        )
        .bind(owner_id)
        .bind(language)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_reaction_counts(
        &self,
        id: AggregateId,
        counts: &ReactionCounts,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE aggregates SET reaction_counts = $2 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(counts)?)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use feed_engine_shared::types::{AggregateId, ReactionCounts, ReactionKind, ReactionKindId, ReactionVote};
use sqlx::Row;
use uuid::Uuid;

use super::PostgresFeedStore;
use super::rows::map_missing_aggregate;
use crate::errors::RepositoryError;
use crate::interfaces::ReactionRepository;

#[async_trait]
impl ReactionRepository for PostgresFeedStore {
    async fn reaction_catalog(&self) -> Result<Vec<ReactionKind>, RepositoryError> {
        let rows = sqlx::query("SELECT id, label, is_positive, sort_order FROM reaction_kinds ORDER BY sort_order, id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<ReactionKind, RepositoryError> {
                Ok(ReactionKind {
                    id: row.try_get("id")?,
                    label: row.try_get("label")?,
                    is_positive: row.try_get("is_positive")?,
                    sort_order: row.try_get("sort_order")?,
                })
            })
            .collect()
    }

    async fn insert_vote(&self, vote: &ReactionVote) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO reaction_votes (id, aggregate_id, voter_id, reaction_kind_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id, voter_id, reaction_kind_id) DO NOTHING
            "#,
        )
        .bind(vote.id)
        .bind(vote.aggregate_id)
        .bind(vote.voter_id)
        .bind(vote.reaction_kind_id)
        .bind(vote.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| map_missing_aggregate(err, vote.aggregate_id))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_vote(
        &self,
        aggregate_id: AggregateId,
        voter_id: Uuid,
        reaction_kind_id: ReactionKindId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM reaction_votes WHERE aggregate_id = $1 AND voter_id = $2 AND reaction_kind_id = $3",
        )
        .bind(aggregate_id)
        .bind(voter_id)
        .bind(reaction_kind_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_votes(&self, aggregate_id: AggregateId) -> Result<ReactionCounts, RepositoryError> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(
            r#"
            SELECT reaction_kind_id, COUNT(*) FROM reaction_votes
            WHERE aggregate_id = $1
            GROUP BY reaction_kind_id
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn votes_by_voter(
        &self,
        voter_id: Uuid,
        aggregate_ids: &[AggregateId],
    ) -> Result<HashMap<AggregateId, Vec<ReactionKindId>>, RepositoryError> {
        if aggregate_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(Uuid, i32)> = sqlx::query_as(
            r#"
            SELECT aggregate_id, reaction_kind_id FROM reaction_votes
            WHERE voter_id = $1 AND aggregate_id = ANY($2)
            ORDER BY reaction_kind_id
            "#,
        )
        .bind(voter_id)
        .bind(aggregate_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut votes: HashMap<AggregateId, Vec<ReactionKindId>> = HashMap::new();
        for (aggregate_id, kind) in rows {
            votes.entry(aggregate_id).or_default().push(kind);
        }
        Ok(votes)
    }
}

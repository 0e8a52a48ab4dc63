//! Row decoding shared by the PostgreSQL repositories.
use std::collections::BTreeMap;

use feed_engine_shared::types::{
    Aggregate, Category, CategoryName, EntityRef, Event, ReactionCounts,
};
use sqlx::Row;
use sqlx::postgres::PgRow;

use crate::errors::RepositoryError;

pub(super) const EVENT_COLUMNS: &str = "id, entity_type, entity_id, action, actor_id, extra, \
     occurred_at, scheduled_at, status, retry_count, created_at, started_at, last_error";

pub(super) const AGGREGATE_COLUMNS: &str = "id, action, owner_id, grouping_key, generation, \
     version, language, categories, reaction_counts, anchor_type, anchor_id, origin_event_id, \
     created_at, updated_at";

pub(super) fn event_from_row(row: &PgRow) -> Result<Event, RepositoryError> {
    let entity_type: String = row.try_get("entity_type")?;
    let action: String = row.try_get("action")?;
    let status: String = row.try_get("status")?;

    Ok(Event {
        id: row.try_get("id")?,
        entity_type: entity_type.parse()?,
        entity_id: row.try_get("entity_id")?,
        action: action.parse()?,
        actor_id: row.try_get("actor_id")?,
        extra: row.try_get("extra")?,
        occurred_at: row.try_get("occurred_at")?,
        scheduled_at: row.try_get("scheduled_at")?,
        status: status.parse()?,
        retry_count: row.try_get("retry_count")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        last_error: row.try_get("last_error")?,
    })
}

pub(super) fn aggregate_from_row(row: &PgRow) -> Result<Aggregate, RepositoryError> {
    let action: String = row.try_get("action")?;
    let categories: serde_json::Value = row.try_get("categories")?;
    let categories: BTreeMap<CategoryName, Category> = serde_json::from_value(categories)?;
    let reaction_counts: serde_json::Value = row.try_get("reaction_counts")?;
    let reaction_counts: ReactionCounts = serde_json::from_value(reaction_counts)?;

    let anchor_type: Option<String> = row.try_get("anchor_type")?;
    let anchor_id: Option<uuid::Uuid> = row.try_get("anchor_id")?;
    let anchor = match (anchor_type, anchor_id) {
        (Some(entity_type), Some(id)) => Some(EntityRef::new(entity_type.parse()?, id)),
        _ => None,
    };

    Ok(Aggregate {
        id: row.try_get("id")?,
        action: action.parse()?,
        owner_id: row.try_get("owner_id")?,
        grouping_key: row.try_get("grouping_key")?,
        generation: row.try_get("generation")?,
        version: row.try_get("version")?,
        language: row.try_get("language")?,
        categories,
        reaction_counts,
        anchor,
        origin_event_id: row.try_get("origin_event_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn aggregates_from_rows(rows: &[PgRow]) -> Result<Vec<Aggregate>, RepositoryError> {
    rows.iter().map(aggregate_from_row).collect()
}

/// Postgres rejects a LIMIT that does not fit a BIGINT.
pub(super) fn limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Maps a write against a deleted aggregate to `NotFound`.
pub(super) fn map_missing_aggregate(err: sqlx::Error, aggregate_id: uuid::Uuid) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            RepositoryError::not_found(format!("aggregate {}", aggregate_id))
        }
        _ => RepositoryError::DatabaseError(err),
    }
}

//! PostgreSQL implementation of the feed engine repositories.
//!
//! ## Database Tables
//!
//! - `feed_events`: the event queue, claimed with `FOR UPDATE SKIP LOCKED`
//! - `aggregates` / `aggregate_references`: aggregates and their reverse index
//! - `fanout_entries` / `notification_entries`: per-viewer copies
//! - `threshold_marks` / `threshold_samples`: milestone bookkeeping
//! - `reaction_kinds` / `reaction_votes`: reaction catalog and votes
//!
//! Child rows reference `aggregates` with `ON DELETE CASCADE`, so deleting an
//! aggregate removes everything hanging off it in one statement.
mod aggregates;
mod events;
mod fanout;
mod reactions;
mod rows;
mod thresholds;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::errors::RepositoryError;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("src/postgres/migrations");

/// PostgreSQL-backed feed store implementing every repository trait.
#[derive(Clone)]
pub struct PostgresFeedStore {
    pool: sqlx::PgPool,
}

impl PostgresFeedStore {
    /// Wraps an existing pool. The schema is expected to be migrated.
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, RepositoryError> {
        Ok(Self { pool })
    }

    /// Opens a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

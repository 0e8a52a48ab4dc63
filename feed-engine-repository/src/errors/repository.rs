use feed_engine_shared::types::ParseEnumError;
use thiserror::Error;

/// Represents errors that can occur within the feed repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A uniqueness or version check failed because of a concurrent writer.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl RepositoryError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DatabaseError(err) => is_transient_sqlx(err),
            Self::Conflict(_) => true,
            Self::MigrationError(_)
            | Self::SerializationError(_)
            | Self::NotFound(_)
            | Self::InvalidValue(_) => false,
        }
    }
}

impl From<ParseEnumError> for RepositoryError {
    fn from(err: ParseEnumError) -> Self {
        Self::InvalidValue(err.to_string())
    }
}

// serialization_failure, deadlock_detected, admin/crash shutdown, cannot_connect_now
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "57P01", "57P02", "57P03"];

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&&*code)),
        _ => false,
    }
}

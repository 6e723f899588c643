//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for dagforge_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => dagforge_core::Error::NotFound(what),
            DbError::Duplicate(what) => dagforge_core::Error::Conflict(what),
            other => dagforge_core::Error::Storage(other.to_string()),
        }
    }
}

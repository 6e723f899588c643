//! Specification storage for dagforge.
//!
//! Provides the PostgreSQL [`SpecRepository`](dagforge_core::repository::SpecRepository)
//! used by the API server, and an in-memory one for tests and local runs.

pub mod error;
pub mod memory;
pub mod repo;

pub use error::{DbError, DbResult};
pub use memory::MemorySpecRepository;
pub use repo::*;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool keeping at least `min_connections`
/// open and at most `max_connections`.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections.min(max_connections))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

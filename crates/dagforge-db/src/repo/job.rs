//! Job rows. The full job declaration is stored as JSON.

use chrono::{DateTime, Utc};
use dagforge_core::job::JobSpec;
use sqlx::PgPool;
use sqlx::types::Json;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: uuid::Uuid,
    pub project_id: uuid::Uuid,
    pub name: String,
    pub spec: Json<JobSpec>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_by_project(&self, project_id: uuid::Uuid) -> DbResult<Vec<JobRow>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE project_id = $1 ORDER BY name",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, project_id: uuid::Uuid, name: &str) -> DbResult<JobRow> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE project_id = $1 AND name = $2",
        )
        .bind(project_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job {}", name)))?;
        Ok(row)
    }

    pub async fn upsert(&self, project_id: uuid::Uuid, job: &JobSpec) -> DbResult<JobRow> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (id, project_id, name, spec, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (project_id, name) DO UPDATE
                SET spec = EXCLUDED.spec, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(project_id)
        .bind(&job.name)
        .bind(Json(job))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete(&self, project_id: uuid::Uuid, name: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM jobs WHERE project_id = $1 AND name = $2")
            .bind(project_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("job {}", name)));
        }
        Ok(())
    }
}

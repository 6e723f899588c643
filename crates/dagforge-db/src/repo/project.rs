//! Project and project secret rows.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::BTreeMap;

use crate::{DbError, DbResult};

/// A stored project.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: uuid::Uuid,
    pub name: String,
    pub config: Json<BTreeMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sealed secret belonging to a project.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SecretRow {
    pub project_id: uuid::Uuid,
    pub name: String,
    pub sealed_value: String,
}

pub struct PgProjectRepo {
    pool: PgPool,
}

impl PgProjectRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a project, or replace the config of an existing one with the
    /// same name. The stored id is kept on update.
    pub async fn upsert(
        &self,
        id: uuid::Uuid,
        name: &str,
        config: &BTreeMap<String, String>,
    ) -> DbResult<ProjectRow> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects (id, name, config, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (name) DO UPDATE
                SET config = EXCLUDED.config, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(Json(config))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_name(&self, name: &str) -> DbResult<ProjectRow> {
        let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("project {}", name)))?;
        Ok(row)
    }

    pub async fn list(&self) -> DbResult<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn list_secrets(&self, project_id: uuid::Uuid) -> DbResult<Vec<SecretRow>> {
        let rows = sqlx::query_as::<_, SecretRow>(
            "SELECT project_id, name, sealed_value FROM project_secrets WHERE project_id = $1 ORDER BY name",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_secret(&self, project_id: uuid::Uuid, name: &str) -> DbResult<SecretRow> {
        let row = sqlx::query_as::<_, SecretRow>(
            "SELECT project_id, name, sealed_value FROM project_secrets WHERE project_id = $1 AND name = $2",
        )
        .bind(project_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("secret {}", name)))?;
        Ok(row)
    }

    pub async fn upsert_secret(
        &self,
        project_id: uuid::Uuid,
        name: &str,
        sealed_value: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO project_secrets (project_id, name, sealed_value, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (project_id, name) DO UPDATE
                SET sealed_value = EXCLUDED.sealed_value, updated_at = NOW()
            "#,
        )
        .bind(project_id)
        .bind(name)
        .bind(sealed_value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

//! The PostgreSQL specification repository.

use async_trait::async_trait;
use dagforge_core::job::JobSpec;
use dagforge_core::project::ProjectSpec;
use dagforge_core::repository::SpecRepository;
use dagforge_core::secret::{ApplicationKey, SecretValue};
use dagforge_core::{Error, RecordId, Result};
use sqlx::PgPool;
use std::collections::BTreeMap;

use super::{PgJobRepo, PgProjectRepo, ProjectRow};

/// [`SpecRepository`] backed by PostgreSQL. Secrets are sealed with the
/// application key on the way in and opened on the way out.
pub struct PgSpecRepository {
    projects: PgProjectRepo,
    jobs: PgJobRepo,
    key: ApplicationKey,
}

impl PgSpecRepository {
    pub fn new(pool: PgPool, key: ApplicationKey) -> Self {
        Self {
            projects: PgProjectRepo::new(pool.clone()),
            jobs: PgJobRepo::new(pool),
            key,
        }
    }

    async fn load_project(&self, row: ProjectRow) -> Result<ProjectSpec> {
        let mut secrets = BTreeMap::new();
        for secret in self.projects.list_secrets(row.id).await? {
            let value = self
                .key
                .open(&row.name, &secret.name, &secret.sealed_value)
                .map_err(|e| Error::Storage(e.to_string()))?;
            secrets.insert(secret.name, value);
        }
        Ok(ProjectSpec {
            id: RecordId::from(row.id),
            name: row.name,
            config: row.config.0,
            secrets,
        })
    }
}

#[async_trait]
impl SpecRepository for PgSpecRepository {
    async fn list_projects(&self) -> Result<Vec<ProjectSpec>> {
        let mut projects = Vec::new();
        for row in self.projects.list().await? {
            projects.push(self.load_project(row).await?);
        }
        Ok(projects)
    }

    async fn get_project(&self, name: &str) -> Result<ProjectSpec> {
        let row = self.projects.get_by_name(name).await?;
        self.load_project(row).await
    }

    async fn save_project(&self, project: &ProjectSpec) -> Result<()> {
        self.projects
            .upsert(*project.id.as_uuid(), &project.name, &project.config)
            .await?;
        Ok(())
    }

    async fn get_secret(&self, project: &str, name: &str) -> Result<SecretValue> {
        let row = self.projects.get_by_name(project).await?;
        let secret = self.projects.get_secret(row.id, name).await?;
        self.key
            .open(project, name, &secret.sealed_value)
            .map_err(|e| Error::Storage(e.to_string()))
    }

    async fn save_secret(&self, project: &str, name: &str, value: &SecretValue) -> Result<()> {
        let row = self.projects.get_by_name(project).await?;
        let sealed = self.key.seal(project, name, value)?;
        self.projects.upsert_secret(row.id, name, &sealed).await?;
        Ok(())
    }

    async fn list_jobs(&self, project: &str) -> Result<Vec<JobSpec>> {
        let row = self.projects.get_by_name(project).await?;
        let jobs = self.jobs.list_by_project(row.id).await?;
        Ok(jobs.into_iter().map(|j| j.spec.0).collect())
    }

    async fn get_job(&self, project: &str, name: &str) -> Result<JobSpec> {
        let row = self.projects.get_by_name(project).await?;
        let job = self.jobs.get(row.id, name).await?;
        Ok(job.spec.0)
    }

    async fn save_job(&self, project: &str, job: &JobSpec) -> Result<()> {
        let row = self.projects.get_by_name(project).await?;
        self.jobs.upsert(row.id, job).await?;
        Ok(())
    }

    async fn delete_job(&self, project: &str, name: &str) -> Result<()> {
        let row = self.projects.get_by_name(project).await?;
        self.jobs.delete(row.id, name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef";

    /// Needs a scratch database: `DATABASE_URL=postgres://... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_secrets_round_trip_sealed() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = create_pool(&url, 2, 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = PgSpecRepository::new(pool.clone(), ApplicationKey::new(TEST_KEY).unwrap());

        let name = format!("it-{}", uuid::Uuid::now_v7().simple());
        repo.save_project(&ProjectSpec::new(&name).with_config("storage-path", "mem://it"))
            .await
            .unwrap();
        repo.save_secret(&name, "STORAGE_SECRET", &SecretValue::from("token"))
            .await
            .unwrap();

        let project = repo.get_project(&name).await.unwrap();
        assert_eq!(project.storage_path(), Some("mem://it"));
        assert_eq!(
            project.secret("STORAGE_SECRET").and_then(|s| s.as_str()),
            Some("token")
        );

        let other = PgSpecRepository::new(
            pool,
            ApplicationKey::new("fedcba9876543210fedcba9876543210").unwrap(),
        );
        assert!(other.get_project(&name).await.is_err());
    }
}

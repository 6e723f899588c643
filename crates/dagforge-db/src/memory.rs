//! In-memory specification repository.

use async_trait::async_trait;
use dagforge_core::job::JobSpec;
use dagforge_core::project::ProjectSpec;
use dagforge_core::repository::SpecRepository;
use dagforge_core::secret::SecretValue;
use dagforge_core::{Error, Result};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    projects: BTreeMap<String, ProjectSpec>,
    jobs: BTreeMap<String, BTreeMap<String, JobSpec>>,
}

/// [`SpecRepository`] kept in process memory. Used by tests and by the
/// CLI's offline commands.
#[derive(Debug, Default)]
pub struct MemorySpecRepository {
    inner: RwLock<Inner>,
}

impl MemorySpecRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn project_not_found(name: &str) -> Error {
    Error::NotFound(format!("project {}", name))
}

#[async_trait]
impl SpecRepository for MemorySpecRepository {
    async fn list_projects(&self) -> Result<Vec<ProjectSpec>> {
        Ok(self.inner.read().await.projects.values().cloned().collect())
    }

    async fn get_project(&self, name: &str) -> Result<ProjectSpec> {
        self.inner
            .read()
            .await
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| project_not_found(name))
    }

    async fn save_project(&self, project: &ProjectSpec) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.projects.get_mut(&project.name) {
            Some(existing) => existing.config = project.config.clone(),
            None => {
                let mut stored = project.clone();
                stored.secrets.clear();
                inner.projects.insert(project.name.clone(), stored);
                inner.jobs.entry(project.name.clone()).or_default();
            }
        }
        Ok(())
    }

    async fn get_secret(&self, project: &str, name: &str) -> Result<SecretValue> {
        let inner = self.inner.read().await;
        let spec = inner
            .projects
            .get(project)
            .ok_or_else(|| project_not_found(project))?;
        spec.secret(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("secret {}", name)))
    }

    async fn save_secret(&self, project: &str, name: &str, value: &SecretValue) -> Result<()> {
        let mut inner = self.inner.write().await;
        let spec = inner
            .projects
            .get_mut(project)
            .ok_or_else(|| project_not_found(project))?;
        spec.secrets.insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn list_jobs(&self, project: &str) -> Result<Vec<JobSpec>> {
        let inner = self.inner.read().await;
        let jobs = inner
            .jobs
            .get(project)
            .ok_or_else(|| project_not_found(project))?;
        Ok(jobs.values().cloned().collect())
    }

    async fn get_job(&self, project: &str, name: &str) -> Result<JobSpec> {
        let inner = self.inner.read().await;
        inner
            .jobs
            .get(project)
            .ok_or_else(|| project_not_found(project))?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {}", name)))
    }

    async fn save_job(&self, project: &str, job: &JobSpec) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .jobs
            .get_mut(project)
            .ok_or_else(|| project_not_found(project))?
            .insert(job.name.clone(), job.clone());
        Ok(())
    }

    async fn delete_job(&self, project: &str, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .jobs
            .get_mut(project)
            .ok_or_else(|| project_not_found(project))?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("job {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dagforge_core::job::{JobBehavior, JobSchedule, JobTask, Window};

    fn make_job(name: &str) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            owner: "data@example.com".to_string(),
            description: String::new(),
            labels: BTreeMap::new(),
            schedule: JobSchedule {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: None,
                interval: "@daily".to_string(),
            },
            behavior: JobBehavior::default(),
            window: Window::default(),
            task: JobTask {
                unit: "shell".to_string(),
                config: BTreeMap::new(),
            },
            hooks: vec![],
            dependencies: vec![],
            assets: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_projects_sorted_by_name() {
        let repo = MemorySpecRepository::new();
        repo.save_project(&ProjectSpec::new("zeta")).await.unwrap();
        repo.save_project(&ProjectSpec::new("acme")).await.unwrap();

        let names: Vec<_> = repo
            .list_projects()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["acme", "zeta"]);
    }

    #[tokio::test]
    async fn test_save_project_keeps_secrets() {
        let repo = MemorySpecRepository::new();
        repo.save_project(&ProjectSpec::new("acme")).await.unwrap();
        repo.save_secret("acme", "STORAGE_SECRET", &SecretValue::from("t"))
            .await
            .unwrap();

        let updated = ProjectSpec::new("acme").with_config("storage-path", "mem://acme");
        repo.save_project(&updated).await.unwrap();

        let project = repo.get_project("acme").await.unwrap();
        assert_eq!(project.storage_path(), Some("mem://acme"));
        assert_eq!(
            project.secret("STORAGE_SECRET").and_then(|s| s.as_str()),
            Some("t")
        );
    }

    #[tokio::test]
    async fn test_jobs_require_project() {
        let repo = MemorySpecRepository::new();
        let err = repo.save_job("ghost", &make_job("a")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let repo = MemorySpecRepository::new();
        repo.save_project(&ProjectSpec::new("acme")).await.unwrap();
        repo.save_job("acme", &make_job("b")).await.unwrap();
        repo.save_job("acme", &make_job("a")).await.unwrap();

        let jobs = repo.list_jobs("acme").await.unwrap();
        assert_eq!(jobs.iter().map(|j| j.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        repo.delete_job("acme", "a").await.unwrap();
        assert!(matches!(
            repo.get_job("acme", "a").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            repo.delete_job("acme", "a").await,
            Err(Error::NotFound(_))
        ));
    }
}

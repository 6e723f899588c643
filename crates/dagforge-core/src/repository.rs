//! The specification repository capability.

use async_trait::async_trait;

use crate::Result;
use crate::job::JobSpec;
use crate::project::ProjectSpec;
use crate::secret::SecretValue;

/// Durable store of project and job declarations. Implementations are
/// shared with other writers; callers must expect records to change or
/// disappear between calls.
#[async_trait]
pub trait SpecRepository: Send + Sync {
    /// All projects, sorted by name, with their secrets attached.
    async fn list_projects(&self) -> Result<Vec<ProjectSpec>>;

    /// A project with its secrets, or `Error::NotFound`.
    async fn get_project(&self, name: &str) -> Result<ProjectSpec>;

    /// Create or update a project's config. Secrets are untouched.
    async fn save_project(&self, project: &ProjectSpec) -> Result<()>;

    async fn get_secret(&self, project: &str, name: &str) -> Result<SecretValue>;

    async fn save_secret(&self, project: &str, name: &str, value: &SecretValue) -> Result<()>;

    /// Jobs of a project, sorted by name. Unknown projects yield `Error::NotFound`.
    async fn list_jobs(&self, project: &str) -> Result<Vec<JobSpec>>;

    async fn get_job(&self, project: &str, name: &str) -> Result<JobSpec>;

    /// Create or replace a job.
    async fn save_job(&self, project: &str, job: &JobSpec) -> Result<()>;

    async fn delete_job(&self, project: &str, name: &str) -> Result<()>;
}

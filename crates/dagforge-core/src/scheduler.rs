//! The execution scheduler capability the control plane targets.

use async_trait::async_trait;

use crate::Result;
use crate::artifact::ArtifactLayout;
use crate::project::ProjectSpec;

/// A scheduler backend that consumes compiled job definitions from object
/// storage. The control plane never runs jobs itself.
#[async_trait]
pub trait SchedulerUnit: Send + Sync {
    fn name(&self) -> &'static str;

    /// Directory, relative to the project's storage root, holding job files.
    fn jobs_dir(&self) -> &str;

    /// File extension of job files, including the dot.
    fn jobs_extension(&self) -> &str;

    /// Resource path of the job template.
    fn template_path(&self) -> &str;

    /// Prepare the scheduler to accept this project's artifacts. Must be
    /// idempotent; callers bound it with a deadline.
    async fn bootstrap(&self, project: &ProjectSpec) -> Result<()>;

    fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(self.jobs_dir(), self.jobs_extension())
    }
}

//! Scheduler bootstrap driver.

use dagforge_core::deadline::CallContext;
use dagforge_core::project::ProjectSpec;
use dagforge_core::repository::SpecRepository;
use dagforge_core::scheduler::SchedulerUnit;
use dagforge_core::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::locks::ProjectLocks;

/// Default bound on one project's bootstrap.
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of bootstrapping one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapOutcome {
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BootstrapOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Prepares the scheduler for each project. Failures are per project and
/// never stop the others.
pub struct Bootstrapper {
    repo: Arc<dyn SpecRepository>,
    scheduler: Arc<dyn SchedulerUnit>,
    locks: ProjectLocks,
    timeout: Duration,
}

impl Bootstrapper {
    pub fn new(
        repo: Arc<dyn SpecRepository>,
        scheduler: Arc<dyn SchedulerUnit>,
        locks: ProjectLocks,
    ) -> Self {
        Self {
            repo,
            scheduler,
            locks,
            timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bootstrap every registered project concurrently.
    pub async fn bootstrap_all(&self, ctx: &CallContext) -> Result<Vec<BootstrapOutcome>> {
        let projects = ctx.run("list projects", self.repo.list_projects()).await?;
        info!(count = projects.len(), scheduler = self.scheduler.name(), "bootstrapping projects");

        let outcomes = futures::future::join_all(projects.iter().map(|project| async move {
            let result = self.run(ctx, project).await;
            BootstrapOutcome {
                project: project.name.clone(),
                error: result.err().map(|e| e.to_string()),
            }
        }))
        .await;
        Ok(outcomes)
    }

    /// Retry bootstrap for a single project.
    pub async fn bootstrap_project(&self, ctx: &CallContext, name: &str) -> Result<()> {
        let project = ctx.run("get project", self.repo.get_project(name)).await?;
        self.run(ctx, &project).await
    }

    async fn run(&self, ctx: &CallContext, project: &ProjectSpec) -> Result<()> {
        // The wait for a running deploy pass counts against the bound.
        let bounded = CallContext::new(ctx.cancel.child_token(), self.timeout);
        let attempt = async {
            let _guard = self.locks.lock(&project.name).await;
            self.scheduler.bootstrap(project).await
        };

        match bounded.run("bootstrap", attempt).await {
            Ok(()) => {
                info!(project = %project.name, "project bootstrapped");
                Ok(())
            }
            Err(e) => {
                error!(project = %project.name, error = %e, "project bootstrap failed");
                Err(match e {
                    Error::Bootstrap { .. } | Error::Cancelled => e,
                    other => Error::Bootstrap {
                        project: project.name.clone(),
                        message: other.to_string(),
                    },
                })
            }
        }
    }
}

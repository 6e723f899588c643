//! Workers that drain the deploy queue.

use async_trait::async_trait;
use dagforge_core::deadline::{CallContext, DEFAULT_CALL_TIMEOUT};
use dagforge_core::{Error, Result};
use dagforge_deployer::SyncReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::queue::{DeployClaim, DeployQueue};
use crate::service::JobService;

pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Runs one deploy pass for a project.
#[async_trait]
pub trait ProjectDeployer: Send + Sync {
    async fn deploy(&self, ctx: &CallContext, project: &str) -> Result<SyncReport>;
}

#[async_trait]
impl ProjectDeployer for JobService {
    async fn deploy(&self, ctx: &CallContext, project: &str) -> Result<SyncReport> {
        self.deploy_project(ctx, project).await
    }
}

/// A worker that runs one deploy pass at a time.
pub struct DeployWorker {
    id: String,
    queue: Arc<DeployQueue>,
    deployer: Arc<dyn ProjectDeployer>,
    call_timeout: Duration,
}

impl DeployWorker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<DeployQueue>,
        deployer: Arc<dyn ProjectDeployer>,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            deployer,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Run the worker loop until `cancel` fires or the queue closes.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker_id = %self.id, "Starting deploy worker");

        loop {
            let claim = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.queue.next() => match next {
                    Some(claim) => claim,
                    None => break,
                },
            };
            info!(
                worker_id = %self.id,
                project = %claim.project,
                waiters = claim.waiters(),
                "Claimed deploy request"
            );

            let result = self.execute(&claim, &cancel).await;
            match &result {
                Ok(report) => info!(
                    worker_id = %self.id,
                    project = %claim.project,
                    written = report.written.len(),
                    deleted = report.deleted.len(),
                    "Deploy finished"
                ),
                Err(e) => warn!(worker_id = %self.id, project = %claim.project, error = %e, "Deploy failed"),
            }
            self.queue.complete(claim, result);
        }

        info!(worker_id = %self.id, "Deploy worker stopped");
    }

    /// Run one pass on its own task so a panic cannot take the worker down,
    /// cancelling it once the claim's deadline passes.
    async fn execute(&self, claim: &DeployClaim, cancel: &CancellationToken) -> Result<SyncReport> {
        let ctx = CallContext::new(cancel.child_token(), self.call_timeout);
        let deployer = self.deployer.clone();
        let project = claim.project.clone();
        let pass_ctx = ctx.clone();
        let mut handle =
            tokio::spawn(async move { deployer.deploy(&pass_ctx, &project).await });

        let joined = match claim.deadline {
            None => (&mut handle).await,
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    ctx.cancel.cancel();
                    if let Err(e) = handle.await {
                        self.report_join_error(&claim.project, &e);
                    }
                    return Err(Error::Timeout(format!(
                        "deploy of '{}' missed its deadline",
                        claim.project
                    )));
                }
            },
        };

        joined.unwrap_or_else(|e| {
            self.report_join_error(&claim.project, &e);
            if e.is_panic() {
                Err(Error::Internal(format!("deploy of '{}' panicked", claim.project)))
            } else {
                Err(Error::Cancelled)
            }
        })
    }

    fn report_join_error(&self, project: &str, e: &JoinError) {
        if e.is_panic() {
            error!(worker_id = %self.id, project = %project, "deploy pass panicked");
        }
    }
}

/// A running set of deploy workers sharing one queue.
pub struct WorkerPool {
    queue: Arc<DeployQueue>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. They stop when `cancel` fires.
    pub fn spawn(
        count: usize,
        queue: Arc<DeployQueue>,
        deployer: Arc<dyn ProjectDeployer>,
        cancel: CancellationToken,
    ) -> Self {
        let handles = (0..count.max(1))
            .map(|i| {
                let worker = DeployWorker::new(format!("deploy-{}", i), queue.clone(), deployer.clone());
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(cancel).await })
            })
            .collect();
        Self {
            queue,
            cancel,
            handles,
        }
    }

    pub fn queue(&self) -> &Arc<DeployQueue> {
        &self.queue
    }

    /// Stop every worker, wait for in-flight passes, and fail what is left.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "deploy worker panicked");
            }
        }
        self.queue.close().await;
    }
}

//! Application state.

use dagforge_core::deadline::{CallContext, DEFAULT_CALL_TIMEOUT};
use dagforge_deployer::Bootstrapper;
use dagforge_scheduler::{DeployQueue, JobService};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long a deploy request may wait, queueing included, before the
/// caller gets a timeout and the pass is cancelled.
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
    pub bootstrapper: Arc<Bootstrapper>,
    pub deploys: Arc<DeployQueue>,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
    pub call_timeout: Duration,
    pub deploy_timeout: Duration,
}

impl AppState {
    pub fn new(
        service: Arc<JobService>,
        bootstrapper: Arc<Bootstrapper>,
        deploys: Arc<DeployQueue>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            bootstrapper,
            deploys,
            shutdown,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
        }
    }

    pub fn with_deploy_timeout(mut self, timeout: Duration) -> Self {
        self.deploy_timeout = timeout;
        self
    }

    /// Deadline for a deploy requested now.
    pub fn deploy_deadline(&self) -> Instant {
        Instant::now() + self.deploy_timeout
    }

    /// Context for one request's external calls.
    pub fn call_context(&self) -> CallContext {
        CallContext::new(self.shutdown.child_token(), self.call_timeout)
    }
}

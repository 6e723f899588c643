//! In-process queue of deploy requests.
//!
//! Each request names a project. Requests for a project that is queued but
//! not yet claimed join that pending pass and receive its report. Once a
//! worker claims a pass, later requests start a follow-up pass, so every
//! caller gets a report that reflects the state at or after its request.

use dagforge_core::{Error, Result};
use dagforge_deployer::SyncReport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

/// Default number of distinct projects waiting for a worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Outcome delivered to every waiter of one pass.
pub type DeployResult = std::result::Result<SyncReport, Arc<Error>>;

type Reply = oneshot::Sender<DeployResult>;

#[derive(Default)]
struct PendingPass {
    waiters: Vec<Reply>,
    deadline: Option<Instant>,
}

/// A pass taken off the queue by a worker. Dropping it without calling
/// [`DeployQueue::complete`] fails its waiters with `Cancelled`.
pub struct DeployClaim {
    pub project: String,
    /// Latest deadline among the requests that joined this pass; `None` if
    /// any of them had no deadline.
    pub deadline: Option<Instant>,
    waiters: Vec<Reply>,
}

impl DeployClaim {
    pub fn waiters(&self) -> usize {
        self.waiters.len()
    }
}

pub struct DeployQueue {
    tx: mpsc::Sender<String>,
    rx: AsyncMutex<mpsc::Receiver<String>>,
    unclaimed: Mutex<HashMap<String, PendingPass>>,
}

impl DeployQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: AsyncMutex::new(rx),
            unclaimed: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a deploy of `project` and return the receiver of its outcome.
    pub async fn enqueue(
        &self,
        project: &str,
        deadline: Option<Instant>,
    ) -> Result<oneshot::Receiver<DeployResult>> {
        let (reply, receiver) = oneshot::channel();
        {
            let mut unclaimed = self.unclaimed();
            if let Some(pass) = unclaimed.get_mut(project) {
                pass.waiters.push(reply);
                pass.deadline = match (pass.deadline, deadline) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                };
                debug!(project = %project, waiters = pass.waiters.len(), "deploy request coalesced");
                return Ok(receiver);
            }
            unclaimed.insert(
                project.to_string(),
                PendingPass {
                    waiters: vec![reply],
                    deadline,
                },
            );
        }

        if self.tx.send(project.to_string()).await.is_err() {
            self.unclaimed().remove(project);
            return Err(Error::Cancelled);
        }
        Ok(receiver)
    }

    /// Queue a deploy of `project` and wait for its outcome, giving up at
    /// `deadline` if one is set.
    pub async fn request(&self, project: &str, deadline: Option<Instant>) -> DeployResult {
        let receiver = self.enqueue(project, deadline).await.map_err(Arc::new)?;
        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, receiver).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(Arc::new(Error::Timeout(format!(
                        "deploy of '{}' missed its deadline",
                        project
                    ))));
                }
            },
            None => receiver.await,
        };
        outcome.unwrap_or_else(|_| Err(Arc::new(Error::Cancelled)))
    }

    /// Claim the next pass, or `None` once the queue is closed and empty.
    pub async fn next(&self) -> Option<DeployClaim> {
        let mut rx = self.rx.lock().await;
        loop {
            let project = rx.recv().await?;
            if let Some(pass) = self.unclaimed().remove(&project) {
                return Some(DeployClaim {
                    project,
                    deadline: pass.deadline,
                    waiters: pass.waiters,
                });
            }
        }
    }

    /// Deliver the outcome of a claimed pass to everyone who joined it.
    pub fn complete(&self, claim: DeployClaim, result: Result<SyncReport>) {
        let shared: DeployResult = result.map_err(Arc::new);
        for waiter in claim.waiters {
            // The requester may have gone away.
            let _ = waiter.send(shared.clone());
        }
    }

    /// Stop accepting requests and fail everything not yet claimed.
    pub async fn close(&self) {
        let mut rx = self.rx.lock().await;
        rx.close();
        while let Some(project) = rx.recv().await {
            let pass = self.unclaimed().remove(&project).unwrap_or_default();
            for waiter in pass.waiters {
                let _ = waiter.send(Err(Arc::new(Error::Cancelled)));
            }
        }
    }

    /// Number of projects queued and not yet claimed by a worker.
    pub fn pending(&self) -> usize {
        self.unclaimed().len()
    }

    fn unclaimed(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingPass>> {
        self.unclaimed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DeployQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

//! Per-project mutual exclusion for deploy passes and bootstrap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per project name. Different projects never contend.
#[derive(Debug, Default, Clone)]
pub struct ProjectLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `project`. Released on drop.
    pub async fn lock(&self, project: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(project.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_project_serialized() {
        let locks = ProjectLocks::new();
        let guard = locks.lock("acme").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock("acme").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_projects_independent() {
        let locks = ProjectLocks::new();
        let _a = locks.lock("acme").await;
        tokio::time::timeout(Duration::from_millis(100), locks.lock("finance"))
            .await
            .unwrap();
    }
}

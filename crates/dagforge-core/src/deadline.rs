//! Deadlines and cancellation for calls that leave the process.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Default bound on a single repository or object-store call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Cancellation signal plus per-call timeout, passed down every external path.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

impl CallContext {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Child context cancelled with this one, or on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            timeout: self.timeout,
        }
    }

    /// Run `fut`, failing with `Cancelled` or `Timeout` if either fires first.
    pub async fn run<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            res = tokio::time::timeout(self.timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout(format!("{} exceeded {:?}", what, self.timeout))),
            },
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(CancellationToken::new(), DEFAULT_CALL_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let ctx = CallContext::default();
        let value = ctx.run("noop", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = CallContext::new(CancellationToken::new(), Duration::from_millis(10));
        let result: Result<()> = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let ctx = CallContext::default();
        let child = ctx.child();
        ctx.cancel.cancel();
        let result: Result<()> = child.run("any", async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

//! Best-effort mirroring of in-memory mutations into the Persistence Gateway.
//!
//! The in-memory state is mutated first; the gateway call follows and its
//! failure is logged and downgraded to [`CoreError::PersistenceDegraded`],
//! which callers inspect or discard. Nothing here ever fails the operation
//! that triggered the write.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::repository::GatewayResult;
use crate::{CoreError, CoreResult};

static DEGRADED_EVENTS: AtomicU64 = AtomicU64::new(0);

/// Number of gateway calls that failed since process start.
pub fn degraded_events() -> u64 {
    DEGRADED_EVENTS.load(Ordering::Relaxed)
}

/// Await a gateway call, logging and downgrading its failure.
pub async fn best_effort<T, F>(operation: &str, call: F) -> CoreResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match call.await {
        Ok(value) => {
            debug!(operation, "persisted");
            Ok(value)
        }
        Err(e) => {
            DEGRADED_EVENTS.fetch_add(1, Ordering::Relaxed);
            warn!(operation, error = %e, "persistence degraded, continuing on in-memory state");
            Err(CoreError::PersistenceDegraded(format!("{}: {}", operation, e)))
        }
    }
}

/// Fire-and-forget variant: the caller's success path never waits on it.
/// Outside a tokio runtime the write is skipped and counted as degraded.
pub fn spawn_best_effort<F>(operation: &'static str, call: F)
where
    F: Future<Output = GatewayResult<()>> + Send + 'static,
{
    spawn_best_effort_after(None, operation, call);
}

/// Fire-and-forget write that starts only once `after` has finished, so
/// writes chained through the returned handle land in issue order.
pub fn spawn_best_effort_after<F>(
    after: Option<JoinHandle<()>>,
    operation: &'static str,
    call: F,
) -> Option<JoinHandle<()>>
where
    F: Future<Output = GatewayResult<()>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(async move {
            if let Some(previous) = after {
                let _ = previous.await;
            }
            let _ = best_effort(operation, call).await;
        })),
        Err(_) => {
            DEGRADED_EVENTS.fetch_add(1, Ordering::Relaxed);
            warn!(operation, "no async runtime available, write skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_is_downgraded() {
        let before = degraded_events();
        let failing = async { GatewayResult::<u64>::Err("connection refused".into()) };
        let result = best_effort("test.write", failing).await;

        assert!(matches!(result, Err(CoreError::PersistenceDegraded(_))));
        assert!(degraded_events() > before);
    }

    #[tokio::test]
    async fn test_chained_writes_run_in_order() {
        let log = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let slow = log.clone();
        let first = spawn_best_effort_after(None, "test.first", async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            slow.lock().await.push("first");
            GatewayResult::<()>::Ok(())
        });
        let fast = log.clone();
        let second = spawn_best_effort_after(first, "test.second", async move {
            fast.lock().await.push("second");
            GatewayResult::<()>::Ok(())
        });

        second.unwrap().await.unwrap();
        assert_eq!(*log.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let result = best_effort("test.write", async { GatewayResult::<u64>::Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

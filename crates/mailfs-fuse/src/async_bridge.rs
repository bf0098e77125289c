//! Bridge between synchronous callers and the blocking mail store.
//!
//! Every remote call is bounded by a timeout. FUSE callback threads use
//! [`execute_blocking`], which runs the store call on the runtime's blocking
//! pool and waits on a oneshot channel. The reconciliation task uses the
//! async [`blocking_with_timeout`].
//!
//! A timed-out store call cannot be interrupted; its blocking thread runs to
//! completion and the result is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Statistics for async bridge operations (for observability).
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub operations_started: AtomicU64,
    pub operations_completed: AtomicU64,
    pub operations_timed_out: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_start(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_complete(&self) {
        self.operations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.operations_timed_out.fetch_add(1, Ordering::Relaxed);
    }
}

/// Error from async bridge operations
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation was cancelled")]
    Cancelled,
}

impl BridgeError {
    pub fn to_errno(&self) -> i32 {
        match self {
            BridgeError::Timeout(_) => libc::ETIMEDOUT,
            BridgeError::Cancelled => libc::ECANCELED,
        }
    }
}

/// Execute an async future from sync context with timeout.
///
/// Spawns the future on the tokio runtime and blocks the calling thread
/// on a oneshot channel until completion or timeout. On timeout the
/// spawned task is aborted.
///
/// Must not be called from inside the runtime's own worker threads.
pub fn execute<F, T>(
    handle: &Handle,
    timeout: Duration,
    stats: Option<&BridgeStats>,
    future: F,
) -> Result<T, BridgeError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    if let Some(s) = stats {
        s.record_start();
    }

    let (tx, rx) = oneshot::channel();

    let task_handle = handle.spawn(async move {
        let result = tokio::time::timeout(timeout, future).await;
        // Receiver may already be gone
        let _ = tx.send(result);
    });

    match rx.blocking_recv() {
        Ok(Ok(value)) => {
            if let Some(s) = stats {
                s.record_complete();
            }
            Ok(value)
        }
        Ok(Err(_elapsed)) => {
            task_handle.abort();
            if let Some(s) = stats {
                s.record_timeout();
            }
            Err(BridgeError::Timeout(timeout))
        }
        Err(_recv_error) => {
            task_handle.abort();
            Err(BridgeError::Cancelled)
        }
    }
}

/// Run a blocking closure on the runtime's blocking pool, waiting at most
/// `timeout` from a synchronous caller.
pub fn execute_blocking<F, T>(
    handle: &Handle,
    timeout: Duration,
    stats: Option<&BridgeStats>,
    f: F,
) -> Result<T, BridgeError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    execute(handle, timeout, stats, tokio::task::spawn_blocking(f))?
        .map_err(|_join_error| BridgeError::Cancelled)
}

/// Async counterpart of [`execute_blocking`] for callers already on the runtime.
pub async fn blocking_with_timeout<F, T>(
    timeout: Duration,
    stats: Option<&BridgeStats>,
    f: F,
) -> Result<T, BridgeError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    if let Some(s) = stats {
        s.record_start();
    }
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(value)) => {
            if let Some(s) = stats {
                s.record_complete();
            }
            Ok(value)
        }
        Ok(Err(_join_error)) => Err(BridgeError::Cancelled),
        Err(_elapsed) => {
            if let Some(s) = stats {
                s.record_timeout();
            }
            Err(BridgeError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_simple() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = execute(rt.handle(), Duration::from_secs(5), None, async { 42 });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_timeout() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = execute(rt.handle(), Duration::from_millis(10), None, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        });
        assert!(matches!(result, Err(BridgeError::Timeout(_))));
    }

    #[test]
    fn test_execute_blocking() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let stats = BridgeStats::new();
        let result = execute_blocking(rt.handle(), Duration::from_secs(5), Some(&stats), || {
            "from the blocking pool".len()
        });
        assert_eq!(result.unwrap(), 21);
        assert_eq!(stats.operations_completed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_execute_blocking_timeout() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let stats = BridgeStats::new();
        let result = execute_blocking(rt.handle(), Duration::from_millis(20), Some(&stats), || {
            std::thread::sleep(Duration::from_millis(500));
        });
        assert!(matches!(result, Err(BridgeError::Timeout(_))));
        assert_eq!(stats.operations_timed_out.load(Ordering::Relaxed), 1);
        assert_eq!(stats.operations_completed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_execute_blocking_panic_is_cancelled() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result: Result<(), _> =
            execute_blocking(rt.handle(), Duration::from_secs(5), None, || {
                panic!("store call panicked")
            });
        assert!(matches!(result, Err(BridgeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_blocking_with_timeout() {
        let ok = blocking_with_timeout(Duration::from_secs(5), None, || 7).await;
        assert_eq!(ok.unwrap(), 7);

        let slow = blocking_with_timeout(Duration::from_millis(20), None, || {
            std::thread::sleep(Duration::from_millis(300));
        })
        .await;
        assert!(matches!(slow, Err(BridgeError::Timeout(_))));
    }
}

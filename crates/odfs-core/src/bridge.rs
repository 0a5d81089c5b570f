//! Bridge between sync filesystem callbacks and async HTTP requests.
//!
//! Filesystem callbacks run on plain threads while the remote client is
//! built on reqwest and tokio. [`execute`] spawns the request on a runtime
//! handle and blocks the caller on a oneshot channel, with a timeout that
//! aborts the spawned task so a stalled request cannot pin the worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Running counters for requests sent through [`execute`].
#[derive(Debug, Default)]
pub struct BridgeStats {
    started: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`], logged when a mount shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestSummary {
    pub started: u64,
    pub completed: u64,
    pub timed_out: u64,
}

impl RequestSummary {
    /// Requests whose task died without reporting back.
    pub fn abandoned(&self) -> u64 {
        self.started
            .saturating_sub(self.completed)
            .saturating_sub(self.timed_out)
    }
}

impl BridgeStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Error from bridged operations
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation was cancelled")]
    Cancelled,
}

/// Execute an async future from sync context with a timeout.
///
/// Must not be called from inside the runtime that `handle` points at:
/// the calling thread blocks until the spawned task reports back.
///
/// If the operation times out the spawned task is aborted, dropping the
/// in-flight request.
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
        BridgeStats::bump(&s.started);
    }

    let (tx, rx) = oneshot::channel();

    let task_handle = handle.spawn(async move {
        let result = tokio::time::timeout(timeout, future).await;
        // Receiver may be gone already
        let _ = tx.send(result);
    });

    match rx.blocking_recv() {
        Ok(Ok(value)) => {
            if let Some(s) = stats {
                BridgeStats::bump(&s.completed);
            }
            Ok(value)
        }
        Ok(Err(_elapsed)) => {
            task_handle.abort();
            if let Some(s) = stats {
                BridgeStats::bump(&s.timed_out);
            }
            Err(BridgeError::Timeout(timeout))
        }
        Err(_recv_error) => {
            task_handle.abort();
            Err(BridgeError::Cancelled)
        }
    }
}

//! Bounded batch executor
//!
//! Runs a batch of independent tasks with at most `limit` of them in flight
//! and reports back exactly once, when the last task of the batch is done.
//!
//! ```text
//! submit(N tasks) ──► spawn N ──► Semaphore(limit) ──► task body
//!                                                        │
//!                                  remaining -= 1 ◄──────┘  (drop guard)
//!                                        │
//!                            remaining == 0 ──► oneshot(outputs) ──► Batch::finished()
//! ```
//!
//! Failures are the task's business: a task reports them through its output
//! (or through the event bus) and the batch still completes. A panicking task
//! counts as finished.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Semaphore, oneshot};

/// Concurrency-limited task runner
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl BoundedExecutor {
    /// Create an executor running at most `limit` tasks at once
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::config("Executor concurrency must be > 0"));
        }

        Ok(Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        })
    }

    /// Concurrency ceiling
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Spawn every task of a batch
    ///
    /// Tasks start immediately as permits allow; a finished task frees its
    /// permit for the next waiting one. The returned [`Batch`] resolves once
    /// all of them have finished.
    ///
    /// Must be called from within a tokio runtime. An empty batch is rejected
    /// with [`Error::InvalidInput`].
    pub fn submit<I, F, T>(&self, tasks: I) -> Result<Batch<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let tasks: Vec<F> = tasks.into_iter().collect();
        if tasks.is_empty() {
            return Err(Error::invalid_input("Cannot submit an empty batch"));
        }

        let total = tasks.len();
        let (done_tx, done_rx) = oneshot::channel();
        let tracker = Arc::new(Tracker {
            remaining: AtomicUsize::new(total),
            outputs: Mutex::new(Vec::with_capacity(total)),
            done_tx: Mutex::new(Some(done_tx)),
        });

        for task in tasks {
            let permits = Arc::clone(&self.permits);
            let guard = CompletionGuard {
                tracker: Arc::clone(&tracker),
            };

            tokio::spawn(async move {
                // The guard counts this task as finished even if it panics.
                let guard = guard;
                let _permit = permits.acquire_owned().await;
                let output = task.await;
                guard.record(output);
            });
        }

        Ok(Batch {
            total,
            done_rx,
        })
    }
}

/// Handle to a submitted batch
#[derive(Debug)]
pub struct Batch<T> {
    total: usize,
    done_rx: oneshot::Receiver<Vec<T>>,
}

impl<T> Batch<T> {
    /// Number of tasks in the batch
    pub fn len(&self) -> usize {
        self.total
    }

    /// Always false; empty batches cannot be submitted
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Wait until every task has finished and collect their outputs
    ///
    /// Output order follows completion order. Tasks that panicked contribute
    /// no output.
    pub async fn finished(self) -> Result<Vec<T>> {
        self.done_rx
            .await
            .map_err(|_| Error::Other("Batch completion signal lost".to_string()))
    }
}

struct Tracker<T> {
    remaining: AtomicUsize,
    outputs: Mutex<Vec<T>>,
    done_tx: Mutex<Option<oneshot::Sender<Vec<T>>>>,
}

struct CompletionGuard<T> {
    tracker: Arc<Tracker<T>>,
}

impl<T> CompletionGuard<T> {
    fn record(self, output: T) {
        self.tracker
            .outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(output);
    }
}

impl<T> Drop for CompletionGuard<T> {
    fn drop(&mut self) {
        if self.tracker.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        // Last task of the batch: fire the completion exactly once.
        let outputs = std::mem::take(
            &mut *self
                .tracker
                .outputs
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let done_tx = self
            .tracker
            .done_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(done_tx) = done_tx {
            let _ = done_tx.send(outputs);
        }
    }
}

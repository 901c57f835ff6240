//! Background index construction
//!
//! Index builds run off the critical path on a bounded pool: a semaphore
//! caps concurrent builds at `max(1, cores / 2)` and the CPU-bound build
//! itself runs on the blocking pool. A build task hands the finished
//! index back to the caller, which installs it; nothing is visible to
//! lookups until installation.

use crate::index::secondary::SecondaryIndex;
use crate::storage::Row;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};

/// Errors from submitting background work
#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("background builder is shut down")]
    Shutdown,
}

/// A successfully built index plus its build cost
pub struct BuiltIndex {
    pub index: SecondaryIndex,
    pub build_millis: u64,
}

/// Builder statistics
#[derive(Debug, Clone, Serialize)]
pub struct BuilderStats {
    pub active_tasks: usize,
    pub parallelism: usize,
    pub shutdown: bool,
}

/// Decrements the active-task gauge even when a task is aborted
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded-parallelism executor for index builds and maintenance
pub struct BackgroundBuilder {
    permits: Arc<Semaphore>,
    parallelism: usize,
    active: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    abort_handles: Mutex<Vec<AbortHandle>>,
}

impl Default for BackgroundBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundBuilder {
    /// A builder sized at `max(1, cores / 2)`
    pub fn new() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_parallelism((cores / 2).max(1))
    }

    pub fn with_parallelism(parallelism: usize) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            permits: Arc::new(Semaphore::new(parallelism)),
            parallelism,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
            abort_handles: Mutex::new(Vec::new()),
        }
    }

    /// Submit one index build
    ///
    /// Resolves to `Some(built)` when the build ran to completion, `None`
    /// when it was cancelled by shutdown.
    pub fn submit_build(
        &self,
        index: SecondaryIndex,
        rows: Vec<Row>,
    ) -> Result<JoinHandle<Option<BuiltIndex>>, BuilderError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(BuilderError::Shutdown);
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));
        let permits = Arc::clone(&self.permits);

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let _permit = permits.acquire_owned().await.ok()?;

            let mut index = index;
            let built = tokio::task::spawn_blocking(move || {
                let start = Instant::now();
                index.build(&rows);
                BuiltIndex {
                    index,
                    build_millis: start.elapsed().as_millis() as u64,
                }
            })
            .await
            .ok()?;

            Some(built)
        });

        self.track(handle.abort_handle());
        Ok(handle)
    }

    /// Submit several builds; the returned handle joins on all of them
    pub fn submit_builds(
        &self,
        tasks: Vec<(SecondaryIndex, Vec<Row>)>,
    ) -> Result<JoinHandle<Vec<Option<BuiltIndex>>>, BuilderError> {
        let handles: Vec<JoinHandle<Option<BuiltIndex>>> = tasks
            .into_iter()
            .map(|(index, rows)| self.submit_build(index, rows))
            .collect::<Result<_, _>>()?;

        Ok(tokio::spawn(async move {
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await.ok().flatten());
            }
            results
        }))
    }

    /// Submit a maintenance task (cleanup, statistics refresh)
    pub fn submit_maintenance<F>(&self, task: F) -> Result<JoinHandle<()>, BuilderError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(BuilderError::Shutdown);
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));
        let permits = Arc::clone(&self.permits);

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let _ = tokio::task::spawn_blocking(task).await;
        });

        self.track(handle.abort_handle());
        Ok(handle)
    }

    fn track(&self, handle: AbortHandle) {
        let mut handles = self.abort_handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn has_active_tasks(&self) -> bool {
        self.active_tasks() > 0
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Poll until all active tasks finish or the timeout elapses; returns
    /// whether the builder went idle
    pub async fn await_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.has_active_tasks() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Stop accepting new work; in-flight builds run to completion
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Stop accepting new work and abort in-flight builds
    pub fn shutdown_now(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.permits.close();
        for handle in self.abort_handles.lock().drain(..) {
            handle.abort();
        }
    }

    pub fn stats(&self) -> BuilderStats {
        BuilderStats {
            active_tasks: self.active_tasks(),
            parallelism: self.parallelism,
            shutdown: self.is_shutdown(),
        }
    }
}

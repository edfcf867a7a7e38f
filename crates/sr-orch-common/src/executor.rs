//! Per-key serialising worker pool.

use log::{debug, error};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Error returned when work cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("executor {0} is shut down")]
    ShutDown(String),
}

/// Configuration for a [`KeyedExecutor`].
#[derive(Debug, Clone)]
pub struct KeyedExecutorConfig {
    /// Name used in log messages.
    pub name: String,
    /// Number of worker shards.
    pub workers: usize,
}

impl Default for KeyedExecutorConfig {
    fn default() -> Self {
        Self {
            name: "executor".to_string(),
            workers: 4,
        }
    }
}

impl KeyedExecutorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Fixed set of worker shards; every job is routed by the hash of its key.
///
/// Jobs sharing a key run in submission order on one shard. A job that
/// panics is logged and does not stop its shard.
///
/// Must be created inside a tokio runtime.
pub struct KeyedExecutor {
    name: String,
    shards: Vec<mpsc::UnboundedSender<Job>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    closed: AtomicBool,
}

impl KeyedExecutor {
    /// Spawns the worker shards.
    pub fn new(config: KeyedExecutorConfig) -> Self {
        let workers = config.workers.max(1);
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let mut shards = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
            let pending = Arc::clone(&pending);
            let idle = Arc::clone(&idle);
            let name = config.name.clone();

            handles.push(tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("{}: job on shard {} panicked", name, index);
                    }
                    if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                        idle.notify_waiters();
                    }
                }
                debug!("{}: shard {} stopped", name, index);
            }));
            shards.push(tx);
        }

        Self {
            name: config.name,
            shards,
            handles: Mutex::new(handles),
            pending,
            idle,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the executor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of worker shards.
    pub fn workers(&self) -> usize {
        self.shards.len()
    }

    /// Returns the shard index a key maps to.
    pub fn shard_for<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Returns the number of queued or running jobs.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Queues `job` on the shard owning `key`.
    pub fn execute<K, F>(&self, key: &K, job: F) -> Result<(), ExecutorError>
    where
        K: Hash + ?Sized,
        F: FnOnce() + Send + 'static,
    {
        // Counted before the closed check so that a concurrent shutdown
        // either rejects this job or waits for it.
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.release();
            return Err(ExecutorError::ShutDown(self.name.clone()));
        }

        let shard = self.shard_for(key);
        if self.shards[shard].send(Box::new(job)).is_err() {
            self.release();
            return Err(ExecutorError::ShutDown(self.name.clone()));
        }
        Ok(())
    }

    fn release(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Waits until every job queued so far has finished.
    pub async fn flush(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Refuses new work, drains the queues and stops all shards.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.flush().await;

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
        debug!("{}: shut down", self.name);
    }
}

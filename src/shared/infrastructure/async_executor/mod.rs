// Bounded executor for work that must run off the calling task.
//
// Responsibilities
// - Run submitted futures on the runtime, at most `pool_size` at a time, with
//   at most `queue_capacity` more waiting for a worker slot.
// - Deliver each result through a `TaskHandle`, including panics.
// - Reject work once full or shut down instead of growing without bound.
// - On shutdown, drain in-flight and queued work within a timeout and abort
//   whatever is left.

pub mod task_handle;

pub use task_handle::{TaskError, TaskHandle};

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{error, info};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("executor is at capacity ({capacity} tasks)")]
    QueueFull { capacity: usize },

    #[error("executor is shut down")]
    ShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorShutdown {
    pub aborted: usize,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicU64,
}

// Keeps the queued/active gauges right however the task ends.
struct Slot {
    counters: Arc<Counters>,
    active: bool,
}

impl Slot {
    fn queued(counters: Arc<Counters>) -> Self {
        counters.queued.fetch_add(1, Ordering::SeqCst);
        Self {
            counters,
            active: false,
        }
    }

    fn activate(&mut self) {
        self.counters.queued.fetch_sub(1, Ordering::SeqCst);
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        self.active = true;
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.active {
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
            self.counters.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct AsyncExecutor {
    pool_size: usize,
    queue_capacity: usize,
    workers: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    accepting: AtomicBool,
    counters: Arc<Counters>,
    tasks: Mutex<JoinSet<()>>,
}

impl AsyncExecutor {
    pub fn new(pool_size: usize, queue_capacity: usize) -> Self {
        let pool_size = pool_size.clamp(1, Semaphore::MAX_PERMITS);
        let queue_capacity = queue_capacity.min(Semaphore::MAX_PERMITS - pool_size);
        Self {
            pool_size,
            queue_capacity,
            workers: Arc::new(Semaphore::new(pool_size)),
            admission: Arc::new(Semaphore::new(pool_size + queue_capacity)),
            accepting: AtomicBool::new(true),
            counters: Arc::new(Counters::default()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn active_count(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn queued_count(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst)
    }

    /// Tasks that got a worker slot and then ended, successfully or not.
    pub fn completed_count(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    /// Runs `future` off the calling task and returns a handle to its output.
    pub fn submit<F, T>(&self, future: F) -> Result<TaskHandle<T>, SubmitError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_accepting() {
            return Err(SubmitError::ShutDown);
        }
        let admission = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|error| match error {
                TryAcquireError::Closed => SubmitError::ShutDown,
                TryAcquireError::NoPermits => SubmitError::QueueFull {
                    capacity: self.pool_size + self.queue_capacity,
                },
            })?;

        let (completion, handle) = TaskHandle::channel();
        let workers = self.workers.clone();
        let mut slot = Slot::queued(self.counters.clone());

        let mut tasks = self.lock_tasks();
        // Shutdown may have taken the task set after the check above.
        if !self.is_accepting() {
            return Err(SubmitError::ShutDown);
        }
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let _admission = admission;
            let Ok(_worker) = workers.acquire_owned().await else {
                return;
            };
            slot.activate();
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(output) => Ok(output),
                Err(_) => {
                    error!("asynchronous task panicked");
                    Err(TaskError::Panicked)
                }
            };
            drop(slot);
            completion.finish(result);
        });
        Ok(handle)
    }

    /// Fire-and-forget variant of `submit`; failures are logged.
    pub fn spawn_detached<F>(&self, name: &str, future: F) -> Result<(), SubmitError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.to_string();
        self.submit(async move {
            if let Err(error) = future.await {
                error!(task = %name, error = ?error, "asynchronous task failed");
            }
        })
        .map(drop)
    }

    /// Stops accepting work, waits up to `timeout` for in-flight and queued
    /// tasks, then aborts the rest.
    pub async fn shutdown(&self, timeout: Duration) -> ExecutorShutdown {
        let mut tasks = {
            let mut guard = self.lock_tasks();
            if !self.accepting.swap(false, Ordering::SeqCst) {
                return ExecutorShutdown::default();
            }
            std::mem::take(&mut *guard)
        };
        self.admission.close();

        let drained = time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        let aborted = if drained.is_err() {
            let remaining = tasks.len();
            tasks.shutdown().await;
            remaining
        } else {
            0
        };
        self.workers.close();

        info!(
            aborted,
            completed = self.completed_count(),
            "asynchronous executor stopped"
        );
        ExecutorShutdown { aborted }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

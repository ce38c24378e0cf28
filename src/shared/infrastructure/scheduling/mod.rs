// Scheduler for time-triggered recurring work.
//
// Responsibilities
// - Hold job registrations until the owning context starts, then run each job
//   on its own loop driven by its trigger.
// - Bound the number of job bodies executing at the same time by the pool size.
// - Keep a job on its schedule when a run fails or panics.
// - Stop every loop on shutdown, letting bodies in progress finish within the
//   shutdown timeout and aborting the rest.

pub mod job;
pub mod trigger;

pub use job::{FnJob, ScheduledJob, job_fn};
pub use trigger::{MAX_TRIGGER_DURATION, Trigger};

use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("job {job}: trigger interval must be greater than zero")]
    ZeroInterval { job: String },

    #[error("job {job}: trigger durations must not exceed {max:?}")]
    DurationTooLong { job: String, max: Duration },

    #[error("scheduler is shut down")]
    ShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub id: JobId,
    pub name: String,
    pub trigger: Trigger,
    pub runs: u64,
    pub failures: u64,
}

/// `stopped` counts loops that ended on their own, `aborted` the ones cut
/// short after the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerShutdown {
    pub stopped: usize,
    pub aborted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    Running,
    ShutDown,
}

#[derive(Default)]
struct JobStats {
    runs: AtomicU64,
    failures: AtomicU64,
}

struct Registration {
    id: JobId,
    trigger: Trigger,
    job: Arc<dyn ScheduledJob>,
    stats: Arc<JobStats>,
}

struct JobEntry {
    id: JobId,
    name: String,
    trigger: Trigger,
    stats: Arc<JobStats>,
}

struct Inner {
    state: SchedulerState,
    next_id: u64,
    pending: Vec<Registration>,
    handles: Vec<JoinHandle<()>>,
    jobs: Vec<JobEntry>,
}

pub struct Scheduler {
    pool_size: usize,
    permits: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    inner: Mutex<Inner>,
}

impl Scheduler {
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.clamp(1, Semaphore::MAX_PERMITS);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            pool_size,
            permits: Arc::new(Semaphore::new(pool_size)),
            shutdown_tx,
            inner: Mutex::new(Inner {
                state: SchedulerState::Idle,
                next_id: 1,
                pending: Vec::new(),
                handles: Vec::new(),
                jobs: Vec::new(),
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Registers a job. Before `start` the job waits; afterwards its loop is
    /// spawned immediately.
    pub async fn schedule(
        &self,
        trigger: Trigger,
        job: Arc<dyn ScheduledJob>,
    ) -> Result<JobId, ScheduleError> {
        trigger.validate(job.name())?;

        let mut inner = self.inner.lock().await;
        if inner.state == SchedulerState::ShutDown {
            return Err(ScheduleError::ShutDown);
        }

        let id = JobId(inner.next_id);
        inner.next_id += 1;
        let stats = Arc::new(JobStats::default());
        inner.jobs.push(JobEntry {
            id,
            name: job.name().to_string(),
            trigger,
            stats: stats.clone(),
        });

        let registration = Registration {
            id,
            trigger,
            job,
            stats,
        };
        if inner.state == SchedulerState::Running {
            let handle = self.spawn(registration);
            inner.handles.push(handle);
        } else {
            inner.pending.push(registration);
        }
        Ok(id)
    }

    pub async fn start(&self) -> Result<(), ScheduleError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SchedulerState::ShutDown => return Err(ScheduleError::ShutDown),
            SchedulerState::Running => return Ok(()),
            SchedulerState::Idle => {}
        }
        inner.state = SchedulerState::Running;
        let pending = std::mem::take(&mut inner.pending);
        for registration in pending {
            let handle = self.spawn(registration);
            inner.handles.push(handle);
        }
        info!(
            jobs = inner.handles.len(),
            pool_size = self.pool_size,
            "scheduler started"
        );
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.state == SchedulerState::Running
    }

    pub async fn job_count(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn jobs(&self) -> Vec<JobStatus> {
        let inner = self.inner.lock().await;
        inner
            .jobs
            .iter()
            .map(|entry| JobStatus {
                id: entry.id,
                name: entry.name.clone(),
                trigger: entry.trigger,
                runs: entry.stats.runs.load(Ordering::SeqCst),
                failures: entry.stats.failures.load(Ordering::SeqCst),
            })
            .collect()
    }

    /// Stops every job loop. Bodies in progress get `timeout` to finish;
    /// loops still alive after that are aborted.
    pub async fn shutdown(&self, timeout: Duration) -> SchedulerShutdown {
        let handles = {
            let mut inner = self.inner.lock().await;
            if inner.state == SchedulerState::ShutDown {
                return SchedulerShutdown::default();
            }
            inner.state = SchedulerState::ShutDown;
            inner.pending.clear();
            std::mem::take(&mut inner.handles)
        };

        self.shutdown_tx.send_replace(true);
        self.permits.close();

        let total = handles.len();
        let abort_handles: Vec<AbortHandle> =
            handles.iter().map(JoinHandle::abort_handle).collect();
        let drained = time::timeout(timeout, async move {
            for handle in handles {
                if let Err(join_error) = handle.await {
                    warn!(error = %join_error, "scheduled job loop ended abnormally");
                }
            }
        })
        .await;

        let aborted = if drained.is_err() {
            let unfinished: Vec<&AbortHandle> =
                abort_handles.iter().filter(|h| !h.is_finished()).collect();
            for handle in &unfinished {
                handle.abort();
            }
            unfinished.len()
        } else {
            0
        };
        let stopped = total - aborted;

        info!(stopped, aborted, "scheduler stopped");
        SchedulerShutdown { stopped, aborted }
    }

    fn spawn(&self, registration: Registration) -> JoinHandle<()> {
        debug!(
            job = %registration.job.name(),
            id = %registration.id,
            trigger = ?registration.trigger,
            "scheduling job"
        );
        tokio::spawn(run_loop(
            registration,
            self.permits.clone(),
            self.shutdown_tx.subscribe(),
        ))
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.inner.get_mut().handles.drain(..) {
            handle.abort();
        }
    }
}

async fn run_loop(
    registration: Registration,
    permits: Arc<Semaphore>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if *shutdown_rx.borrow_and_update() {
        return;
    }

    let first_run = Instant::now() + registration.trigger.initial_delay();
    match registration.trigger {
        Trigger::FixedRate { period, .. } => {
            let mut ticker = time::interval_at(first_run, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                if !execute(&registration, &permits).await {
                    break;
                }
            }
        }
        Trigger::FixedDelay { delay, .. } => {
            let mut next_run = first_run;
            loop {
                tokio::select! {
                    _ = time::sleep_until(next_run) => {}
                    _ = shutdown_rx.changed() => break,
                }
                if !execute(&registration, &permits).await {
                    break;
                }
                next_run = Instant::now() + delay;
            }
        }
    }

    debug!(job = %registration.job.name(), id = %registration.id, "job loop stopped");
}

/// Runs one body. Returns false once the scheduler no longer hands out permits.
async fn execute(registration: &Registration, permits: &Semaphore) -> bool {
    let Ok(_permit) = permits.acquire().await else {
        return false;
    };

    registration.stats.runs.fetch_add(1, Ordering::SeqCst);
    let name = registration.job.name();
    match AssertUnwindSafe(registration.job.run()).catch_unwind().await {
        Ok(Ok(())) => {
            debug!(job = %name, "scheduled job completed");
        }
        Ok(Err(error)) => {
            registration.stats.failures.fetch_add(1, Ordering::SeqCst);
            error!(job = %name, error = ?error, "scheduled job failed");
        }
        Err(_) => {
            registration.stats.failures.fetch_add(1, Ordering::SeqCst);
            error!(job = %name, "scheduled job panicked");
        }
    }
    true
}

// Application context: the process-wide container of wired components.
//
// Responsibilities
// - Own the scheduler and the asynchronous executor, created from the
//   capability flags in `AppConfig`.
// - Take components through an explicit registration list on the builder.
// - Track the lifecycle NotStarted -> Running -> Stopped.
// - Guarantee that at most one context is alive in the process.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::shared::infrastructure::async_executor::AsyncExecutor;
use crate::shared::infrastructure::scheduling::{ScheduledJob, Scheduler, Trigger};
use crate::shell::config::AppConfig;
use crate::shell::errors::{CapabilityError, ContextError};

static CONTEXT_SLOT: AtomicBool = AtomicBool::new(false);

// Claim on the single per-process context slot, released on drop.
struct ContextSlot;

impl ContextSlot {
    fn claim() -> Result<Self, ContextError> {
        CONTEXT_SLOT
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ContextSlot)
            .map_err(|_| ContextError::AlreadyInitialized)
    }
}

impl Drop for ContextSlot {
    fn drop(&mut self) {
        CONTEXT_SLOT.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    NotStarted,
    Running,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::NotStarted => "NOT_STARTED",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Stopped => "STOPPED",
        };
        f.write_str(label)
    }
}

/// Capabilities enabled for the whole lifetime of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub scheduling: bool,
    pub async_execution: bool,
}

impl From<&AppConfig> for Capabilities {
    fn from(config: &AppConfig) -> Self {
        Self {
            scheduling: config.enable_scheduling,
            async_execution: config.enable_async,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ShutdownReport {
    pub jobs_stopped: usize,
    pub jobs_aborted: usize,
    pub tasks_aborted: usize,
}

struct JobRegistration {
    trigger: Trigger,
    job: Arc<dyn ScheduledJob>,
}

pub struct ApplicationContextBuilder {
    config: AppConfig,
    jobs: Vec<JobRegistration>,
}

impl ApplicationContextBuilder {
    pub fn with_scheduled_job(mut self, trigger: Trigger, job: impl ScheduledJob) -> Self {
        self.jobs.push(JobRegistration {
            trigger,
            job: Arc::new(job),
        });
        self
    }

    pub fn build(self) -> Result<ApplicationContext, ContextError> {
        let capabilities = Capabilities::from(&self.config);
        if !capabilities.scheduling && !self.jobs.is_empty() {
            return Err(CapabilityError::SchedulingDisabled.into());
        }
        for registration in &self.jobs {
            registration.trigger.validate(registration.job.name())?;
        }

        let slot = ContextSlot::claim()?;
        let scheduler = capabilities
            .scheduling
            .then(|| Arc::new(Scheduler::new(self.config.scheduler_pool_size)));
        let executor = capabilities.async_execution.then(|| {
            Arc::new(AsyncExecutor::new(
                self.config.async_pool_size,
                self.config.async_queue_capacity,
            ))
        });
        let (state, _) = watch::channel(LifecycleState::NotStarted);

        let context = ApplicationContext {
            id: Uuid::now_v7(),
            config: self.config,
            capabilities,
            state,
            started_at: OnceLock::new(),
            scheduler,
            executor,
            lifecycle: Mutex::new(self.jobs),
            _slot: slot,
        };
        debug!(context_id = %context.id, "application context built");
        Ok(context)
    }
}

pub struct ApplicationContext {
    id: Uuid,
    config: AppConfig,
    capabilities: Capabilities,
    state: watch::Sender<LifecycleState>,
    started_at: OnceLock<DateTime<Utc>>,
    scheduler: Option<Arc<Scheduler>>,
    executor: Option<Arc<AsyncExecutor>>,
    // Serializes lifecycle transitions; holds jobs not yet handed to the scheduler.
    lifecycle: Mutex<Vec<JobRegistration>>,
    _slot: ContextSlot,
}

impl ApplicationContext {
    pub fn builder(config: AppConfig) -> ApplicationContextBuilder {
        ApplicationContextBuilder {
            config,
            jobs: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.get().copied()
    }

    pub fn scheduler(&self) -> Result<&Arc<Scheduler>, CapabilityError> {
        self.scheduler
            .as_ref()
            .ok_or(CapabilityError::SchedulingDisabled)
    }

    pub fn executor(&self) -> Result<&Arc<AsyncExecutor>, CapabilityError> {
        self.executor.as_ref().ok_or(CapabilityError::AsyncDisabled)
    }

    pub async fn start(&self) -> Result<(), ContextError> {
        let mut pending = self.lifecycle.lock().await;
        self.ensure_transition(LifecycleState::Running)?;

        if let Some(scheduler) = &self.scheduler {
            for registration in pending.drain(..) {
                scheduler
                    .schedule(registration.trigger, registration.job)
                    .await?;
            }
            scheduler.start().await?;
        }

        let _ = self.started_at.set(Utc::now());
        self.state.send_replace(LifecycleState::Running);
        info!(
            context_id = %self.id,
            application = %self.config.application_name,
            scheduling = self.capabilities.scheduling,
            async_execution = self.capabilities.async_execution,
            "application context running"
        );
        Ok(())
    }

    /// Stops the scheduler, then drains the executor, both within `timeout`.
    /// Also valid before `start`, to tear down a context that never ran.
    pub async fn shutdown(&self, timeout: Duration) -> Result<ShutdownReport, ContextError> {
        let mut pending = self.lifecycle.lock().await;
        let from = self.ensure_transition(LifecycleState::Stopped)?;
        pending.clear();

        let began = Instant::now();
        let mut report = ShutdownReport::default();
        if let Some(scheduler) = &self.scheduler {
            let stopped = scheduler.shutdown(timeout).await;
            report.jobs_stopped = stopped.stopped;
            report.jobs_aborted = stopped.aborted;
        }
        if let Some(executor) = &self.executor {
            let remaining = timeout.saturating_sub(began.elapsed());
            report.tasks_aborted = executor.shutdown(remaining).await.aborted;
        }

        self.state.send_replace(LifecycleState::Stopped);
        info!(
            context_id = %self.id,
            from = %from,
            jobs_stopped = report.jobs_stopped,
            jobs_aborted = report.jobs_aborted,
            tasks_aborted = report.tasks_aborted,
            "application context stopped"
        );
        Ok(report)
    }

    fn ensure_transition(&self, to: LifecycleState) -> Result<LifecycleState, ContextError> {
        let from = self.state();
        let allowed = matches!(
            (from, to),
            (LifecycleState::NotStarted, LifecycleState::Running)
                | (LifecycleState::NotStarted, LifecycleState::Stopped)
                | (LifecycleState::Running, LifecycleState::Stopped)
        );
        if allowed {
            Ok(from)
        } else {
            Err(ContextError::InvalidTransition { from, to })
        }
    }
}

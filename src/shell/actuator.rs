// Operational endpoints: liveness of the context and of each capability, and
// a summary of what the context is running.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::shell::context::{Capabilities, LifecycleState};
use crate::shell::state::AppState;

const UP: &str = "UP";
const DOWN: &str = "DOWN";
const DISABLED: &str = "DISABLED";

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthComponents {
    pub scheduling: ComponentHealth,
    #[serde(rename = "async")]
    pub async_execution: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: HealthComponents,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let context = &state.context;
    let running = context.state() == LifecycleState::Running;

    let scheduling = match context.scheduler() {
        Err(_) => DISABLED,
        Ok(scheduler) => {
            if running && scheduler.is_running().await {
                UP
            } else {
                DOWN
            }
        }
    };
    let async_execution = match context.executor() {
        Err(_) => DISABLED,
        Ok(executor) if running && executor.is_accepting() => UP,
        Ok(_) => DOWN,
    };

    let (code, status) = if running {
        (StatusCode::OK, UP)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, DOWN)
    };
    let body = HealthResponse {
        status,
        components: HealthComponents {
            scheduling: ComponentHealth { status: scheduling },
            async_execution: ComponentHealth {
                status: async_execution,
            },
        },
    };
    (code, Json(body))
}

#[derive(Debug, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub runs: u64,
    pub failures: u64,
}

#[derive(Debug, Serialize)]
pub struct SchedulerInfo {
    pub pool_size: usize,
    pub jobs: Vec<JobInfo>,
}

#[derive(Debug, Serialize)]
pub struct ExecutorInfo {
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub application: String,
    pub context_id: Uuid,
    pub state: LifecycleState,
    pub started_at: Option<DateTime<Utc>>,
    pub capabilities: Capabilities,
    pub scheduler: Option<SchedulerInfo>,
    pub executor: Option<ExecutorInfo>,
}

pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    let context = &state.context;

    let scheduler = match context.scheduler() {
        Ok(scheduler) => Some(SchedulerInfo {
            pool_size: scheduler.pool_size(),
            jobs: scheduler
                .jobs()
                .await
                .into_iter()
                .map(|job| JobInfo {
                    name: job.name,
                    runs: job.runs,
                    failures: job.failures,
                })
                .collect(),
        }),
        Err(_) => None,
    };
    let executor = context.executor().ok().map(|executor| ExecutorInfo {
        pool_size: executor.pool_size(),
        queue_capacity: executor.queue_capacity(),
        active: executor.active_count(),
        queued: executor.queued_count(),
        completed: executor.completed_count(),
    });

    Json(InfoResponse {
        application: context.config().application_name.clone(),
        context_id: context.id(),
        state: context.state(),
        started_at: context.started_at(),
        capabilities: context.capabilities(),
        scheduler,
        executor,
    })
}

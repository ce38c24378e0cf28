use thiserror::Error;

use crate::shared::infrastructure::scheduling::ScheduleError;
use crate::shell::context::LifecycleState;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("scheduling capability is not enabled")]
    SchedulingDisabled,

    #[error("asynchronous execution capability is not enabled")]
    AsyncDisabled,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("an application context already exists in this process")]
    AlreadyInitialized,

    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

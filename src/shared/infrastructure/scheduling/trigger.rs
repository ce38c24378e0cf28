use std::time::Duration;

use crate::shared::infrastructure::scheduling::ScheduleError;

/// Upper bound for every trigger duration, so deadlines always fit in an
/// `Instant`.
pub const MAX_TRIGGER_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// When a scheduled job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fires every `period`, measured from the previous start. A run that
    /// overruns its period skips the missed ticks instead of bursting.
    FixedRate {
        period: Duration,
        initial_delay: Duration,
    },
    /// Waits `delay` after each completed run before firing again.
    FixedDelay {
        delay: Duration,
        initial_delay: Duration,
    },
}

impl Trigger {
    pub fn fixed_rate(period: Duration) -> Self {
        Trigger::FixedRate {
            period,
            initial_delay: Duration::ZERO,
        }
    }

    pub fn fixed_delay(delay: Duration) -> Self {
        Trigger::FixedDelay {
            delay,
            initial_delay: Duration::ZERO,
        }
    }

    pub fn with_initial_delay(self, initial_delay: Duration) -> Self {
        match self {
            Trigger::FixedRate { period, .. } => Trigger::FixedRate {
                period,
                initial_delay,
            },
            Trigger::FixedDelay { delay, .. } => Trigger::FixedDelay {
                delay,
                initial_delay,
            },
        }
    }

    pub fn initial_delay(&self) -> Duration {
        match self {
            Trigger::FixedRate { initial_delay, .. } | Trigger::FixedDelay { initial_delay, .. } => {
                *initial_delay
            }
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            Trigger::FixedRate { period, .. } => *period,
            Trigger::FixedDelay { delay, .. } => *delay,
        }
    }

    pub fn validate(&self, job: &str) -> Result<(), ScheduleError> {
        if self.interval().is_zero() {
            return Err(ScheduleError::ZeroInterval {
                job: job.to_string(),
            });
        }
        if self.interval() > MAX_TRIGGER_DURATION || self.initial_delay() > MAX_TRIGGER_DURATION {
            return Err(ScheduleError::DurationTooLong {
                job: job.to_string(),
                max: MAX_TRIGGER_DURATION,
            });
        }
        Ok(())
    }
}

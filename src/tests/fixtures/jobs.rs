// Scheduled job doubles shared by the scheduler and context tests.

use crate::shared::infrastructure::scheduling::ScheduledJob;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct CountingJob {
    name: String,
    runs: Arc<AtomicUsize>,
}

impl CountingJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn runs(&self) -> Arc<AtomicUsize> {
        self.runs.clone()
    }
}

#[async_trait]
impl ScheduledJob for CountingJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FailingJob {
    name: String,
}

impl FailingJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ScheduledJob for FailingJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        anyhow::bail!("{} failed", self.name)
    }
}

pub struct PanickingJob {
    name: String,
}

impl PanickingJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ScheduledJob for PanickingJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        panic!("{} panicked", self.name)
    }
}

/// Tracks how many bodies run at once across every job sharing it.
#[derive(Clone, Default)]
pub struct ConcurrencyGauge {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub async fn observe(&self, duration: Duration) {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(duration).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct SlowJob {
    name: String,
    duration: Duration,
    gauge: ConcurrencyGauge,
}

impl SlowJob {
    pub fn new(name: impl Into<String>, duration: Duration, gauge: ConcurrencyGauge) -> Self {
        Self {
            name: name.into(),
            duration,
            gauge,
        }
    }
}

#[async_trait]
impl ScheduledJob for SlowJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.gauge.observe(self.duration).await;
        Ok(())
    }
}

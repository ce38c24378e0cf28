// Scheduled jobs are the unit of recurring work handed to the scheduler.
//
// Modules that need time-triggered work implement `ScheduledJob` and register
// it explicitly on the application context builder.

use async_trait::async_trait;
use std::future::Future;

#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self) -> anyhow::Result<()>;
}

/// Adapts an async closure into a `ScheduledJob`.
pub struct FnJob<F> {
    name: String,
    body: F,
}

pub fn job_fn<F, Fut>(name: impl Into<String>, body: F) -> FnJob<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnJob {
        name: name.into(),
        body,
    }
}

#[async_trait]
impl<F, Fut> ScheduledJob for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        (self.body)().await
    }
}

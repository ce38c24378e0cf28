use anyhow::Context as _;
use std::process::ExitCode;

use pos_selfreg::shell::config::AppConfig;
use pos_selfreg::shell::server::{Application, ShutdownSignal};
use pos_selfreg::shell::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    start(std::env::args().skip(1).collect()).await
}

async fn start(arguments: Vec<String>) -> ExitCode {
    let dotenv = dotenvy::dotenv();
    telemetry::init();
    if let Err(dotenv_error) = dotenv {
        if !dotenv_error.not_found() {
            tracing::warn!(error = %dotenv_error, "ignoring unreadable .env file");
        }
    }

    match run(arguments).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(startup_error) => {
            tracing::error!("application failed: {startup_error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(arguments: Vec<String>) -> anyhow::Result<()> {
    // Armed before the context reaches Running.
    let shutdown = ShutdownSignal::install().context("failed to install signal handlers")?;
    let config = AppConfig::load(&arguments)?;
    let application = Application::build(config).await?;
    let report = application.run_until_stopped(shutdown.received()).await?;
    tracing::info!(
        jobs_stopped = report.jobs_stopped,
        jobs_aborted = report.jobs_aborted,
        tasks_aborted = report.tasks_aborted,
        "shutdown complete"
    );
    Ok(())
}

// Binds the listener, starts the context and serves HTTP until the shutdown
// signal resolves, then stops the context.

use anyhow::Context as _;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::shell::config::AppConfig;
use crate::shell::context::{ApplicationContext, ApplicationContextBuilder, ShutdownReport};
use crate::shell::http;
use crate::shell::state::AppState;

pub struct Application {
    context: Arc<ApplicationContext>,
    listener: TcpListener,
}

impl Application {
    /// Builds the context from the default registration list and binds the
    /// HTTP listener.
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        Self::build_with(ApplicationContext::builder(config)).await
    }

    /// Like `build`, with a caller-provided registration list.
    pub async fn build_with(builder: ApplicationContextBuilder) -> anyhow::Result<Self> {
        let context = builder
            .build()
            .context("failed to construct the application context")?;
        let address = context.config().socket_addr();
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind {address}"))?;
        Ok(Self {
            context: Arc::new(context),
            listener,
        })
    }

    pub fn context(&self) -> Arc<ApplicationContext> {
        self.context.clone()
    }

    pub async fn run_until_stopped<F>(self, shutdown: F) -> anyhow::Result<ShutdownReport>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Application { context, listener } = self;
        let timeout = context.config().shutdown_timeout;

        if let Err(start_error) = context.start().await {
            if let Err(teardown_error) = context.shutdown(timeout).await {
                warn!(error = %teardown_error, "teardown after failed start did not complete");
            }
            return Err(start_error).context("failed to start the application context");
        }

        let app = http::router(AppState::new(context.clone()));
        match listener.local_addr() {
            Ok(address) => info!(
                "{} listening on http://{}{}",
                context.config().application_name,
                address,
                context.config().context_path
            ),
            Err(address_error) => warn!(error = %address_error, "listener has no local address"),
        }
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        let report = context.shutdown(timeout).await?;
        served.context("http server failed")?;
        Ok(report)
    }
}

/// SIGINT and SIGTERM listeners, registered when constructed. A signal that
/// arrives before `received` is polled is kept, not lost to the default
/// handler.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignal {
    /// Must be called from within the runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolves on the first SIGINT or SIGTERM.
    #[cfg(unix)]
    pub async fn received(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!(signal = "SIGINT", "shutdown requested"),
            _ = self.terminate.recv() => info!(signal = "SIGTERM", "shutdown requested"),
        }
    }

    #[cfg(not(unix))]
    pub async fn received(self) {
        match signal::ctrl_c().await {
            Ok(()) => info!(signal = "ctrl-c", "shutdown requested"),
            Err(signal_error) => {
                tracing::error!(error = %signal_error, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod application_tests {
    use super::*;
    use crate::shared::infrastructure::scheduling::Trigger;
    use crate::shell::context::LifecycleState;
    use crate::tests::fixtures::context::exclusive_context;
    use crate::tests::fixtures::jobs::CountingJob;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn local_config() -> AppConfig {
        AppConfig {
            server_host: [127, 0, 0, 1].into(),
            server_port: 0,
            shutdown_timeout: Duration::from_secs(1),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn it_should_run_until_the_shutdown_signal() {
        let _guard = exclusive_context();
        let application = Application::build(local_config()).await.expect("build failed");
        let context = application.context();
        let mut state = context.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(application.run_until_stopped(async move {
            let _ = stop_rx.await;
        }));
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|state| *state == LifecycleState::Running),
        )
        .await
        .expect("context never reached Running")
        .expect("context dropped");

        stop_tx.send(()).expect("server already gone");
        let report = server.await.expect("server task panicked").expect("run failed");
        assert_eq!(report.tasks_aborted, 0);
        assert_eq!(context.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn it_should_run_jobs_from_the_registration_list() {
        let _guard = exclusive_context();
        let job = CountingJob::new("heartbeat");
        let runs = job.runs();
        let builder = ApplicationContext::builder(local_config())
            .with_scheduled_job(Trigger::fixed_rate(Duration::from_millis(5)), job);
        let application = Application::build_with(builder).await.expect("build failed");
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(application.run_until_stopped(async move {
            let _ = stop_rx.await;
        }));
        tokio::time::timeout(Duration::from_secs(5), async {
            while runs.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registered job never ran");

        stop_tx.send(()).expect("server already gone");
        let report = server.await.expect("server task panicked").expect("run failed");
        assert_eq!(report.jobs_stopped, 1);
    }

    #[tokio::test]
    async fn it_should_fail_to_build_when_the_port_is_taken() {
        let _guard = exclusive_context();
        let occupied = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let port = occupied.local_addr().expect("no address").port();

        let result = Application::build(AppConfig {
            server_port: port,
            ..local_config()
        })
        .await;

        let message = format!("{:#}", result.err().expect("expected a bind failure"));
        assert!(message.contains("failed to bind"));
        assert!(ApplicationContext::builder(local_config()).build().is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn it_should_keep_a_termination_signal_raised_before_it_is_awaited() {
        use nix::sys::signal::{Signal, raise};

        let shutdown = ShutdownSignal::install().expect("install failed");
        raise(Signal::SIGTERM).expect("raise failed");

        tokio::time::timeout(Duration::from_secs(5), shutdown.received())
            .await
            .expect("signal was lost");
    }

    #[tokio::test]
    async fn it_should_fail_to_build_while_another_context_exists() {
        let _guard = exclusive_context();
        let _existing = ApplicationContext::builder(local_config())
            .build()
            .expect("build failed");

        let result = Application::build(local_config()).await;

        let message = format!("{:#}", result.err().expect("expected a context failure"));
        assert!(message.contains("failed to construct the application context"));
    }
}

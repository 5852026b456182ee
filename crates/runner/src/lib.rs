//! Process runner for the ingest worker.
//!
//! Each named process gets a clone of one [`CancellationToken`]. The first process to
//! fail, a SIGINT, or a SIGTERM cancels that token; once every process has returned the
//! closers run concurrently under a shared timeout.
//!
//! ```no_run
//! use sif_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("probe", |ctx| async move {
//!             let mut ticks = tokio::time::interval(Duration::from_secs(60));
//!             while !ctx.is_cancelled() {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => {}
//!                     _ = ticks.tick() => tracing::info!("probing"),
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// A boxed long-running process, started with the runner's cancellation token
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// A boxed cleanup step run after all processes stop
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

/// Runs named processes until cancellation, then runs the closers
pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    shutdown_grace: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Empty runner with a 30 second shutdown grace and a 10 second closer timeout
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(30),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds a process under `name`, which is attached to every log line about it.
    ///
    /// If any process returns an error, all processes are cancelled and closers are executed.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Adds a closer. Closers run whether processes stopped cleanly or not, and a failing
    /// closer does not stop the others.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// How long cancelled processes may keep running to finish in-flight work before they
    /// are aborted. Closers only start after this.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Bound on the closers taken together
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, so callers can stop the runner themselves
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs all processes, then exits the application.
    ///
    /// Exits with code 1 if a process failed and 0 after a clean shutdown.
    pub async fn run(self) {
        match self.run_until_stopped().await {
            Some(err) => {
                tracing::error!("Application exiting with error: {:#}", err);
                std::process::exit(1);
            }
            None => {
                tracing::info!("Application exiting normally");
                std::process::exit(0);
            }
        }
    }

    /// Runs all processes until cancellation, a signal, or the first failure, then runs the
    /// closers. Returns the first process error, if any.
    pub async fn run_until_stopped(self) -> Option<anyhow::Error> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                tracing::info!(process = %name, "starting process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(result) = join_set.join_next().await {
            if let Some(err) = record_exit(result, &token) {
                first_error = Some(err);
            }

            if token.is_cancelled() {
                break;
            }
        }

        // Cancelled processes finish their current unit of work before closers run
        if !join_set.is_empty() {
            tracing::info!(
                remaining = join_set.len(),
                grace = ?self.shutdown_grace,
                "waiting for processes to stop"
            );

            let drained = tokio::time::timeout(self.shutdown_grace, async {
                while let Some(result) = join_set.join_next().await {
                    record_exit(result, &token);
                }
            })
            .await;

            if drained.is_err() {
                tracing::warn!(
                    remaining = join_set.len(),
                    "processes still running after shutdown grace, aborting"
                );
            }
        }
        join_set.shutdown().await;

        if !self.closers.is_empty() {
            tracing::info!("Running closers with timeout of {:?}", self.closer_timeout);

            match tokio::time::timeout(self.closer_timeout, Self::run_closers(self.closers)).await {
                Ok(()) => tracing::info!("All closers completed"),
                Err(_) => tracing::error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        first_error
    }

    /// Runs all closers concurrently.
    async fn run_closers(closers: Vec<Closer>) {
        let mut closer_set = JoinSet::new();

        for closer in closers {
            closer_set.spawn(async move { closer().await });
        }

        while let Some(result) = closer_set.join_next().await {
            match result {
                Ok(Ok(())) => {
                    tracing::debug!("Closer completed successfully");
                }
                Ok(Err(err)) => {
                    tracing::error!("Closer error: {:#}", err);
                }
                Err(err) => {
                    tracing::error!("Closer panicked: {}", err);
                }
            }
        }
    }
}

/// Log how a process ended. Returns the error that triggered shutdown, if this was it.
fn record_exit(
    result: Result<(String, anyhow::Result<()>), JoinError>,
    token: &CancellationToken,
) -> Option<anyhow::Error> {
    match result {
        Ok((name, Ok(()))) => {
            tracing::debug!(process = %name, "process completed successfully");
            None
        }
        Ok((name, Err(err))) if !token.is_cancelled() => {
            tracing::error!(process = %name, "process error: {:#}", err);
            token.cancel();
            Some(err)
        }
        Ok((name, Err(err))) => {
            tracing::warn!(process = %name, "process error during shutdown: {:#}", err);
            None
        }
        Err(err) => {
            tracing::error!("process panicked: {}", err);
            token.cancel();
            None
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                signal_token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
                token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up SIGTERM handler: {}", err);
            }
        }
    });
}

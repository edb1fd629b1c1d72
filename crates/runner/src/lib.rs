//! Process host for the CleanRoute services.
//!
//! Runs named long-lived processes side by side until one fails or the process receives
//! SIGINT/SIGTERM, then runs every closer under a shared timeout.
//!
//! # Example
//!
//! ```no_run
//! use cleanroute_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("heartbeat", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("alive");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Long-running process; must return once its token is cancelled
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxFuture + Send>;

/// Cleanup step run after every process has stopped
pub type Closer = Box<dyn FnOnce() -> BoxFuture + Send>;

/// How the processes stopped
#[derive(Debug)]
pub enum RunOutcome {
    /// Shutdown signal, external cancellation or every process finished
    Stopped,
    /// A process failed or panicked; carries its name and error
    Failed { process: String, error: anyhow::Error },
}

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Runner with no processes and a 10 second closer timeout
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Add a process; the name shows up in logs and in `RunOutcome::Failed`
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    /// Add a closer; closers run concurrently and a failing one does not stop the others
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token; cancelling it stops the runner
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until stopped, then exit the process with 0 or 1
    pub async fn run(self) {
        let token = self.cancellation_token.clone();
        spawn_signal_handlers(token);

        match self.execute().await {
            RunOutcome::Stopped => {
                info!("application exiting normally");
                std::process::exit(0);
            }
            RunOutcome::Failed { process, error } => {
                error!(process = %process, "application exiting with error: {:#}", error);
                std::process::exit(1);
            }
        }
    }

    /// Run processes and closers without installing signal handlers or exiting
    pub async fn execute(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            info!(process = %name, "starting process");
            join_set.spawn(async move { (name, process(process_token).await) });
        }

        let mut outcome = RunOutcome::Stopped;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                joined = join_set.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((name, Ok(())))) => {
                            debug!(process = %name, "process completed");
                        }
                        Some(Ok((name, Err(err)))) => {
                            error!(process = %name, "process error: {:#}", err);
                            outcome = RunOutcome::Failed { process: name, error: err };
                            token.cancel();
                            break;
                        }
                        Some(Err(err)) => {
                            error!("process panicked: {}", err);
                            outcome = RunOutcome::Failed {
                                process: "unknown".to_string(),
                                error: anyhow::anyhow!("process panicked: {}", err),
                            };
                            token.cancel();
                            break;
                        }
                    }
                }
            }
        }

        // Let processes observe the cancellation and return before running closers
        while let Some(joined) = join_set.join_next().await {
            if let Ok((name, Err(err))) = joined {
                debug!(process = %name, "process error during shutdown: {:#}", err);
            }
        }

        if !self.closers.is_empty() {
            info!("running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("all closers completed"),
                Err(_) => error!("closers timed out after {:?}", self.closer_timeout),
            }
        }

        outcome
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => error!("error setting up signal handler: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM signal");
                token.cancel();
            }
            Err(err) => error!("error setting up SIGTERM handler: {}", err),
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();

    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(err)) => error!("closer error: {:#}", err),
            Err(err) => error!("closer panicked: {}", err),
        }
    }
}

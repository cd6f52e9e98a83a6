//! Bounded-time process shutdown
//!
//! The [`ExitWatchdog`] turns any termination request (SIGINT, SIGTERM, or
//! the end of the stdio session) into one shutdown sequence:
//!
//! 1. arm a fallback timer that exits the process after the deadline,
//! 2. close every tracked instance, best effort,
//! 3. exit as soon as that pass completes.
//!
//! Exit therefore happens no later than the deadline, even if an instance
//! never finishes closing.

use crate::mcp::registry::SharedServerList;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound on total shutdown time after a termination request
pub const DEFAULT_EXIT_DEADLINE: Duration = Duration::from_secs(15);

/// What asked the process to terminate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StdinClosed,
    Interrupt,
    Terminate,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StdinClosed => f.write_str("stdin closed"),
            ExitReason::Interrupt => f.write_str("SIGINT"),
            ExitReason::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Terminates the process
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// [`ProcessExit`] that calls [`std::process::exit`]
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

pub struct ExitWatchdog {
    servers: SharedServerList,
    deadline: Duration,
    exit: Arc<dyn ProcessExit>,
    started: AtomicBool,
    done: CancellationToken,
}

impl ExitWatchdog {
    pub fn new(servers: SharedServerList) -> Self {
        Self::with_exit(servers, DEFAULT_EXIT_DEADLINE, Arc::new(StdProcessExit))
    }

    pub fn with_exit(
        servers: SharedServerList,
        deadline: Duration,
        exit: Arc<dyn ProcessExit>,
    ) -> Self {
        Self {
            servers,
            deadline,
            exit,
            started: AtomicBool::new(false),
            done: CancellationToken::new(),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn is_shutting_down(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Listens for SIGINT and SIGTERM for the rest of the process lifetime
    ///
    /// Every signal is routed to [`ExitWatchdog::shutdown`]; repeats are
    /// harmless.
    pub fn install(self: &Arc<Self>) -> JoinHandle<()> {
        let watchdog = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let reason = wait_for_signal().await;
                let watchdog = Arc::clone(&watchdog);
                tokio::spawn(async move { watchdog.shutdown(reason).await });
            }
        })
    }

    /// Runs the shutdown sequence once
    ///
    /// The first call arms the fallback timer, closes all instances and
    /// exits. Later calls do not close anything again; they wait for the
    /// first sequence to finish.
    pub async fn shutdown(&self, reason: ExitReason) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!(reason = %reason, "Shutdown already in progress");
            self.done.cancelled().await;
            return;
        }

        tracing::info!(reason = %reason, "Shutting down");

        let exit = Arc::clone(&self.exit);
        let deadline = self.deadline;
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(?deadline, "Instances did not close in time, forcing exit");
            exit.exit(0);
        });

        self.servers.close_all().await;
        self.done.cancel();

        tracing::info!("All instances closed, exiting");
        self.exit.exit(0);
    }
}

async fn wait_for_signal() -> ExitReason {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ExitReason::Interrupt,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGINT");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                ExitReason::Terminate
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ExitReason>();

    tokio::select! {
        reason = interrupt => reason,
        reason = terminate => reason,
    }
}

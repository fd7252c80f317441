//! Graceful shutdown coordinator

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shutdown signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Graceful,
    Immediate,
}

/// Shutdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

/// Broadcasts a stop signal to every long-running task and tracks how far
/// teardown has progressed
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// `timeout` bounds how long `drain` waits for a task to finish
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            timeout,
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Initiate graceful shutdown. Returns without waiting for subscribers.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if *state != ShutdownState::Running {
            warn!("Shutdown already in progress");
            return;
        }

        info!("Initiating graceful shutdown");
        *state = ShutdownState::ShuttingDown;
        drop(state);

        if self.shutdown_tx.send(ShutdownSignal::Graceful).is_err() {
            // Nobody subscribed yet; nothing to stop
            info!("No components registered for shutdown");
        }
    }

    /// Initiate immediate shutdown
    pub async fn shutdown_immediately(&self) {
        warn!("Initiating immediate shutdown");

        let mut state = self.state.write().await;
        *state = ShutdownState::Shutdown;
        drop(state);

        if let Err(e) = self.shutdown_tx.send(ShutdownSignal::Immediate) {
            error!("Failed to send immediate shutdown signal: {}", e);
        }
    }

    /// Wait up to the coordinator timeout for `task` to finish, aborting it
    /// otherwise, then mark shutdown complete
    pub async fn drain(&self, name: &str, task: JoinHandle<()>) {
        let abort = task.abort_handle();
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(())) => info!(component = name, "Component stopped"),
            Ok(Err(e)) => error!(component = name, error = %e, "Component task failed"),
            Err(_) => {
                warn!(component = name, timeout = ?self.timeout, "Component did not stop in time, aborting");
                abort.abort();
            }
        }

        *self.state.write().await = ShutdownState::Shutdown;
        info!("Shutdown complete");
    }

    /// Check if shutdown is in progress
    pub async fn is_shutting_down(&self) -> bool {
        let state = self.state.read().await;
        *state == ShutdownState::ShuttingDown || *state == ShutdownState::Shutdown
    }

    /// Get current state
    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }

    /// Wait for shutdown signal
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Install signal handlers for graceful shutdown
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        coordinator.shutdown().await;
    });
}

/// Install signal handlers for graceful shutdown (Windows)
#[cfg(windows)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        info!("Received Ctrl+C");
        coordinator.shutdown().await;
    });
}

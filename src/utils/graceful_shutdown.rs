use std::{future::Future, time::Duration};

use eyre::{Result, WrapErr};
use tokio::{signal, sync::watch, time::timeout};

/// Why the gateway is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Triggered from code, e.g. by an embedding application
    Requested,
}

/// Coordinates stopping the server: stop accepting on the first signal, then
/// give in-flight requests a bounded time to finish.
pub struct GracefulShutdown {
    reason_tx: watch::Sender<Option<ShutdownReason>>,
    /// Maximum time to wait for in-flight requests after the signal
    shutdown_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (reason_tx, _) = watch::channel(None);
        Self {
            reason_tx,
            shutdown_timeout,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason_tx.borrow().is_some()
    }

    /// Start shutting down. Only the first trigger counts.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        let first = self.reason_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        if first {
            tracing::info!(?reason, "Shutdown initiated");
        } else {
            tracing::warn!(?reason, "Shutdown already initiated, ignoring signal");
        }
    }

    /// Listen for SIGINT / SIGTERM and trigger shutdown on the first one.
    pub async fn run_signal_handler(&self) {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                self.trigger_shutdown(ShutdownReason::Interrupt);
            }
            _ = Self::wait_for_sigterm() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                self.trigger_shutdown(ShutdownReason::Terminate);
            }
        }
    }

    #[cfg(unix)]
    async fn wait_for_sigterm() {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_sigterm() {
        // On non-Unix systems, we only have Ctrl+C
        std::future::pending::<()>().await;
    }

    /// Resolve once shutdown has been triggered, immediately if it already was.
    pub async fn wait(&self) -> ShutdownReason {
        let mut receiver = self.reason_tx.subscribe();
        match receiver.wait_for(Option::is_some).await {
            Ok(reason) => reason.unwrap_or(ShutdownReason::Requested),
            Err(_) => ShutdownReason::Requested,
        }
    }

    /// Drive a server future that stops accepting on shutdown, and cut it off
    /// if draining takes longer than the configured timeout.
    pub async fn drain<F>(&self, server: F) -> Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => return result.wrap_err("Server error"),
            _ = self.wait() => {}
        }

        tracing::info!(
            timeout = ?self.shutdown_timeout,
            "Waiting for in-flight requests to finish"
        );
        match timeout(self.shutdown_timeout, server).await {
            Ok(result) => {
                tracing::info!("All in-flight requests finished");
                result.wrap_err("Server error during shutdown")
            }
            Err(_) => {
                tracing::warn!(
                    "Shutdown timeout exceeded ({:?}), dropping remaining connections",
                    self.shutdown_timeout
                );
                Ok(())
            }
        }
    }
}

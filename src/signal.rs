//! Signal handling for graceful shutdown.
//!
//! [`ShutdownGuard`] turns SIGINT/SIGTERM into a cancelled [`ShutdownToken`];
//! background tasks hold clones of the token and either poll it or await
//! [`ShutdownToken::cancelled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::info;

/// Global flag indicating whether a shutdown has been requested.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if shutdown has been requested.
#[inline]
pub fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Request a shutdown (can be called from signal handlers or tests).
pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

/// Reset shutdown flag (mainly for testing).
#[cfg(test)]
pub fn reset_shutdown() {
    SHUTDOWN_REQUESTED.store(false, Ordering::Relaxed);
}

/// A guard that manages signal handlers for graceful shutdown.
/// When created, it spawns a task that listens for SIGINT and SIGTERM and
/// cancels its token when one arrives.
pub struct ShutdownGuard {
    token: ShutdownToken,
}

impl ShutdownGuard {
    /// Create a new shutdown guard and start listening for signals.
    ///
    /// If signal handlers cannot be registered (e.g., in restricted environments),
    /// the guard is still created but signal handling will be disabled.
    pub fn new() -> Self {
        let token = ShutdownToken::new();
        let on_signal = token.clone();

        tokio::spawn(async move {
            // Try to register signal handlers - may fail in containers or restricted envs
            let sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to register SIGINT handler: {}", e);
                    None
                }
            };

            let sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Failed to register SIGTERM handler: {}", e);
                    None
                }
            };

            let name = match (sigint, sigterm) {
                (Some(mut int), Some(mut term)) => {
                    tokio::select! {
                        _ = int.recv() => "SIGINT",
                        _ = term.recv() => "SIGTERM",
                    }
                }
                (Some(mut int), None) => {
                    int.recv().await;
                    "SIGINT"
                }
                (None, Some(mut term)) => {
                    term.recv().await;
                    "SIGTERM"
                }
                (None, None) => {
                    tracing::warn!("No signal handlers registered - graceful shutdown disabled");
                    return;
                }
            };

            info!("Received {}, initiating graceful shutdown...", name);
            request_shutdown();
            on_signal.cancel();
        });

        Self { token }
    }

    /// Token cancelled when a signal arrives.
    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A token that can be shared across tasks to check for shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    state: Arc<TokenState>,
}

impl ShutdownToken {
    /// Create a new shutdown token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst) || is_shutdown_requested()
    }

    /// Request cancellation on this token and wake every task awaiting it.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a cancel in between is not missed
            notified.as_mut().enable();
            if self.state.cancelled.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C) that cancel a
//! [`CancellationToken`]. The serve loop watches the token, and so does the
//! upgrade command, which cancels it itself once new code is pulled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the process is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    /// New code was pulled; the binary should re-exec itself.
    Upgrade,
}

/// Shared stop switch for the serve loop.
///
/// Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    token: CancellationToken,
    upgrade: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            upgrade: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Stops the process so it can restart on new code.
    pub fn request_upgrade(&self) {
        info!("upgrade requested, initiating shutdown");
        self.upgrade.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn stopped(&self) -> ShutdownReason {
        self.token.cancelled().await;
        self.reason()
    }

    pub fn reason(&self) -> ShutdownReason {
        if self.upgrade.load(Ordering::SeqCst) {
            ShutdownReason::Upgrade
        } else {
            ShutdownReason::Signal
        }
    }
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a token that is cancelled when either signal arrives. The handler
/// task also exits if the token is cancelled by someone else.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let watcher = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => watcher.cancel(),
            _ = watcher.cancelled() => {}
        }
        debug!("shutdown signal handler completed");
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl+C only");
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT (Ctrl+C), initiating shutdown");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, initiating shutdown"),
        Err(e) => {
            // Without a handler, only an explicit cancel can stop the process.
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Stop requests for the bridge process.
//!
//! A [`ShutdownCoordinator`] holds a single latch. SIGTERM, SIGINT, Ctrl+C
//! and [`ShutdownCoordinator::initiate_shutdown`] all close it, and every
//! [`ShutdownSignal`] handed out before or after resolves once it is closed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Shared stop latch.
///
/// ```ignore
/// let shutdown = ShutdownCoordinator::new();
/// tokio::spawn({
///     let shutdown = shutdown.clone();
///     async move { shutdown.wait_for_os_signal().await }
/// });
/// shutdown.shutdown_signal().wait().await;
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    latch: Arc<watch::Sender<bool>>,
}

impl ShutdownCoordinator {
    /// Creates an open latch.
    pub fn new() -> Self {
        let (latch, _) = watch::channel(false);
        Self { latch: Arc::new(latch) }
    }

    /// Raw receiver; its value turns `true` on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.latch.subscribe()
    }

    /// Future-like handle for the stop request.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.subscribe(),
        }
    }

    /// Closes the latch. Later calls do nothing.
    pub fn initiate_shutdown(&self) {
        let closed_now = self.latch.send_if_modified(|stopped| !std::mem::replace(stopped, true));
        if closed_now {
            info!("Shutdown requested");
        }
    }

    /// Whether the latch is closed.
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.latch.borrow()
    }

    /// Closes the latch on the first OS stop signal. Returns without waiting
    /// further once the latch is closed some other way.
    pub async fn wait_for_os_signal(&self) {
        let signal = self.shutdown_signal();
        tokio::select! {
            () = os_signal() => self.initiate_shutdown(),
            () = signal.wait() => {}
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let term = signal(SignalKind::terminate());
    let int = signal(SignalKind::interrupt());
    match (term, int) {
        (Ok(mut term), Ok(mut int)) => {
            let name = tokio::select! {
                _ = term.recv() => "SIGTERM",
                _ = int.recv() => "SIGINT",
            };
            info!(signal = name, "Stop signal received");
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Unix signal handlers unavailable, using Ctrl+C only");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
    info!(signal = "ctrl-c", "Stop signal received");
}

// =============================================================================
// ShutdownSignal
// =============================================================================

/// Resolves once the latch is closed.
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the latch. Returns immediately when already closed.
    pub async fn wait(mut self) {
        // An error means every coordinator is gone; nobody can stop us then,
        // which only happens at process teardown.
        let _ = self.receiver.wait_for(|stopped| *stopped).await;
    }
}

// =============================================================================
// ShutdownGuard
// =============================================================================

/// Closes the latch when dropped, unless [`disarm`](Self::disarm)ed.
pub struct ShutdownGuard {
    coordinator: Option<ShutdownCoordinator>,
}

impl ShutdownGuard {
    /// Arms a guard over `coordinator`.
    pub fn new(coordinator: ShutdownCoordinator) -> Self {
        Self {
            coordinator: Some(coordinator),
        }
    }

    /// Drops the guard without closing the latch.
    pub fn disarm(mut self) {
        self.coordinator = None;
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            if !coordinator.is_shutdown_initiated() {
                warn!("Run ended without a stop request, shutting down");
            }
            coordinator.initiate_shutdown();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

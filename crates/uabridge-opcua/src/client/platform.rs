// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reference-counted handle for process-wide SDK state.
//!
//! A [`Platform`] is shared by every client in a process. The first
//! [`PlatformGuard`] initializes the platform, dropping the last one tears
//! it down. Clients hold a guard for their whole lifetime.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

type Hook = Box<dyn Fn() + Send + Sync>;

struct PlatformInner {
    users: Mutex<usize>,
    on_initialize: Option<Hook>,
    on_cleanup: Option<Hook>,
}

/// Shared platform handle.
#[derive(Clone)]
pub struct Platform {
    inner: Arc<PlatformInner>,
}

impl Platform {
    /// Creates a platform without hooks.
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Creates a platform running `initialize` on the first acquire and
    /// `cleanup` on the last release.
    pub fn with_hooks<I, C>(initialize: I, cleanup: C) -> Self
    where
        I: Fn() + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Self::build(Some(Box::new(initialize)), Some(Box::new(cleanup)))
    }

    fn build(on_initialize: Option<Hook>, on_cleanup: Option<Hook>) -> Self {
        Self {
            inner: Arc::new(PlatformInner {
                users: Mutex::new(0),
                on_initialize,
                on_cleanup,
            }),
        }
    }

    /// Registers a user, initializing the platform if it is the first.
    pub fn acquire(&self) -> PlatformGuard {
        let mut users = self.inner.users.lock();
        if *users == 0 {
            info!("Initializing OPC UA platform");
            if let Some(hook) = &self.inner.on_initialize {
                hook();
            }
        }
        *users += 1;
        debug!(users = *users, "Platform acquired");

        PlatformGuard {
            platform: self.clone(),
        }
    }

    /// Returns the number of live guards.
    pub fn users(&self) -> usize {
        *self.inner.users.lock()
    }

    fn release(&self) {
        let mut users = self.inner.users.lock();
        *users = users.saturating_sub(1);
        debug!(users = *users, "Platform released");
        if *users == 0 {
            info!("Cleaning up OPC UA platform");
            if let Some(hook) = &self.inner.on_cleanup {
                hook();
            }
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").field("users", &self.users()).finish()
    }
}

/// Keeps the platform initialized while alive.
#[derive(Debug)]
pub struct PlatformGuard {
    platform: Platform,
}

impl PlatformGuard {
    /// Returns the platform this guard belongs to.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }
}

impl Drop for PlatformGuard {
    fn drop(&mut self) {
        self.platform.release();
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Library half of the `uabridge` executable.
//!
//! `main` parses a [`Cli`], installs logging and hands off to
//! [`commands::execute`]. The `run` command drives a [`BridgeRuntime`],
//! which owns one bridge client until the [`ShutdownCoordinator`] latch
//! closes.
//!
//! ```bash
//! uabridge -c /etc/uabridge/uabridge.yaml          # run (default)
//! uabridge validate --strict --show-config
//! uabridge --log-format json run --format json
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{BridgeRuntime, RunOptions};
pub use shutdown::{ShutdownCoordinator, ShutdownGuard, ShutdownSignal};

/// Version of this binary crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

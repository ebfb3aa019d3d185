// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `uabridge run`.

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::{BinError, BinResult};
use crate::runtime::{BridgeRuntime, RunOptions};
use crate::shutdown::ShutdownCoordinator;

/// Loads the configuration and runs the bridge until a stop signal.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    info!(config = %cli.config.display(), "Starting uabridge v{}", crate::VERSION);

    let config = uabridge_opcua::load_config(&cli.config)
        .map_err(|e| BinError::from(e).with_context(format!("loading {}", cli.config.display())))?;

    let shutdown = ShutdownCoordinator::new();
    let signals = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { shutdown.wait_for_os_signal().await }
    });

    let options = RunOptions {
        format: args.format,
        connect_notice: args.connect_notice,
        print_type_maps: !args.no_print,
    };
    let result = BridgeRuntime::new(config, shutdown.clone())
        .with_options(options)
        .run()
        .await;

    shutdown.initiate_shutdown();
    let _ = signals.await;
    result
}

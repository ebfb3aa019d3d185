// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bridge runtime orchestration.
//!
//! Starts a [`BridgeClient`], reports the flattened type model once the
//! first connect completes and keeps the client running until shutdown is
//! signalled. Reconnects are handled by the client's own lifecycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use uabridge_opcua::{BridgeClient, BridgeConfig, LifecycleState, Platform, SessionGateway, TypeMap};

use crate::cli::OutputFormat;
use crate::error::BinResult;
use crate::shutdown::{ShutdownCoordinator, ShutdownGuard};

// =============================================================================
// RunOptions
// =============================================================================

/// Presentation options of a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Format of the type-map report.
    pub format: OutputFormat,
    /// Interval between notices while the first connect is pending.
    pub connect_notice: Duration,
    /// Whether the type maps are printed after the first connect.
    pub print_type_maps: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            connect_notice: Duration::from_secs(30),
            print_type_maps: true,
        }
    }
}

// =============================================================================
// BridgeRuntime
// =============================================================================

/// Runs one bridge client until shutdown.
pub struct BridgeRuntime {
    config: BridgeConfig,
    shutdown: ShutdownCoordinator,
    options: RunOptions,
}

impl BridgeRuntime {
    /// Creates a runtime for `config`.
    pub fn new(config: BridgeConfig, shutdown: ShutdownCoordinator) -> Self {
        Self {
            config,
            shutdown,
            options: RunOptions::default(),
        }
    }

    /// Replaces the run options.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs against the `opcua`-backed gateway.
    #[cfg(feature = "real-gateway")]
    pub async fn run(self) -> BinResult<()> {
        let gateway = Arc::new(uabridge_opcua::OpcUaGateway::new(&self.config.opcua));
        self.run_with_gateway(gateway).await
    }

    /// Fails: no OPC UA stack was compiled in.
    #[cfg(not(feature = "real-gateway"))]
    pub async fn run(self) -> BinResult<()> {
        Err(crate::error::BinError::init(
            "built without the `real-gateway` feature; rebuild with `--features real-gateway`",
        ))
    }

    /// Runs against `gateway` until shutdown is signalled.
    pub async fn run_with_gateway(self, gateway: Arc<dyn SessionGateway>) -> BinResult<()> {
        let Self {
            config,
            shutdown,
            options,
        } = self;

        // Ends the signal listener however this run exits.
        let _guard = ShutdownGuard::new(shutdown.clone());

        info!(
            endpoint = %config.opcua.endpoint,
            security_mode = %config.opcua.security_mode,
            namespaces = config.object_type_namespaces.len(),
            "Starting bridge"
        );

        let platform = Platform::new();
        let client = BridgeClient::new(config, gateway, &platform)?;
        client.start();

        let stop = shutdown.shutdown_signal().wait();
        tokio::pin!(stop);

        let mut stopped = false;
        let connected = tokio::select! {
            () = wait_for_first_connect(&client, options.connect_notice) => true,
            () = &mut stop => {
                stopped = true;
                false
            }
        };

        if connected && options.print_type_maps {
            if let Err(e) = report_type_maps(&client, options.format).await {
                warn!(error = %e, "Failed to report type maps");
            }
        }

        if !stopped {
            stop.await;
        }

        info!("Stopping bridge");
        client.shutdown().await?;
        info!("Bridge stopped");
        Ok(())
    }
}

async fn wait_for_first_connect(client: &BridgeClient, notice: Duration) {
    while !client.wait_for_state(LifecycleState::Connected, notice).await {
        info!(state = %client.state(), "Still waiting for the first connect");
    }
}

// =============================================================================
// Reporting
// =============================================================================

async fn report_type_maps(client: &BridgeClient, format: OutputFormat) -> BinResult<()> {
    let maps = client.type_maps().await?;
    let missing = client.missing_namespaces().await?;

    let rendered = match format {
        OutputFormat::Text => render_text(&maps, &missing),
        OutputFormat::Json => render_json(&maps, &missing)?,
    };
    println!("{}", rendered);
    Ok(())
}

/// Renders the type maps as an indented listing.
pub fn render_text(maps: &BTreeMap<String, TypeMap>, missing: &[String]) -> String {
    let mut lines = Vec::new();

    for (uri, map) in maps {
        lines.push(format!("Namespace {} ({} types)", uri, map.len()));
        for ty in map.iter() {
            lines.push(format!("  {} [{}]", ty.name, ty.lineage.join(" > ")));
            for attribute in &ty.attributes {
                lines.push(format!(
                    "    - {} ({}, from {})",
                    attribute.browse_name.name, attribute.metadata.node_class, attribute.declared_by
                ));
            }
        }
    }

    for uri in missing {
        lines.push(format!("Namespace {} missing on server", uri));
    }

    lines.join("\n")
}

/// Renders the type maps as pretty JSON.
pub fn render_json(maps: &BTreeMap<String, TypeMap>, missing: &[String]) -> BinResult<String> {
    let report = serde_json::json!({
        "type_maps": maps,
        "missing_namespaces": missing,
    });
    Ok(serde_json::to_string_pretty(&report)?)
}

// =============================================================================
// Tests
// =============================================================================

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application-facing OPC UA client.
//!
//! [`BridgeClient`] owns the connection lifecycle and answers instance-level
//! queries against the type model built on connect. Every query takes and
//! returns portable identifiers; session-local node ids never leave this
//! module.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = BridgeClient::new(config, gateway, &platform)?;
//! client.start();
//! client.wait_for_state(LifecycleState::Connected, Duration::from_secs(10)).await;
//!
//! let machines = client
//!     .browse(&objects_folder, &PortableNodeId::null(), &machine_type)
//!     .await?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::browse::{browse_all, reference_types, BrowseContext, BrowseResultProjector};
use crate::config::BridgeConfig;
use crate::error::{OpcUaError, OpcUaResult};
use crate::supertype::SupertypeResolver;
use crate::type_map::TypeMap;
use crate::types::{
    AttributeId, BrowseResult, PortableNodeId, PortableQualifiedName, TimestampsToReturn,
};

use super::conversion::data_value_to_json;
use super::gateway::{BrowsePath, ReadValueId, RelativePathElement, SessionGateway};
use super::lifecycle::{ClientCore, LifecycleState, LifecycleTasks};
use super::platform::{Platform, PlatformGuard};
use super::subscription::{ValueCallback, ValueSubscriptionHandle};

// =============================================================================
// BridgeClient
// =============================================================================

/// OPC UA client with portable identities and a discovered type model.
pub struct BridgeClient {
    core: Arc<ClientCore>,
    tasks: Mutex<Option<LifecycleTasks>>,
    platform: Mutex<Option<PlatformGuard>>,
}

impl BridgeClient {
    /// Creates a client. Nothing connects until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// `Configuration` if `config` does not validate.
    pub fn new(
        config: BridgeConfig,
        gateway: Arc<dyn SessionGateway>,
        platform: &Platform,
    ) -> OpcUaResult<Self> {
        config.validate()?;
        let guard = platform.acquire();
        info!(
            endpoint = %config.opcua.endpoint,
            security_mode = %config.opcua.security_mode,
            namespaces = config.object_type_namespaces.len(),
            "OPC UA client created"
        );

        Ok(Self {
            core: Arc::new(ClientCore::new(config, gateway)),
            tasks: Mutex::new(None),
            platform: Mutex::new(Some(guard)),
        })
    }

    /// Starts the connection loop. Later calls have no effect.
    pub fn start(&self) {
        match self.core.spawn() {
            Some(tasks) => *self.tasks.lock() = Some(tasks),
            None => debug!("Connection loop already started"),
        }
    }

    /// Runs one connection attempt on the caller's task.
    ///
    /// # Errors
    ///
    /// Discovery, endpoint selection, session and rebuild failures.
    pub async fn connect(&self) -> OpcUaResult<()> {
        self.core.connect().await
    }

    /// Stops the connection loop, waits for it to exit, closes the session
    /// and releases the platform.
    pub async fn shutdown(&self) -> OpcUaResult<()> {
        info!(endpoint = %self.core.config.opcua.endpoint, "Shutting down OPC UA client");
        self.core.stop_trying();

        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.join().await;
        }

        let closed = self.core.close_session().await;
        if let Err(e) = &closed {
            warn!(error = %e, "Failed to close session during shutdown");
        }

        self.platform.lock().take();
        closed
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Returns the lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.core.state()
    }

    /// Returns `true` while connected.
    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.core.config
    }

    /// Waits until the state equals `target`.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_state(&self, target: LifecycleState, timeout: Duration) -> bool {
        let mut rx = self.core.watch_state();
        tokio::time::timeout(timeout, rx.wait_for(|state| *state == target))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    // =========================================================================
    // Model
    // =========================================================================

    /// Returns the flattened types of `namespace_uri`.
    pub async fn type_map(&self, namespace_uri: &str) -> OpcUaResult<Option<TypeMap>> {
        let model = self.core.session_model().await?;
        Ok(model.type_map(namespace_uri).cloned())
    }

    /// Returns every flattened namespace.
    pub async fn type_maps(&self) -> OpcUaResult<BTreeMap<String, TypeMap>> {
        let model = self.core.session_model().await?;
        Ok(model.type_maps().clone())
    }

    /// Returns the namespaces of interest found on the server.
    pub async fn found_namespaces(&self) -> OpcUaResult<Vec<(String, u16)>> {
        let model = self.core.session_model().await?;
        Ok(model.found_namespaces().to_vec())
    }

    /// Returns the namespaces of interest the server lacks.
    pub async fn missing_namespaces(&self) -> OpcUaResult<Vec<String>> {
        let model = self.core.session_model().await?;
        Ok(model.missing_namespaces().to_vec())
    }

    /// Returns the number of completed connects.
    pub async fn generation(&self) -> OpcUaResult<u64> {
        let model = self.core.session_model().await?;
        Ok(model.generation())
    }

    /// Returns `true` if `machine` passes the configured machine filter.
    ///
    /// An empty filter passes everything.
    pub fn is_machine_allowed(&self, machine: &PortableNodeId) -> bool {
        let filter = &self.core.config.machines_filter;
        filter.is_empty() || filter.contains(machine)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Lists the children of `start` whose type conforms to `type_definition`.
    ///
    /// A null `reference_type` follows every forward reference.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a null `start` or `type_definition`
    /// - `NotConnected` while disconnected
    /// - `InvalidNodeClass` if `type_definition` is not an object or variable type
    /// - `ProtocolStatus` and `SemanticMismatch` from the server
    pub async fn browse(
        &self,
        start: &PortableNodeId,
        reference_type: &PortableNodeId,
        type_definition: &PortableNodeId,
    ) -> OpcUaResult<Vec<BrowseResult>> {
        if start.is_null() {
            error!("Browse called with null start node");
            return Err(OpcUaError::invalid_argument("start", "must not be null"));
        }
        if type_definition.is_null() {
            error!(start = %start, "Browse called with null type definition");
            return Err(OpcUaError::invalid_argument("type_definition", "must not be null"));
        }

        let model = self.core.session_model().await?;
        let translator = model.translator();
        let start_node = translator.to_session(start)?;
        let type_node = translator.to_session(type_definition)?;
        let reference_node = if reference_type.is_null() {
            None
        } else {
            Some(translator.to_session(reference_type)?)
        };

        let browse = self.core.config.browse;
        let gateway = &*self.core.gateway;
        let resolver = SupertypeResolver::new(gateway, model.supertypes(), browse.max_browse_pages);
        let projector = BrowseResultProjector::new(&resolver, translator, browse.max_supertype_depth);

        let mask = projector.instance_mask(&type_node).await?;
        let context = BrowseContext::instances(reference_node, mask);
        let references = browse_all(gateway, &start_node, &context, browse.max_browse_pages)
            .await
            .inspect_err(|e| error!(start = %start, error = %e, "Bad return from browse"))?;

        let results = projector.project(&references, &type_node).await?;
        debug!(
            start = %start,
            type_definition = %type_definition,
            references = references.len(),
            kept = results.len(),
            "Browse complete"
        );
        Ok(results)
    }

    /// Resolves the child of `start` named `browse_name`.
    ///
    /// # Errors
    ///
    /// - `NotConnected` while disconnected
    /// - `InvalidArgument` for a null `start` or `browse_name`
    /// - `ProtocolStatus` for a bad service or per-path status
    /// - `SemanticMismatch` unless exactly one result with one target
    pub async fn translate_browse_path_to_node_id(
        &self,
        start: &PortableNodeId,
        browse_name: &PortableQualifiedName,
    ) -> OpcUaResult<PortableNodeId> {
        let model = self.core.session_model().await?;

        if browse_name.is_null() {
            error!(start = %start, "Translate called with null browse name");
            return Err(OpcUaError::invalid_argument("browse_name", "must not be null"));
        }
        if start.is_null() {
            error!(browse_name = %browse_name, "Translate called with null start node");
            return Err(OpcUaError::invalid_argument("start", "must not be null"));
        }

        let translator = model.translator();
        let path = BrowsePath {
            starting_node: translator.to_session(start)?,
            relative_path: vec![RelativePathElement {
                reference_type_id: reference_types::hierarchical_references(),
                is_inverse: false,
                include_subtypes: true,
                target_name: translator.name_to_session(browse_name)?,
            }],
        };

        let results = self
            .core
            .gateway
            .translate_browse_paths(std::slice::from_ref(&path))
            .await
            .inspect_err(|e| {
                error!(start = %start, browse_name = %browse_name, error = %e, "TranslateBrowsePathToNodeId failed")
            })?;

        let [result] = results.as_slice() else {
            error!(results = results.len(), "BrowseResult length mismatch");
            return Err(OpcUaError::semantic_mismatch("BrowseResult length mismatch."));
        };

        if result.status.is_bad() {
            error!(
                start = %start,
                browse_name = %browse_name,
                status = %result.status,
                "Bad status for translated browse path"
            );
            return Err(OpcUaError::protocol_status("TranslateBrowsePathsToNodeIds", result.status));
        }

        let [target] = result.targets.as_slice() else {
            error!(targets = result.targets.len(), "Number of targets mismatch");
            return Err(OpcUaError::semantic_mismatch("Number of targets mismatch."));
        };

        translator.to_portable(&target.target_id)
    }

    /// Reads the Value attribute of `nodes` and converts each to JSON.
    ///
    /// Items with a bad status convert to `null`.
    ///
    /// # Errors
    ///
    /// `NotConnected`, namespace errors, a bad service result, or a result
    /// count that differs from the request.
    pub async fn read_values(&self, nodes: &[PortableNodeId]) -> OpcUaResult<Vec<Value>> {
        let model = self.core.session_model().await?;
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let translator = model.translator();
        let request = nodes
            .iter()
            .map(|node| Ok(ReadValueId::new(translator.to_session(node)?, AttributeId::Value)))
            .collect::<OpcUaResult<Vec<_>>>()?;

        let values = self
            .core
            .gateway
            .read(&request, TimestampsToReturn::Neither)
            .await
            .inspect_err(|e| error!(nodes = nodes.len(), error = %e, "Bad return from read"))?;

        if values.len() != request.len() {
            error!(requested = request.len(), returned = values.len(), "Read result length mismatch");
            return Err(OpcUaError::semantic_mismatch(format!(
                "Length mismatch: requested {} values, got {}",
                request.len(),
                values.len()
            )));
        }

        Ok(values.iter().map(data_value_to_json).collect())
    }

    /// Subscribes to value changes of `node`.
    ///
    /// The subscription survives reconnects. While disconnected it is
    /// registered and the monitored item is created on the next connect.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a null node; monitored item errors while
    /// connected, in which case nothing stays registered.
    pub async fn subscribe<F>(&self, node: &PortableNodeId, on_new_value: F) -> OpcUaResult<ValueSubscriptionHandle>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if node.is_null() {
            return Err(OpcUaError::invalid_argument("node_id", "must not be null"));
        }

        let callback: ValueCallback = Arc::new(on_new_value);
        let model = self.core.model.read().await;
        let entry = self.core.subscriptions.register(node.clone(), callback);

        if self.core.is_connected() {
            if let Some(subscription_id) = model.subscription_id() {
                if let Err(e) = self.core.create_monitored_item(&model, subscription_id, &entry).await {
                    error!(node_id = %node, error = %e, "Failed to create monitored item");
                    self.core.subscriptions.remove(entry.id);
                    return Err(e);
                }
            }
        } else {
            debug!(node_id = %node, "Not connected, monitored item deferred to next connect");
        }

        Ok(ValueSubscriptionHandle::new(entry.id, node.clone(), Arc::downgrade(&self.core)))
    }

    /// Returns the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.core.subscriptions.len()
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.core.stop_trying();
    }
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("core", &self.core)
            .field("started", &self.tasks.lock().is_some())
            .finish()
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection lifecycle.
//!
//! # State Machine
//!
//! ```text
//!                 retry loop (keep_trying)
//!  ┌──────────────┐ ───────────────▶ ┌──────────────┐
//!  │ Disconnected │                  │  Connecting  │
//!  └──────────────┘ ◀─────────────── └──────┬───────┘
//!         ▲          discovery / endpoint   │ session + entry actions
//!         │          / session failure      ▼
//!         │                          ┌──────────────┐
//!         └──────────────────────────│  Connected   │
//!            status Disconnected     └──────────────┘
//! ```
//!
//! # Entry Actions
//!
//! Entering `Connected` runs, under the session model write lock:
//!
//! 1. namespace cache rebuild from the server's namespace table
//! 2. supertype cache clear
//! 3. type tree build from the configured root
//! 4. type map flatten per found namespace
//! 5. data-change subscription creation and monitored item re-creation
//!
//! Queries take the read lock, so no query ever observes a half-rebuilt
//! model or one from a previous session. A failing entry action counts as
//! a failed connect: the session is closed and the loop retries.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex as AsyncMutex, Notify, RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::error::{ConnectionError, OpcUaError, OpcUaErrorContext, OpcUaResult};
use crate::namespace::NamespaceIndexCache;
use crate::supertype::SupertypeCache;
use crate::translator::NodeIdentityTranslator;
use crate::type_map::{TypeMap, TypeMapFlattener};
use crate::type_tree::{TreeLimits, TypeTree, TypeTreeBuilder};
use crate::types::SecurityMode;

use super::gateway::{
    ConnectionStatus, EndpointDescription, IdentityToken, SessionGateway, StatusReceiver,
    StatusSender,
};
use super::subscription::{MonitoredItemRef, SubscriptionEntry, SubscriptionRegistry};

// =============================================================================
// LifecycleState
// =============================================================================

/// Connection state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No session.
    #[default]
    Disconnected,

    /// Discovery and session creation in progress.
    Connecting,

    /// Session established and model rebuilt.
    Connected,
}

impl LifecycleState {
    /// Returns `true` if queries may run.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Returns the first endpoint offering `mode`.
pub fn select_endpoint(
    endpoints: &[EndpointDescription],
    mode: SecurityMode,
) -> Option<&EndpointDescription> {
    endpoints.iter().find(|e| e.security_mode == mode)
}

// =============================================================================
// SessionModel
// =============================================================================

/// Everything derived from the current session.
#[derive(Debug, Default)]
pub struct SessionModel {
    namespaces: NamespaceIndexCache,
    supertypes: SupertypeCache,
    type_tree: TypeTree,
    type_maps: BTreeMap<String, TypeMap>,
    found: Vec<(String, u16)>,
    missing: Vec<String>,
    subscription_id: Option<u32>,
    generation: u64,
}

impl SessionModel {
    /// Returns a translator over the namespace cache.
    pub fn translator(&self) -> NodeIdentityTranslator<'_> {
        NodeIdentityTranslator::new(&self.namespaces)
    }

    /// Returns the namespace cache.
    pub fn namespaces(&self) -> &NamespaceIndexCache {
        &self.namespaces
    }

    /// Returns the supertype cache.
    pub fn supertypes(&self) -> &SupertypeCache {
        &self.supertypes
    }

    /// Returns the discovered type tree.
    pub fn type_tree(&self) -> &TypeTree {
        &self.type_tree
    }

    /// Returns the flattened types of `namespace_uri`.
    pub fn type_map(&self, namespace_uri: &str) -> Option<&TypeMap> {
        self.type_maps.get(namespace_uri)
    }

    /// Returns every flattened namespace.
    pub fn type_maps(&self) -> &BTreeMap<String, TypeMap> {
        &self.type_maps
    }

    /// Returns the namespaces of interest found, with their indices.
    pub fn found_namespaces(&self) -> &[(String, u16)] {
        &self.found
    }

    /// Returns the namespaces of interest the server lacks.
    pub fn missing_namespaces(&self) -> &[String] {
        &self.missing
    }

    /// Returns the number of completed connects.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn subscription_id(&self) -> Option<u32> {
        self.subscription_id
    }
}

// =============================================================================
// ClientCore
// =============================================================================

/// Shared state of one client, owned by its tasks and handles.
pub(crate) struct ClientCore {
    pub(crate) gateway: Arc<dyn SessionGateway>,
    pub(crate) config: BridgeConfig,
    pub(crate) model: RwLock<SessionModel>,
    pub(crate) subscriptions: SubscriptionRegistry,
    state: watch::Sender<LifecycleState>,
    keep_trying: AtomicBool,
    wake: Notify,
    connect_lock: AsyncMutex<()>,
    status_tx: StatusSender,
    status_rx: Mutex<Option<StatusReceiver>>,
}

impl ClientCore {
    pub(crate) fn new(config: BridgeConfig, gateway: Arc<dyn SessionGateway>) -> Self {
        let (status_tx, status_rx) = tokio::sync::mpsc::unbounded_channel();
        let (state, _) = watch::channel(LifecycleState::Disconnected);
        Self {
            gateway,
            config,
            model: RwLock::new(SessionModel::default()),
            subscriptions: SubscriptionRegistry::new(),
            state,
            keep_trying: AtomicBool::new(false),
            wake: Notify::new(),
            connect_lock: AsyncMutex::new(()),
            status_tx,
            status_rx: Mutex::new(Some(status_rx)),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, new_state: LifecycleState) {
        self.state.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            info!(old_state = %state, new_state = %new_state, "Connection state changed");
            *state = new_state;
            true
        });
    }

    /// Acquires the model for a query.
    ///
    /// # Errors
    ///
    /// `NotConnected` unless the lifecycle is `Connected` and the gateway
    /// still holds a session.
    pub(crate) async fn session_model(&self) -> OpcUaResult<RwLockReadGuard<'_, SessionModel>> {
        let model = self.model.read().await;
        if !self.is_connected() || !self.gateway.is_session_connected() {
            return Err(OpcUaError::not_connected());
        }
        Ok(model)
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Runs one connection attempt.
    ///
    /// Returns `Ok` immediately if already connected.
    pub(crate) async fn connect(&self) -> OpcUaResult<()> {
        let _attempt = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        self.set_state(LifecycleState::Connecting);
        if let Err(e) = self.establish_session().await {
            self.set_state(LifecycleState::Disconnected);
            return Err(e);
        }

        self.enter_connected().await
    }

    async fn establish_session(&self) -> OpcUaResult<()> {
        let opcua = &self.config.opcua;
        let url = opcua.endpoint.as_str();

        // A status event can mark us disconnected while the gateway still
        // holds the old session.
        if self.gateway.is_session_connected() {
            debug!(endpoint = %url, "Closing previous session before reconnecting");
            if let Err(e) = self.gateway.disconnect_session().await {
                warn!(endpoint = %url, error = %e, "Failed to close previous session");
            }
        }

        let endpoints = self
            .gateway
            .discover_endpoints(url)
            .await
            .with_endpoint(url)
            .map_err(|e| ConnectionError::discovery_failed(url, e.to_string()))?;
        debug!(endpoint = %url, endpoints = endpoints.len(), "Endpoints discovered");

        let Some(endpoint) = select_endpoint(&endpoints, opcua.security_mode) else {
            warn!(
                endpoint = %url,
                security_mode = %opcua.security_mode,
                offered = endpoints.len(),
                "No endpoint offers the desired security mode"
            );
            return Err(ConnectionError::no_matching_endpoint(url, opcua.security_mode).into());
        };

        let identity = IdentityToken::from_credentials(opcua.username.as_deref(), opcua.password.as_deref());
        info!(
            endpoint = %endpoint.endpoint_url,
            security_mode = %endpoint.security_mode,
            security_policy = %endpoint.security_policy_uri,
            identity = ?identity,
            "Connecting session"
        );

        self.gateway
            .connect_session(endpoint, &opcua.connect_info(), &identity, self.status_tx.clone())
            .await
            .map_err(|e| ConnectionError::session_failed(url, e.to_string()).into())
    }

    /// Runs the entry actions, closing the session if any fails.
    async fn enter_connected(&self) -> OpcUaResult<()> {
        match self.rebuild_model().await {
            Ok(()) => Ok(()),
            Err(e) => {
                e.log("Connected entry actions failed");
                if let Err(close) = self.gateway.disconnect_session().await {
                    warn!(error = %close, "Failed to close session after failed entry actions");
                }
                self.subscriptions.reset_session_state();
                self.set_state(LifecycleState::Disconnected);
                Err(e)
            }
        }
    }

    async fn rebuild_model(&self) -> OpcUaResult<()> {
        let mut guard = self.model.write().await;
        let model = &mut *guard;

        let table = self.gateway.namespace_table().await?;
        let rebuild = model.namespaces.rebuild(&table, &self.config.object_type_namespaces);
        model.supertypes.clear();
        self.subscriptions.reset_session_state();

        let settings = &self.config.type_tree;
        let tree = if rebuild.found.is_empty() {
            warn!("No namespace of interest found, skipping type discovery");
            TypeTree::default()
        } else {
            let translator = NodeIdentityTranslator::new(&model.namespaces);
            let root = translator.to_session(&settings.root_type)?;
            let reference_type = translator.to_session(&settings.reference_type)?;
            let limits = TreeLimits {
                max_depth: settings.max_depth,
                max_nodes: settings.max_nodes,
            };
            TypeTreeBuilder::new(
                &*self.gateway,
                translator,
                reference_type,
                limits,
                self.config.browse.max_browse_pages,
            )
            .build(&root, &rebuild.found_indices())
            .await?
        };

        let type_maps: BTreeMap<String, TypeMap> = rebuild
            .found
            .iter()
            .map(|(uri, index)| (uri.clone(), TypeMapFlattener::flatten(&tree, *index)))
            .collect();
        for (uri, map) in &type_maps {
            info!(namespace_uri = %uri, types = map.len(), "Type map ready");
        }

        model.type_tree = tree;
        model.type_maps = type_maps;
        model.found = rebuild.found;
        model.missing = rebuild.missing;

        let subscription_id = self
            .gateway
            .create_subscription(&self.config.subscription)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to create subscription"))?;
        model.subscription_id = Some(subscription_id);

        for entry in self.subscriptions.snapshot() {
            if let Err(e) = self.create_monitored_item(model, subscription_id, &entry).await {
                warn!(node_id = %entry.node_id, error = %e, "Failed to re-create monitored item");
            }
        }

        model.generation += 1;
        self.set_state(LifecycleState::Connected);
        info!(
            generation = model.generation,
            namespaces = model.namespaces.len(),
            found = model.found.len(),
            subscriptions = self.subscriptions.len(),
            "Session model rebuilt"
        );
        Ok(())
    }

    // =========================================================================
    // Status events
    // =========================================================================

    async fn handle_status(&self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connected => {
                let _attempt = self.connect_lock.lock().await;
                if self.is_connected() {
                    debug!("Connected status for current session");
                    return;
                }
                info!("Server reported connected, rebuilding session model");
                self.set_state(LifecycleState::Connecting);
                // Errors are logged by enter_connected; the retry loop takes over.
                let _ = self.enter_connected().await;
            }
            ConnectionStatus::Disconnected => {
                info!("Server reported disconnected");
                self.mark_disconnected();
            }
            other => {
                info!(status = %other, "Connection status changed");
            }
        }
    }

    fn mark_disconnected(&self) {
        self.subscriptions.reset_session_state();
        self.set_state(LifecycleState::Disconnected);
        self.wake.notify_one();
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    pub(crate) async fn create_monitored_item(
        &self,
        model: &SessionModel,
        subscription_id: u32,
        entry: &SubscriptionEntry,
    ) -> OpcUaResult<()> {
        let node = model.translator().to_session(&entry.node_id)?;
        let monitored_item_id = self
            .gateway
            .create_monitored_item(
                subscription_id,
                &node,
                self.config.subscription.sampling_interval,
                entry.data_change_callback(),
            )
            .await?;

        let monitored = MonitoredItemRef {
            subscription_id,
            monitored_item_id,
        };
        if !self.subscriptions.set_monitored(entry.id, monitored) {
            self.gateway
                .delete_monitored_item(subscription_id, monitored_item_id)
                .await?;
        }
        debug!(node_id = %entry.node_id, monitored_item_id = monitored_item_id, "Monitored item created");
        Ok(())
    }

    pub(crate) async fn unsubscribe(&self, id: Uuid) -> OpcUaResult<()> {
        let Some(entry) = self.subscriptions.remove(id) else {
            return Ok(());
        };
        debug!(subscription = %id, node_id = %entry.node_id, "Unsubscribing");

        match entry.monitored {
            Some(item) if self.is_connected() => {
                self.gateway
                    .delete_monitored_item(item.subscription_id, item.monitored_item_id)
                    .await
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Starts the retry loop and the status task.
    ///
    /// Returns `None` if the tasks were already started once.
    pub(crate) fn spawn(self: &Arc<Self>) -> Option<LifecycleTasks> {
        let status_rx = self.status_rx.lock().take()?;
        self.keep_trying.store(true, Ordering::SeqCst);

        let retry = tokio::spawn(Self::retry_loop(self.clone()));
        let status = tokio::spawn(Self::status_loop(self.clone(), status_rx));
        Some(LifecycleTasks { retry, status })
    }

    /// Clears the keep-trying flag and wakes the retry loop.
    pub(crate) fn stop_trying(&self) {
        self.keep_trying.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    async fn retry_loop(core: Arc<Self>) {
        let settings = core.config.connection.clone();
        info!(endpoint = %core.config.opcua.endpoint, strategy = %settings.strategy, "Connection loop started");
        let mut attempt: u32 = 0;

        while core.keep_trying.load(Ordering::SeqCst) {
            let wait = if core.is_connected() {
                if !core.gateway.is_session_connected() {
                    warn!("Session lost without status notification");
                    core.mark_disconnected();
                    continue;
                }
                attempt = 0;
                settings.idle_interval
            } else {
                match core.connect().await {
                    Ok(()) => {
                        attempt = 0;
                        continue;
                    }
                    Err(e) => {
                        let delay = settings.delay_for_attempt(attempt);
                        e.log("Connection attempt failed");
                        debug!(attempt = attempt, delay_ms = delay.as_millis() as u64, "Retrying connection");
                        attempt = attempt.saturating_add(1);
                        delay
                    }
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = core.wake.notified() => {}
            }
        }

        info!("Connection loop stopped");
    }

    async fn status_loop(core: Arc<Self>, mut status_rx: StatusReceiver) {
        while let Some(status) = status_rx.recv().await {
            core.handle_status(status).await;
        }
    }

    /// Closes the session if one is open.
    pub(crate) async fn close_session(&self) -> OpcUaResult<()> {
        let _attempt = self.connect_lock.lock().await;
        self.subscriptions.reset_session_state();
        let was_connected = self.is_connected() || self.gateway.is_session_connected();
        self.set_state(LifecycleState::Disconnected);
        if was_connected {
            self.gateway.disconnect_session().await?;
        }
        Ok(())
    }
}

impl fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCore")
            .field("endpoint", &self.config.opcua.endpoint)
            .field("state", &self.state())
            .field("keep_trying", &self.keep_trying.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Background tasks of a started client.
#[derive(Debug)]
pub(crate) struct LifecycleTasks {
    retry: JoinHandle<()>,
    status: JoinHandle<()>,
}

impl LifecycleTasks {
    /// Waits for the retry loop to exit, then stops the status task.
    ///
    /// The keep-trying flag must already be cleared.
    pub(crate) async fn join(self) {
        if let Err(e) = self.retry.await {
            error!(error = %e, "Connection loop terminated abnormally");
        }
        self.status.abort();
        let _ = self.status.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Vec<EndpointDescription> {
        vec![
            EndpointDescription::new("opc.tcp://srv:4840", SecurityMode::None),
            EndpointDescription::new("opc.tcp://srv:4840/sign", SecurityMode::Sign),
            EndpointDescription::new("opc.tcp://srv:4840/enc", SecurityMode::SignAndEncrypt),
            EndpointDescription::new("opc.tcp://srv:4840/sign2", SecurityMode::Sign),
        ]
    }

    #[test]
    fn test_select_endpoint_first_match() {
        let endpoints = endpoints();
        let selected = select_endpoint(&endpoints, SecurityMode::Sign).unwrap();
        assert_eq!(selected.endpoint_url, "opc.tcp://srv:4840/sign");

        let selected = select_endpoint(&endpoints, SecurityMode::SignAndEncrypt).unwrap();
        assert_eq!(selected.endpoint_url, "opc.tcp://srv:4840/enc");
    }

    #[test]
    fn test_select_endpoint_none() {
        let endpoints = vec![EndpointDescription::new("opc.tcp://srv:4840", SecurityMode::None)];
        assert!(select_endpoint(&endpoints, SecurityMode::Sign).is_none());
        assert!(select_endpoint(&[], SecurityMode::None).is_none());
    }

    #[test]
    fn test_lifecycle_state() {
        assert_eq!(LifecycleState::default(), LifecycleState::Disconnected);
        assert!(LifecycleState::Connected.is_connected());
        assert!(!LifecycleState::Connecting.is_connected());
        assert_eq!(LifecycleState::Connecting.to_string(), "Connecting");
    }

    #[tokio::test]
    async fn test_connect_builds_model() {
        use crate::config::OpcUaConfig;
        use crate::testing::AddressSpace;
        use crate::types::{NodeClass, NodeId};

        let space = AddressSpace::new(&["http://opcfoundation.org/UA/", "urn:s", "http://x/UA/"]);
        space.add_type(NodeId::numeric(2, 1001), NodeClass::ObjectType, "MachineType", &NodeId::ns0(58));
        let config = BridgeConfig::new(OpcUaConfig::new("opc.tcp://srv:4840")).with_namespace("http://x/UA/");
        let core = ClientCore::new(config, Arc::new(space));

        core.connect().await.unwrap();
        assert!(core.is_connected());

        let model = core.session_model().await.unwrap();
        assert_eq!(model.found_namespaces(), &[("http://x/UA/".to_string(), 2)]);
        assert!(model.type_map("http://x/UA/").unwrap().get("MachineType").is_some());
        assert_eq!(model.generation(), 1);
        assert!(model.subscription_id().is_some());
    }

    fn machine_core() -> (Arc<crate::testing::AddressSpace>, ClientCore) {
        use crate::config::OpcUaConfig;
        use crate::testing::AddressSpace;
        use crate::types::{NodeClass, NodeId};

        let space = Arc::new(AddressSpace::new(&["http://opcfoundation.org/UA/", "urn:s", "http://x/UA/"]));
        space.add_type(NodeId::numeric(2, 1001), NodeClass::ObjectType, "MachineType", &NodeId::ns0(58));
        let config = BridgeConfig::new(OpcUaConfig::new("opc.tcp://srv:4840")).with_namespace("http://x/UA/");
        let core = ClientCore::new(config, space.clone());
        (space, core)
    }

    #[tokio::test]
    async fn test_rebuild_clears_supertype_cache() {
        use crate::types::NodeId;

        let (space, core) = machine_core();
        core.connect().await.unwrap();
        {
            let model = core.session_model().await.unwrap();
            model.supertypes().insert(NodeId::numeric(2, 1001), Some(NodeId::ns0(58)));
            assert_eq!(model.supertypes().len(), 1);
        }

        space.set_namespaces(&["http://opcfoundation.org/UA/", "http://x/UA/", "urn:s"]);
        core.rebuild_model().await.unwrap();

        let model = core.session_model().await.unwrap();
        assert!(model.supertypes().is_empty());
        assert_eq!(model.found_namespaces(), &[("http://x/UA/".to_string(), 1)]);
        assert_eq!(model.generation(), 2);
    }

    #[tokio::test]
    async fn test_connected_status_reruns_entry_actions() {
        let (_space, core) = machine_core();
        core.connect().await.unwrap();

        // Already connected: nothing to redo.
        core.handle_status(ConnectionStatus::Connected).await;
        assert_eq!(core.session_model().await.unwrap().generation(), 1);

        core.handle_status(ConnectionStatus::Disconnected).await;
        assert_eq!(core.state(), LifecycleState::Disconnected);

        core.handle_status(ConnectionStatus::Connected).await;
        assert!(core.is_connected());
        let model = core.session_model().await.unwrap();
        assert_eq!(model.generation(), 2);
        assert!(model.type_map("http://x/UA/").unwrap().get("MachineType").is_some());
    }

    #[tokio::test]
    async fn test_query_while_disconnected() {
        use crate::config::OpcUaConfig;
        use crate::testing::AddressSpace;

        let space = AddressSpace::new(&["http://opcfoundation.org/UA/"]);
        let core = ClientCore::new(BridgeConfig::new(OpcUaConfig::new("opc.tcp://srv:4840")), Arc::new(space));
        let err = core.session_model().await.unwrap_err();
        assert!(err.is_not_connected());
    }
}

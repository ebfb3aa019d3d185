// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session gateway backed by the `opcua` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use uabridge_opcua::client::{BridgeClient, OpcUaGateway, Platform};
//!
//! let gateway = Arc::new(OpcUaGateway::new(&config.opcua));
//! let client = BridgeClient::new(config, gateway, &Platform::new())?;
//! client.start();
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use opcua::client::prelude as ua;
use opcua::client::prelude::{
    AttributeService, MonitoredItemService, SubscriptionService, ViewService,
};
use opcua::sync::RwLock as OpcUaRwLock;

use crate::browse::BrowseContext;
use crate::config::{OpcUaConfig, SubscriptionSettings};
use crate::error::{ConnectionError, OpcUaError, OpcUaResult};
use crate::types::{
    AttributeId, BrowseDirection, NodeClass, NodeId, NodeIdentifier, QualifiedName, SecurityMode,
    StatusCode, TimestampsToReturn,
};

use super::gateway::{
    BrowsePage, BrowsePath, BrowsePathResult, BrowsePathTarget, ConnectInfo, ConnectionStatus,
    DataChangeCallback, DataValue, EndpointDescription, IdentityToken, ReadValueId,
    ReferenceDescription, SessionGateway, StatusSender, Variant,
};

type SessionHandle = Arc<OpcUaRwLock<ua::Session>>;
type ItemCallbacks = Arc<Mutex<HashMap<u32, DataChangeCallback>>>;

// =============================================================================
// OpcUaGateway
// =============================================================================

/// [`SessionGateway`] talking to a real server.
pub struct OpcUaGateway {
    pki_dir: Option<PathBuf>,
    session: Mutex<Option<SessionHandle>>,
    runner: Mutex<Option<tokio::sync::oneshot::Sender<ua::SessionCommand>>>,
    callbacks: ItemCallbacks,
}

impl OpcUaGateway {
    /// Creates a gateway. No connection is made.
    pub fn new(config: &OpcUaConfig) -> Self {
        Self {
            pki_dir: config.pki_dir.clone(),
            session: Mutex::new(None),
            runner: Mutex::new(None),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn close(
        runner: Option<tokio::sync::oneshot::Sender<ua::SessionCommand>>,
        session: Option<SessionHandle>,
    ) {
        if let Some(runner) = runner {
            let _ = runner.send(ua::SessionCommand::Stop);
        }
        if let Some(session) = session {
            session.write().disconnect();
            info!("Session disconnected");
        }
    }

    fn build_client(&self, info: &ConnectInfo) -> OpcUaResult<ua::Client> {
        let mut builder = ua::ClientBuilder::new()
            .application_name(info.application_name.as_str())
            .application_uri(info.application_uri.as_str())
            .product_uri(info.product_uri.as_str())
            .create_sample_keypair(true)
            .trust_server_certs(info.bypass_cert_verification)
            .session_retry_limit(0)
            .session_timeout(info.session_timeout.as_millis().min(u128::from(u32::MAX)) as u32);

        if let Some(ref pki_dir) = self.pki_dir {
            builder = builder.pki_dir(pki_dir.clone());
        }

        builder
            .client()
            .ok_or_else(|| OpcUaError::transport("CreateClient", "Failed to build OPC UA client"))
    }

    fn session(&self) -> OpcUaResult<SessionHandle> {
        self.session.lock().clone().ok_or_else(OpcUaError::not_connected)
    }

    fn service_error(service: &str, status: ua::StatusCode) -> OpcUaError {
        error!(service = service, status = %status, "Bad service result");
        OpcUaError::protocol_status(service, StatusCode(status.bits()))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    fn to_ua_node_id(node_id: &NodeId) -> ua::NodeId {
        let ns = node_id.namespace_index;
        match &node_id.identifier {
            NodeIdentifier::Numeric(v) => ua::NodeId::new(ns, *v),
            NodeIdentifier::String(v) => ua::NodeId::new(ns, v.clone()),
            NodeIdentifier::Guid(v) => ua::NodeId::new(ns, ua::Guid::from(*v)),
            NodeIdentifier::Opaque(v) => ua::NodeId::new(ns, ua::ByteString::from(v.as_slice())),
        }
    }

    fn from_ua_node_id(node_id: &ua::NodeId) -> NodeId {
        let ns = node_id.namespace;
        match &node_id.identifier {
            ua::Identifier::Numeric(v) => NodeId::numeric(ns, *v),
            ua::Identifier::String(v) => NodeId::string(ns, v.as_ref()),
            ua::Identifier::Guid(v) => NodeId::guid(ns, uuid::Uuid::from_bytes(*v.as_bytes())),
            ua::Identifier::ByteString(v) => NodeId::opaque(ns, v.value.clone().unwrap_or_default()),
        }
    }

    fn to_ua_name(name: &QualifiedName) -> ua::QualifiedName {
        ua::QualifiedName::new(name.namespace_index, name.name.as_str())
    }

    fn from_ua_name(name: &ua::QualifiedName) -> QualifiedName {
        QualifiedName::new(name.namespace_index, name.name.as_ref())
    }

    fn to_ua_security_mode(mode: SecurityMode) -> ua::MessageSecurityMode {
        match mode {
            SecurityMode::None => ua::MessageSecurityMode::None,
            SecurityMode::Sign => ua::MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => ua::MessageSecurityMode::SignAndEncrypt,
        }
    }

    fn from_ua_security_mode(mode: ua::MessageSecurityMode) -> Option<SecurityMode> {
        match mode {
            ua::MessageSecurityMode::None => Some(SecurityMode::None),
            ua::MessageSecurityMode::Sign => Some(SecurityMode::Sign),
            ua::MessageSecurityMode::SignAndEncrypt => Some(SecurityMode::SignAndEncrypt),
            _ => None,
        }
    }

    fn to_ua_timestamps(timestamps: TimestampsToReturn) -> ua::TimestampsToReturn {
        match timestamps {
            TimestampsToReturn::Source => ua::TimestampsToReturn::Source,
            TimestampsToReturn::Server => ua::TimestampsToReturn::Server,
            TimestampsToReturn::Both => ua::TimestampsToReturn::Both,
            TimestampsToReturn::Neither => ua::TimestampsToReturn::Neither,
        }
    }

    fn to_ua_identity(identity: &IdentityToken) -> ua::IdentityToken {
        match identity {
            IdentityToken::Anonymous => ua::IdentityToken::Anonymous,
            IdentityToken::UserName { username, password } => {
                ua::IdentityToken::UserName(username.clone(), password.clone())
            }
        }
    }

    fn from_ua_variant(variant: &ua::Variant) -> Variant {
        match variant {
            ua::Variant::Empty => Variant::Empty,
            ua::Variant::Boolean(v) => Variant::Boolean(*v),
            ua::Variant::SByte(v) => Variant::SByte(*v),
            ua::Variant::Byte(v) => Variant::Byte(*v),
            ua::Variant::Int16(v) => Variant::Int16(*v),
            ua::Variant::UInt16(v) => Variant::UInt16(*v),
            ua::Variant::Int32(v) => Variant::Int32(*v),
            ua::Variant::UInt32(v) => Variant::UInt32(*v),
            ua::Variant::Int64(v) => Variant::Int64(*v),
            ua::Variant::UInt64(v) => Variant::UInt64(*v),
            ua::Variant::Float(v) => Variant::Float(*v),
            ua::Variant::Double(v) => Variant::Double(*v),
            ua::Variant::String(v) => Variant::String(v.as_ref().to_string()),
            ua::Variant::DateTime(v) => Variant::DateTime(v.as_chrono()),
            ua::Variant::Guid(v) => Variant::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
            ua::Variant::ByteString(v) => Variant::ByteString(v.value.clone().unwrap_or_default()),
            ua::Variant::NodeId(v) => Variant::NodeId(Self::from_ua_node_id(v)),
            ua::Variant::QualifiedName(v) => Variant::QualifiedName(Self::from_ua_name(v)),
            ua::Variant::LocalizedText(v) => Variant::LocalizedText {
                locale: v.locale.as_ref().to_string(),
                text: v.text.as_ref().to_string(),
            },
            ua::Variant::StatusCode(v) => Variant::StatusCode(StatusCode(v.bits())),
            ua::Variant::Array(arr) => {
                Variant::Array(arr.values.iter().map(Self::from_ua_variant).collect())
            }
            other => {
                trace!(value = ?other, "Unsupported variant type, converting to string");
                Variant::String(format!("{:?}", other))
            }
        }
    }

    fn from_ua_data_value(value: &ua::DataValue) -> DataValue {
        DataValue {
            value: value.value.as_ref().map(Self::from_ua_variant).unwrap_or_default(),
            status: StatusCode(value.status.map(|s| s.bits()).unwrap_or(0)),
            source_timestamp: value.source_timestamp.map(|t| t.as_chrono()),
            server_timestamp: value.server_timestamp.map(|t| t.as_chrono()),
        }
    }

    fn from_ua_reference(reference: &ua::ReferenceDescription) -> Option<ReferenceDescription> {
        let Some(node_class) = NodeClass::from_value(reference.node_class as u32) else {
            warn!(node_id = %reference.node_id.node_id, "Skipping reference with unspecified node class");
            return None;
        };
        Some(ReferenceDescription {
            reference_type_id: Self::from_ua_node_id(&reference.reference_type_id),
            is_forward: reference.is_forward,
            node_id: Self::from_ua_node_id(&reference.node_id.node_id),
            browse_name: Self::from_ua_name(&reference.browse_name),
            node_class,
            type_definition: Self::from_ua_node_id(&reference.type_definition.node_id),
        })
    }

    fn to_page(result: &ua::BrowseResult) -> OpcUaResult<BrowsePage> {
        if result.status_code.is_bad() {
            return Err(Self::service_error("Browse", result.status_code));
        }
        let references = result
            .references
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(Self::from_ua_reference)
            .collect();
        let continuation_point = result
            .continuation_point
            .value
            .clone()
            .filter(|point| !point.is_empty());
        Ok(BrowsePage {
            references,
            continuation_point,
        })
    }

    fn first_page(results: Option<Vec<ua::BrowseResult>>) -> OpcUaResult<BrowsePage> {
        let results = results.unwrap_or_default();
        let [result] = results.as_slice() else {
            return Err(OpcUaError::semantic_mismatch(format!(
                "Length mismatch: expected 1 browse result, got {}",
                results.len()
            )));
        };
        Self::to_page(result)
    }
}

impl std::fmt::Debug for OpcUaGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcUaGateway")
            .field("connected", &self.is_session_connected())
            .field("monitored_items", &self.callbacks.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionGateway for OpcUaGateway {
    async fn discover_endpoints(&self, url: &str) -> OpcUaResult<Vec<EndpointDescription>> {
        let client = ua::ClientBuilder::new()
            .application_name("uabridge discovery")
            .client()
            .ok_or_else(|| OpcUaError::transport("CreateClient", "Failed to build discovery client"))?;

        let endpoints = client
            .get_server_endpoints_from_url(url)
            .map_err(|s| Self::service_error("GetEndpoints", s))?;

        Ok(endpoints
            .iter()
            .filter_map(|e| {
                Some(EndpointDescription {
                    endpoint_url: e.endpoint_url.as_ref().to_string(),
                    security_mode: Self::from_ua_security_mode(e.security_mode)?,
                    security_policy_uri: e.security_policy_uri.as_ref().to_string(),
                    security_level: e.security_level,
                })
            })
            .collect())
    }

    async fn connect_session(
        &self,
        endpoint: &EndpointDescription,
        connect_info: &ConnectInfo,
        identity: &IdentityToken,
        status: StatusSender,
    ) -> OpcUaResult<()> {
        let mut client = self.build_client(connect_info)?;
        let target: ua::EndpointDescription = (
            endpoint.endpoint_url.as_str(),
            endpoint.security_policy_uri.as_str(),
            Self::to_ua_security_mode(endpoint.security_mode),
            ua::UserTokenPolicy::anonymous(),
        )
            .into();

        let session = client
            .connect_to_endpoint(target, Self::to_ua_identity(identity))
            .map_err(|s| {
                OpcUaError::from(ConnectionError::session_failed(&endpoint.endpoint_url, s.to_string()))
            })?;

        {
            let mut locked = session.write();
            let on_status = status.clone();
            locked.set_connection_status_callback(ua::ConnectionStatusCallback::new(move |connected| {
                let event = if connected {
                    ConnectionStatus::Connected
                } else {
                    ConnectionStatus::Disconnected
                };
                let _ = on_status.send(event);
            }));
            locked.set_session_closed_callback(ua::SessionClosedCallback::new(move |reason| {
                warn!(status = %reason, "Session closed by server");
                let _ = status.send(ConnectionStatus::Disconnected);
            }));
        }

        let runner = ua::Session::run_async(session.clone());
        let replaced_runner = self.runner.lock().replace(runner);
        let replaced_session = self.session.lock().replace(session);
        if replaced_runner.is_some() || replaced_session.is_some() {
            warn!("Replacing a session that was still open");
            Self::close(replaced_runner, replaced_session);
        }
        info!(endpoint = %endpoint.endpoint_url, "Session connected");
        Ok(())
    }

    async fn disconnect_session(&self) -> OpcUaResult<()> {
        let runner = self.runner.lock().take();
        let session = self.session.lock().take();
        Self::close(runner, session);
        self.callbacks.lock().clear();
        Ok(())
    }

    fn is_session_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.read().is_connected())
            .unwrap_or(false)
    }

    async fn read(
        &self,
        nodes: &[ReadValueId],
        timestamps: TimestampsToReturn,
    ) -> OpcUaResult<Vec<DataValue>> {
        let session = self.session()?;
        let request: Vec<ua::ReadValueId> = nodes
            .iter()
            .map(|n| ua::ReadValueId {
                node_id: Self::to_ua_node_id(&n.node_id),
                attribute_id: n.attribute_id.value(),
                index_range: ua::UAString::null(),
                data_encoding: ua::QualifiedName::null(),
            })
            .collect();

        trace!(count = nodes.len(), "Reading attributes");
        let results = session
            .read()
            .read(&request, Self::to_ua_timestamps(timestamps), 0.0)
            .map_err(|s| Self::service_error("Read", s))?;
        Ok(results.iter().map(Self::from_ua_data_value).collect())
    }

    async fn browse(&self, start: &NodeId, context: &BrowseContext) -> OpcUaResult<BrowsePage> {
        let session = self.session()?;
        let description = ua::BrowseDescription {
            node_id: Self::to_ua_node_id(start),
            browse_direction: match context.direction {
                BrowseDirection::Forward => ua::BrowseDirection::Forward,
                BrowseDirection::Inverse => ua::BrowseDirection::Inverse,
                BrowseDirection::Both => ua::BrowseDirection::Both,
            },
            reference_type_id: context
                .reference_type
                .as_ref()
                .map(Self::to_ua_node_id)
                .unwrap_or_else(ua::NodeId::null),
            include_subtypes: context.include_subtypes,
            node_class_mask: context.node_class_mask,
            result_mask: context.result_mask,
        };

        trace!(node_id = %start, direction = ?context.direction, "Browsing node");
        let results = session
            .read()
            .browse(&[description])
            .map_err(|s| Self::service_error("Browse", s))?;
        Self::first_page(results)
    }

    async fn browse_next(&self, continuation_point: &[u8], release: bool) -> OpcUaResult<BrowsePage> {
        let session = self.session()?;
        let points = [ua::ByteString::from(continuation_point)];
        let results = session
            .read()
            .browse_next(release, &points)
            .map_err(|s| Self::service_error("BrowseNext", s))?;
        if release {
            debug!("Continuation point released");
            return Ok(BrowsePage::default());
        }
        Self::first_page(results)
    }

    async fn translate_browse_paths(&self, paths: &[BrowsePath]) -> OpcUaResult<Vec<BrowsePathResult>> {
        let session = self.session()?;
        let request: Vec<ua::BrowsePath> = paths
            .iter()
            .map(|path| ua::BrowsePath {
                starting_node: Self::to_ua_node_id(&path.starting_node),
                relative_path: ua::RelativePath {
                    elements: Some(
                        path.relative_path
                            .iter()
                            .map(|e| ua::RelativePathElement {
                                reference_type_id: Self::to_ua_node_id(&e.reference_type_id),
                                is_inverse: e.is_inverse,
                                include_subtypes: e.include_subtypes,
                                target_name: Self::to_ua_name(&e.target_name),
                            })
                            .collect(),
                    ),
                },
            })
            .collect();

        let results = session
            .read()
            .translate_browse_paths_to_node_ids(&request)
            .map_err(|s| Self::service_error("TranslateBrowsePathsToNodeIds", s))?;

        Ok(results
            .iter()
            .map(|r| BrowsePathResult {
                status: StatusCode(r.status_code.bits()),
                targets: r
                    .targets
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|t| BrowsePathTarget {
                        target_id: Self::from_ua_node_id(&t.target_id.node_id),
                        remaining_path_index: t.remaining_path_index,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn namespace_table(&self) -> OpcUaResult<Vec<String>> {
        let request = [ReadValueId::new(
            NodeId::ns0(ua::VariableId::Server_NamespaceArray as u32),
            AttributeId::Value,
        )];
        let values = self.read(&request, TimestampsToReturn::Neither).await?;
        let [value] = values.as_slice() else {
            return Err(OpcUaError::semantic_mismatch("Namespace array read returned no value"));
        };
        if value.status.is_bad() {
            return Err(OpcUaError::protocol_status("Read", value.status));
        }

        match &value.value {
            Variant::Array(items) => Ok(items
                .iter()
                .map(|item| match item {
                    Variant::String(uri) => uri.clone(),
                    _ => String::new(),
                })
                .collect()),
            other => Err(OpcUaError::semantic_mismatch(format!(
                "Type mismatch: expected String array, got {}",
                other.type_name()
            ))),
        }
    }

    async fn create_subscription(&self, settings: &SubscriptionSettings) -> OpcUaResult<u32> {
        let session = self.session()?;
        let callbacks = self.callbacks.clone();

        let subscription_id = session
            .read()
            .create_subscription(
                settings.publishing_interval.as_millis() as f64,
                settings.lifetime_count,
                settings.keepalive_count,
                settings.max_notifications_per_publish,
                settings.priority,
                settings.publishing_enabled,
                ua::DataChangeCallback::new(move |items| {
                    let callbacks = callbacks.lock();
                    for item in items {
                        if let Some(callback) = callbacks.get(&item.id()) {
                            callback(Self::from_ua_data_value(item.last_value()));
                        }
                    }
                }),
            )
            .map_err(|s| Self::service_error("CreateSubscription", s))?;

        info!(subscription_id = subscription_id, "Created subscription");
        Ok(subscription_id)
    }

    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node: &NodeId,
        sampling_interval: Duration,
        callback: DataChangeCallback,
    ) -> OpcUaResult<u32> {
        let session = self.session()?;
        let request = ua::MonitoredItemCreateRequest::new(
            ua::ReadValueId::from(Self::to_ua_node_id(node)),
            ua::MonitoringMode::Reporting,
            ua::MonitoringParameters {
                client_handle: 0,
                sampling_interval: sampling_interval.as_millis() as f64,
                filter: ua::ExtensionObject::null(),
                queue_size: 10,
                discard_oldest: true,
            },
        );

        let results = session
            .read()
            .create_monitored_items(subscription_id, ua::TimestampsToReturn::Both, &[request])
            .map_err(|s| Self::service_error("CreateMonitoredItems", s))?;

        let [result] = results.as_slice() else {
            return Err(OpcUaError::semantic_mismatch("CreateMonitoredItems result length mismatch"));
        };
        if result.status_code.is_bad() {
            return Err(Self::service_error("CreateMonitoredItems", result.status_code));
        }

        self.callbacks.lock().insert(result.monitored_item_id, callback);
        debug!(node_id = %node, monitored_item_id = result.monitored_item_id, "Monitored item created");
        Ok(result.monitored_item_id)
    }

    async fn delete_monitored_item(&self, subscription_id: u32, monitored_item_id: u32) -> OpcUaResult<()> {
        self.callbacks.lock().remove(&monitored_item_id);
        let session = self.session()?;
        session
            .read()
            .delete_monitored_items(subscription_id, &[monitored_item_id])
            .map_err(|s| Self::service_error("DeleteMonitoredItems", s))?;
        Ok(())
    }
}

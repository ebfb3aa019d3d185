// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session gateway abstraction.
//!
//! The gateway is the narrow surface through which the bridge talks to a
//! server: endpoint discovery, session connect/disconnect, read, browse,
//! browse-path translation, the namespace table and subscriptions. Wire
//! encoding, secure channels and keep-alive are the implementation's
//! concern.
//!
//! All node ids crossing this boundary are session-local.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::browse::BrowseContext;
use crate::config::SubscriptionSettings;
use crate::error::OpcUaResult;
use crate::types::{
    AttributeId, NodeClass, NodeId, QualifiedName, SecurityMode, StatusCode, TimestampsToReturn,
};

// =============================================================================
// ConnectionStatus
// =============================================================================

/// Connection status reported asynchronously by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// The session is gone.
    Disconnected,
    /// The session is established and usable.
    Connected,
    /// The keep-alive watchdog fired.
    ConnectionWarningWatchdogTimeout,
    /// The transport is reconnecting on its own.
    ConnectionErrorApiReconnect,
    /// The server announced shutdown.
    ServerShutdown,
    /// The transport replaced the session with a new one.
    NewSessionCreated,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::ConnectionWarningWatchdogTimeout => "ConnectionWarningWatchdogTimeout",
            Self::ConnectionErrorApiReconnect => "ConnectionErrorApiReconnect",
            Self::ServerShutdown => "ServerShutdown",
            Self::NewSessionCreated => "NewSessionCreated",
        };
        write!(f, "{}", name)
    }
}

/// Sending half handed to the gateway on connect.
pub type StatusSender = mpsc::UnboundedSender<ConnectionStatus>;

/// Receiving half consumed by the lifecycle.
pub type StatusReceiver = mpsc::UnboundedReceiver<ConnectionStatus>;

// =============================================================================
// Endpoints and session parameters
// =============================================================================

/// A discovered server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    /// Endpoint URL.
    pub endpoint_url: String,
    /// Message security mode offered.
    pub security_mode: SecurityMode,
    /// Security policy URI.
    pub security_policy_uri: String,
    /// Relative security level advertised by the server.
    pub security_level: u8,
}

impl EndpointDescription {
    /// Creates an endpoint description with the `None` policy URI.
    pub fn new(endpoint_url: impl Into<String>, security_mode: SecurityMode) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            security_mode,
            security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#None".to_string(),
            security_level: 0,
        }
    }
}

/// Application description presented to the server on session creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    /// Application name.
    pub application_name: String,
    /// Application URI.
    pub application_uri: String,
    /// Product URI.
    pub product_uri: String,
    /// Session name.
    pub session_name: String,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Accept any server certificate.
    pub bypass_cert_verification: bool,
}

/// User identity for session activation.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityToken {
    /// Anonymous login.
    Anonymous,
    /// Username and password login.
    UserName {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
}

impl IdentityToken {
    /// Returns a username identity only if both parts are non-empty.
    pub fn from_credentials(username: Option<&str>, password: Option<&str>) -> Self {
        match (username, password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Self::UserName {
                username: user.to_string(),
                password: pass.to_string(),
            },
            _ => Self::Anonymous,
        }
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { username, .. } => {
                f.debug_struct("UserName").field("username", username).finish_non_exhaustive()
            }
        }
    }
}

// =============================================================================
// Values
// =============================================================================

/// Variant value carried in a [`DataValue`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// No value.
    #[default]
    Empty,
    /// Boolean.
    Boolean(bool),
    /// Signed byte.
    SByte(i8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String.
    String(String),
    /// Date and time.
    DateTime(DateTime<Utc>),
    /// GUID.
    Guid(uuid::Uuid),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Node id.
    NodeId(NodeId),
    /// Qualified name.
    QualifiedName(QualifiedName),
    /// Localized text.
    LocalizedText {
        /// Locale identifier.
        locale: String,
        /// Text.
        text: String,
    },
    /// Status code.
    StatusCode(StatusCode),
    /// Array of values.
    Array(Vec<Variant>),
}

impl Variant {
    /// Returns the type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::Guid(_) => "Guid",
            Self::ByteString(_) => "ByteString",
            Self::NodeId(_) => "NodeId",
            Self::QualifiedName(_) => "QualifiedName",
            Self::LocalizedText { .. } => "LocalizedText",
            Self::StatusCode(_) => "StatusCode",
            Self::Array(_) => "Array",
        }
    }
}

/// A value with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value.
    pub value: Variant,
    /// Per-item status.
    pub status: StatusCode,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good value without timestamps.
    pub fn good(value: Variant) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    /// Creates a value-less result carrying `status`.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// Callback invoked with each data change of a monitored item.
pub type DataChangeCallback = Arc<dyn Fn(DataValue) + Send + Sync>;

// =============================================================================
// Service request/response shapes
// =============================================================================

/// One node/attribute pair to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadValueId {
    /// Node to read.
    pub node_id: NodeId,
    /// Attribute to read.
    pub attribute_id: AttributeId,
}

impl ReadValueId {
    /// Creates a read request item.
    pub fn new(node_id: NodeId, attribute_id: AttributeId) -> Self {
        Self {
            node_id,
            attribute_id,
        }
    }
}

/// A reference returned by browse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDescription {
    /// Reference type.
    pub reference_type_id: NodeId,
    /// Direction of the reference.
    pub is_forward: bool,
    /// Target node.
    pub node_id: NodeId,
    /// Browse name of the target.
    pub browse_name: QualifiedName,
    /// Class of the target.
    pub node_class: NodeClass,
    /// Type definition of the target (null for type nodes).
    pub type_definition: NodeId,
}

/// One page of browse results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowsePage {
    /// References on this page.
    pub references: Vec<ReferenceDescription>,
    /// Token for the next page, if any.
    pub continuation_point: Option<Vec<u8>>,
}

/// One hop of a relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePathElement {
    /// Reference type to follow.
    pub reference_type_id: NodeId,
    /// Follow inverse references.
    pub is_inverse: bool,
    /// Include subtypes of the reference type.
    pub include_subtypes: bool,
    /// Browse name of the target.
    pub target_name: QualifiedName,
}

/// A browse path to translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsePath {
    /// Starting node.
    pub starting_node: NodeId,
    /// Path elements.
    pub relative_path: Vec<RelativePathElement>,
}

/// A target of a translated browse path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsePathTarget {
    /// Resolved node.
    pub target_id: NodeId,
    /// Index of the first unprocessed element (`u32::MAX` when complete).
    pub remaining_path_index: u32,
}

/// Result of translating one browse path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsePathResult {
    /// Per-path status.
    pub status: StatusCode,
    /// Matching targets.
    pub targets: Vec<BrowsePathTarget>,
}

// =============================================================================
// SessionGateway Trait
// =============================================================================

/// Session, browse and read provider backing the bridge.
///
/// A service-level failure (non-good service result) is returned as an
/// error. Per-item statuses are carried in the results.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the lifecycle and query paths
/// call into the gateway from different tasks.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    // =========================================================================
    // Session
    // =========================================================================

    /// Lists the endpoints offered at `url`.
    async fn discover_endpoints(&self, url: &str) -> OpcUaResult<Vec<EndpointDescription>>;

    /// Opens a session on `endpoint`.
    ///
    /// Status changes after the call returns are pushed to `status`.
    async fn connect_session(
        &self,
        endpoint: &EndpointDescription,
        connect_info: &ConnectInfo,
        identity: &IdentityToken,
        status: StatusSender,
    ) -> OpcUaResult<()>;

    /// Closes the current session.
    async fn disconnect_session(&self) -> OpcUaResult<()>;

    /// Returns `true` while a session exists.
    fn is_session_connected(&self) -> bool;

    // =========================================================================
    // Services
    // =========================================================================

    /// Reads attributes.
    async fn read(
        &self,
        nodes: &[ReadValueId],
        timestamps: TimestampsToReturn,
    ) -> OpcUaResult<Vec<DataValue>>;

    /// Browses the references of `start`.
    async fn browse(&self, start: &NodeId, context: &BrowseContext) -> OpcUaResult<BrowsePage>;

    /// Fetches the next page, or releases the point when `release` is set.
    async fn browse_next(&self, continuation_point: &[u8], release: bool)
        -> OpcUaResult<BrowsePage>;

    /// Translates browse paths to node ids.
    async fn translate_browse_paths(
        &self,
        paths: &[BrowsePath],
    ) -> OpcUaResult<Vec<BrowsePathResult>>;

    /// Reads the server's namespace array.
    async fn namespace_table(&self) -> OpcUaResult<Vec<String>>;

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription and returns its id.
    async fn create_subscription(&self, settings: &SubscriptionSettings) -> OpcUaResult<u32>;

    /// Monitors the Value attribute of `node` and returns the item id.
    async fn create_monitored_item(
        &self,
        subscription_id: u32,
        node: &NodeId,
        sampling_interval: Duration,
        callback: DataChangeCallback,
    ) -> OpcUaResult<u32>;

    /// Removes a monitored item.
    async fn delete_monitored_item(
        &self,
        subscription_id: u32,
        monitored_item_id: u32,
    ) -> OpcUaResult<()>;
}

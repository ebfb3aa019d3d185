// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node identity and address-space vocabulary types.
//!
//! Two identity forms exist side by side:
//!
//! - **[`NodeId`]**: the session-local form. Its namespace index is only
//!   meaningful for the session that produced it and must never be cached
//!   across a reconnect.
//! - **[`PortableNodeId`]**: the namespace URI form. Stable across sessions
//!   and servers; the only form that is persisted or compared across
//!   reconnects.
//!
//! The same split applies to qualified names ([`QualifiedName`] and
//! [`PortableQualifiedName`]).
//!
//! # Examples
//!
//! ```
//! use uabridge_opcua::types::{NodeId, NodeIdentifier, PortableNodeId};
//!
//! let session: NodeId = "ns=2;s=Machine.Temperature".parse().unwrap();
//! assert_eq!(session.namespace_index, 2);
//!
//! let portable = PortableNodeId::new("http://example.com/UA/", NodeIdentifier::Numeric(1001));
//! assert_eq!(portable.to_string(), "nsu=http://example.com/UA/;i=1001");
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError};

// =============================================================================
// Well-known identifiers
// =============================================================================

/// Numeric identifiers of standard nodes in namespace 0.
pub mod ids {
    /// URI of the OPC UA standard namespace (always index 0).
    pub const OPC_UA_NAMESPACE_URI: &str = "http://opcfoundation.org/UA/";

    /// `HierarchicalReferences` reference type.
    pub const HIERARCHICAL_REFERENCES: u32 = 33;
    /// `Organizes` reference type.
    pub const ORGANIZES: u32 = 35;
    /// `HasTypeDefinition` reference type.
    pub const HAS_TYPE_DEFINITION: u32 = 40;
    /// `HasSubtype` reference type.
    pub const HAS_SUBTYPE: u32 = 45;
    /// `HasProperty` reference type.
    pub const HAS_PROPERTY: u32 = 46;
    /// `HasComponent` reference type.
    pub const HAS_COMPONENT: u32 = 47;
    /// `BaseObjectType` object type.
    pub const BASE_OBJECT_TYPE: u32 = 58;
    /// `BaseDataVariableType` variable type.
    pub const BASE_DATA_VARIABLE_TYPE: u32 = 63;
    /// `Objects` folder.
    pub const OBJECTS_FOLDER: u32 = 85;
}

// =============================================================================
// NodeId
// =============================================================================

/// Session-local OPC UA node identifier.
///
/// # Examples
///
/// ```
/// use uabridge_opcua::types::NodeId;
///
/// let numeric = NodeId::numeric(2, 1001);
/// let parsed: NodeId = "ns=2;i=1001".parse().unwrap();
/// assert_eq!(numeric, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a node id from its parts.
    #[inline]
    pub fn new(namespace_index: u16, identifier: NodeIdentifier) -> Self {
        Self {
            namespace_index,
            identifier,
        }
    }

    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self::new(namespace_index, NodeIdentifier::Numeric(value))
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self::new(namespace_index, NodeIdentifier::String(value.into()))
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self::new(namespace_index, NodeIdentifier::Guid(value))
    }

    /// Creates an opaque node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self::new(namespace_index, NodeIdentifier::Opaque(value))
    }

    /// Creates a numeric node ID in namespace 0.
    #[inline]
    pub fn ns0(value: u32) -> Self {
        Self::numeric(0, value)
    }

    /// Returns the null node id (`i=0`).
    #[inline]
    pub fn null() -> Self {
        Self::numeric(0, 0)
    }

    /// Returns `true` if this is the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && self.identifier.is_null()
    }

    /// Returns the numeric identifier, if any.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            NodeIdentifier::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Formats as `ns=<index>;<id>`, omitting the namespace for index 0.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses `ns=2;i=1001`, `ns=2;s=Name`, `i=85` and the `g=` / `b=` forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, id) = rest.split_once(';').ok_or_else(|| {
                    OpcUaError::configuration(ConfigurationError::invalid_node_id(
                        s,
                        "Missing identifier after namespace",
                    ))
                })?;
                let ns: u16 = ns_str.parse().map_err(|_| {
                    OpcUaError::configuration(ConfigurationError::invalid_node_id(
                        s,
                        "Invalid namespace index",
                    ))
                })?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = identifier_part
            .parse::<NodeIdentifier>()
            .map_err(|reason| {
                OpcUaError::configuration(ConfigurationError::invalid_node_id(s, reason))
            })?;

        Ok(Self::new(namespace_index, identifier))
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The four OPC UA identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque (byte string) identifier.
    Opaque(Vec<u8>),
}

impl NodeIdentifier {
    /// Returns the identifier type prefix for OPC UA string format.
    pub const fn type_prefix(&self) -> char {
        match self {
            Self::Numeric(_) => 'i',
            Self::String(_) => 's',
            Self::Guid(_) => 'g',
            Self::Opaque(_) => 'b',
        }
    }

    /// Returns `true` for `i=0`, an empty string, the nil GUID or empty bytes.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Numeric(v) => *v == 0,
            Self::String(v) => v.is_empty(),
            Self::Guid(v) => v.is_nil(),
            Self::Opaque(v) => v.is_empty(),
        }
    }
}

impl Default for NodeIdentifier {
    fn default() -> Self {
        Self::Numeric(0)
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

impl FromStr for NodeIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("i=") {
            id.parse()
                .map(Self::Numeric)
                .map_err(|_| "Invalid numeric identifier".to_string())
        } else if let Some(id) = s.strip_prefix("s=") {
            Ok(Self::String(id.to_string()))
        } else if let Some(id) = s.strip_prefix("g=") {
            Uuid::parse_str(id)
                .map(Self::Guid)
                .map_err(|e| format!("Invalid GUID: {}", e))
        } else if let Some(id) = s.strip_prefix("b=") {
            BASE64
                .decode(id)
                .map(Self::Opaque)
                .map_err(|e| format!("Invalid base64: {}", e))
        } else {
            Err("Unknown identifier type. Expected i=, s=, g=, or b=".to_string())
        }
    }
}

/// Serde adapter writing a [`NodeIdentifier`] in its `i=`/`s=`/`g=`/`b=` text form.
mod identifier_text {
    use super::*;

    pub fn serialize<S: Serializer>(id: &NodeIdentifier, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NodeIdentifier, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// PortableNodeId
// =============================================================================

/// Session-independent node identifier keyed by namespace URI.
///
/// Serialized as `{ namespace_uri, identifier: "i=1001" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortableNodeId {
    /// Namespace URI.
    #[serde(alias = "uri")]
    pub namespace_uri: String,

    /// Identifier within the namespace.
    #[serde(alias = "id", with = "identifier_text")]
    pub identifier: NodeIdentifier,
}

impl PortableNodeId {
    /// Creates a portable node id.
    pub fn new(namespace_uri: impl Into<String>, identifier: NodeIdentifier) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            identifier,
        }
    }

    /// Creates a portable numeric node id.
    pub fn numeric(namespace_uri: impl Into<String>, value: u32) -> Self {
        Self::new(namespace_uri, NodeIdentifier::Numeric(value))
    }

    /// Creates a portable string node id.
    pub fn string(namespace_uri: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(namespace_uri, NodeIdentifier::String(value.into()))
    }

    /// Creates a portable node id in the OPC UA standard namespace.
    pub fn ns0(value: u32) -> Self {
        Self::numeric(ids::OPC_UA_NAMESPACE_URI, value)
    }

    /// Returns the null portable id.
    pub fn null() -> Self {
        Self::default()
    }

    /// Returns `true` if both the URI and the identifier are empty.
    pub fn is_null(&self) -> bool {
        self.namespace_uri.is_empty() && self.identifier.is_null()
    }
}

impl fmt::Display for PortableNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nsu={};{}", self.namespace_uri, self.identifier)
    }
}

// =============================================================================
// Qualified names
// =============================================================================

/// Session-local qualified name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// Name text.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }

    /// Returns `true` if the name is empty.
    pub fn is_null(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace_index, self.name)
    }
}

/// Qualified name keyed by namespace URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortableQualifiedName {
    /// Namespace URI.
    #[serde(alias = "uri")]
    pub namespace_uri: String,
    /// Name text.
    pub name: String,
}

impl PortableQualifiedName {
    /// Creates a portable qualified name.
    pub fn new(namespace_uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            name: name.into(),
        }
    }

    /// Returns `true` if the name is empty.
    pub fn is_null(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for PortableQualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace_uri, self.name)
    }
}

// =============================================================================
// BrowseResult
// =============================================================================

/// A browse reference projected into the portable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseResult {
    /// Target node.
    pub node_id: PortableNodeId,
    /// Class of the target node.
    pub node_class: NodeClass,
    /// Browse name of the target node.
    pub browse_name: PortableQualifiedName,
    /// Type definition of the target node (null for type nodes).
    pub type_definition: PortableNodeId,
    /// Reference type that led to the target node.
    pub reference_type_id: PortableNodeId,
}

// =============================================================================
// SecurityMode
// =============================================================================

/// OPC UA message security mode.
///
/// Deserializes from either the numeric value (`1`, `2`, `3`) or a name
/// (`none`, `sign`, `sign_and_encrypt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", try_from = "SecurityModeRepr")]
pub enum SecurityMode {
    /// No security.
    #[default]
    None,

    /// Messages are signed but not encrypted.
    Sign,

    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the OPC UA security mode value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Sign => 2,
            Self::SignAndEncrypt => 3,
        }
    }

    /// Creates from OPC UA security mode value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::None),
            2 => Some(Self::Sign),
            3 => Some(Self::SignAndEncrypt),
            _ => Option::None,
        }
    }

    /// Returns `true` if this mode provides message signing.
    #[inline]
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Sign | Self::SignAndEncrypt)
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.trim().parse::<u32>() {
            return Self::from_value(value).ok_or_else(|| {
                OpcUaError::configuration(ConfigurationError::invalid_security_mode(s))
            });
        }

        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "none" | "nosecurity" => Ok(Self::None),
            "sign" | "signed" => Ok(Self::Sign),
            "signandencrypt" | "signencrypt" | "encrypted" => Ok(Self::SignAndEncrypt),
            _ => Err(OpcUaError::configuration(
                ConfigurationError::invalid_security_mode(s),
            )),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SecurityModeRepr {
    Value(u32),
    Name(String),
}

impl TryFrom<SecurityModeRepr> for SecurityMode {
    type Error = String;

    fn try_from(repr: SecurityModeRepr) -> Result<Self, Self::Error> {
        match repr {
            SecurityModeRepr::Value(v) => {
                Self::from_value(v).ok_or_else(|| format!("invalid security mode value {}", v))
            }
            SecurityModeRepr::Name(name) => name.parse().map_err(|e: OpcUaError| e.to_string()),
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: Self = Self(0);
    /// BadUnexpectedError.
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// BadInternalError.
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: Self = Self(0x8005_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// BadServiceUnsupported.
    pub const BAD_SERVICE_UNSUPPORTED: Self = Self(0x800B_0000);
    /// BadSessionIdInvalid.
    pub const BAD_SESSION_ID_INVALID: Self = Self(0x8025_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: Self = Self(0x8026_0000);
    /// BadNodeIdInvalid.
    pub const BAD_NODE_ID_INVALID: Self = Self(0x8033_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// BadAttributeIdInvalid.
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    /// BadContinuationPointInvalid.
    pub const BAD_CONTINUATION_POINT_INVALID: Self = Self(0x804A_0000);
    /// BadNoMatch.
    pub const BAD_NO_MATCH: Self = Self(0x806F_0000);
    /// BadNotConnected.
    pub const BAD_NOT_CONNECTED: Self = Self(0x808A_0000);
    /// BadConnectionClosed.
    pub const BAD_CONNECTION_CLOSED: Self = Self(0x80AE_0000);

    const SEVERITY_MASK: u32 = 0xC000_0000;
    const BAD_BIT: u32 = 0x8000_0000;
    const UNCERTAIN_BIT: u32 = 0x4000_0000;

    /// Returns the raw code.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if the severity is Good.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == 0
    }

    /// Returns `true` if the severity is Bad.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & Self::BAD_BIT != 0
    }

    /// Returns `true` if the severity is Uncertain.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & Self::SEVERITY_MASK == Self::UNCERTAIN_BIT
    }

    /// Returns `true` for codes that indicate a lost or unusable connection.
    pub fn is_communication_error(&self) -> bool {
        matches!(
            *self,
            Self::BAD_COMMUNICATION_ERROR
                | Self::BAD_TIMEOUT
                | Self::BAD_NOT_CONNECTED
                | Self::BAD_CONNECTION_CLOSED
                | Self::BAD_SESSION_CLOSED
                | Self::BAD_SESSION_ID_INVALID
        )
    }

    /// Returns the symbolic name for known codes.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::GOOD => "Good",
            Self::BAD_UNEXPECTED_ERROR => "BadUnexpectedError",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SERVICE_UNSUPPORTED => "BadServiceUnsupported",
            Self::BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            Self::BAD_SESSION_CLOSED => "BadSessionClosed",
            Self::BAD_NODE_ID_INVALID => "BadNodeIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_CONTINUATION_POINT_INVALID => "BadContinuationPointInvalid",
            Self::BAD_NO_MATCH => "BadNoMatch",
            Self::BAD_NOT_CONNECTED => "BadNotConnected",
            Self::BAD_CONNECTION_CLOSED => "BadConnectionClosed",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

// =============================================================================
// BrowseDirection
// =============================================================================

/// OPC UA browse direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowseDirection {
    /// Browse forward references.
    #[default]
    Forward,

    /// Browse inverse references.
    Inverse,

    /// Browse both forward and inverse references.
    Both,
}

impl BrowseDirection {
    /// Returns the OPC UA value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Forward => 0,
            Self::Inverse => 1,
            Self::Both => 2,
        }
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA bit mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from OPC UA value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }

    /// Combines classes into a node class mask.
    pub fn mask(classes: &[NodeClass]) -> u32 {
        classes.iter().fold(0, |mask, class| mask | class.value())
    }

    /// Returns `true` for ObjectType and VariableType.
    pub const fn is_type(&self) -> bool {
        matches!(self, Self::ObjectType | Self::VariableType)
    }

    /// Returns `true` for Object and Variable.
    pub const fn is_instance(&self) -> bool {
        matches!(self, Self::Object | Self::Variable)
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Variable => "Variable",
            Self::Method => "Method",
            Self::ObjectType => "ObjectType",
            Self::VariableType => "VariableType",
            Self::ReferenceType => "ReferenceType",
            Self::DataType => "DataType",
            Self::View => "View",
        }
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// AttributeId / TimestampsToReturn
// =============================================================================

/// OPC UA attribute IDs used by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// Node ID attribute.
    NodeId,
    /// Node class attribute.
    NodeClass,
    /// Browse name attribute.
    BrowseName,
    /// Display name attribute.
    DisplayName,
    /// Value attribute.
    #[default]
    Value,
    /// Data type attribute.
    DataType,
}

impl AttributeId {
    /// Returns the OPC UA numeric value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::NodeId => 1,
            Self::NodeClass => 2,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::Value => 13,
            Self::DataType => 14,
        }
    }
}

/// Which timestamps a read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampsToReturn {
    /// Source timestamp only.
    Source,
    /// Server timestamp only.
    Server,
    /// Both timestamps.
    Both,
    /// No timestamps.
    #[default]
    Neither,
}

// =============================================================================
// Tests
// =============================================================================

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the OPC UA bridge.
//!
//! The hierarchy mirrors the kinds of failure a caller of the bridge can
//! observe:
//!
//! ```text
//! OpcUaError
//! ├── Connection    - No session, discovery and endpoint selection failures
//! ├── Service       - A gateway service returned a non-good status
//! ├── Namespace     - Identity translation against the namespace cache failed
//! ├── Model         - The server's response shape disagreed with expectations
//! ├── Argument      - Caller supplied a null or empty required identifier
//! └── Configuration - Invalid or unreadable settings
//! ```
//!
//! Query-level operations (browse, translate, read) surface these errors to
//! their immediate caller without retrying. Connection establishment errors
//! are absorbed by the lifecycle retry loop and only appear in logs.
//!
//! # Examples
//!
//! ```
//! use uabridge_opcua::error::{OpcUaError, ErrorSeverity};
//! use uabridge_opcua::types::StatusCode;
//!
//! let error = OpcUaError::protocol_status("Browse", StatusCode::BAD_NODE_ID_UNKNOWN);
//! assert!(!error.is_retryable());
//! assert_eq!(error.severity(), ErrorSeverity::Error);
//! assert_eq!(error.error_code().to_string(), "UA-0201");
//! ```

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::Level;

use crate::types::{SecurityMode, StatusCode};

// =============================================================================
// OpcUaError
// =============================================================================

/// The main error type for bridge operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Session availability and connection establishment errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Non-good results from a gateway service call.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// Namespace translation errors.
    #[error("{0}")]
    Namespace(#[from] NamespaceError),

    /// Structural mismatches in server responses.
    #[error("{0}")]
    Model(#[from] ModelError),

    /// Invalid caller-supplied arguments.
    #[error("{0}")]
    Argument(#[from] ArgumentError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {

    /// Wraps a configuration failure.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// No session is available.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Creates a protocol status error for a gateway service.
    pub fn protocol_status(service: impl Into<String>, status: StatusCode) -> Self {
        Self::Service(ServiceError::ProtocolStatus {
            service: service.into(),
            status,
        })
    }

    /// Creates a transport error for a gateway service.
    pub fn transport(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service(ServiceError::Transport {
            service: service.into(),
            message: message.into(),
        })
    }

    /// Creates a semantic mismatch error.
    pub fn semantic_mismatch(message: impl Into<String>) -> Self {
        Self::Model(ModelError::SemanticMismatch {
            message: message.into(),
        })
    }

    /// Creates an invalid node class error.
    pub fn invalid_node_class(node_id: impl Into<String>, node_class: impl Into<String>) -> Self {
        Self::Model(ModelError::InvalidNodeClass {
            node_id: node_id.into(),
            node_class: node_class.into(),
        })
    }

    /// Creates an unknown namespace error.
    pub fn unknown_namespace(uri: impl Into<String>) -> Self {
        Self::Namespace(NamespaceError::UnknownNamespace { uri: uri.into() })
    }

    /// Creates an unknown namespace index error.
    pub fn unknown_namespace_index(index: u16) -> Self {
        Self::Namespace(NamespaceError::UnknownNamespaceIndex { index })
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Argument(ArgumentError::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        })
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is the result of a missing session.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::Connection(ConnectionError::NotConnected))
    }

    /// Returns the status code carried by a protocol status error.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Service(ServiceError::ProtocolStatus { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if repeating the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Service(e) => e.is_retryable(),
            Self::Namespace(_) | Self::Model(_) | Self::Argument(_) | Self::Configuration(_) => {
                false
            }
        }
    }

    /// Reporting severity, delegated to the inner error where it varies.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Service(_) => ErrorSeverity::Error,
            Self::Namespace(e) => e.severity(),
            Self::Model(_) => ErrorSeverity::Error,
            Self::Argument(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Service(_) => "service",
            Self::Namespace(_) => "namespace",
            Self::Model(_) => "model",
            Self::Argument(_) => "argument",
            Self::Configuration(_) => "configuration",
        }
    }

    /// `UA-CCNN` code; `CC` is the family, `NN` the variant.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Service(e) => e.error_code(),
            Self::Namespace(e) => e.error_code(),
            Self::Model(e) => e.error_code(),
            Self::Argument(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Suggestions printed next to the error by the CLI.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) => e.recovery_hints(),
            Self::Service(e) => e.recovery_hints(),
            Self::Namespace(e) => e.recovery_hints(),
            Self::Model(e) => e.recovery_hints(),
            Self::Argument(_) => vec!["Pass a non-null node id and browse name"],
            Self::Configuration(e) => e.recovery_hints(),
        }
    }

    /// Level used by [`log`](Self::log).
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Emits this error as a tracing event at its severity's level.
    ///
    /// `context` names the operation that failed, e.g. `"browse"`.
    pub fn log(&self, context: &str) {
        macro_rules! emit {
            ($macro:ident) => {
                tracing::$macro!(
                    code = %self.error_code(),
                    kind = self.category(),
                    op = context,
                    retryable = self.is_retryable(),
                    "{}",
                    self
                )
            };
        }

        match self.tracing_level() {
            Level::ERROR => emit!(error),
            Level::WARN => emit!(warn),
            Level::INFO => emit!(info),
            _ => emit!(debug),
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Session availability and connection establishment errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// An operation that needs a session was invoked while disconnected.
    #[error("Not connected to OPC UA server")]
    NotConnected,

    /// Endpoint discovery failed.
    #[error("Endpoint discovery failed for '{endpoint}': {reason}")]
    DiscoveryFailed {
        /// Discovery URL.
        endpoint: String,
        /// Failure description.
        reason: String,
    },

    /// No discovered endpoint offers the desired security mode.
    #[error("No endpoint at '{endpoint}' offers security mode '{security_mode}'")]
    NoMatchingEndpoint {
        /// Discovery URL.
        endpoint: String,
        /// Desired security mode.
        security_mode: SecurityMode,
    },

    /// Session connect was rejected.
    #[error("Session connect to '{endpoint}' failed: {reason}")]
    SessionFailed {
        /// Endpoint URL.
        endpoint: String,
        /// Failure description.
        reason: String,
    },

    /// The client is being torn down.
    #[error("Client is shutting down")]
    ShuttingDown,
}

impl ConnectionError {
    /// Creates a discovery failed error.
    pub fn discovery_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DiscoveryFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a no matching endpoint error.
    pub fn no_matching_endpoint(endpoint: impl Into<String>, security_mode: SecurityMode) -> Self {
        Self::NoMatchingEndpoint {
            endpoint: endpoint.into(),
            security_mode,
        }
    }

    /// Creates a session failed error.
    pub fn session_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SessionFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotConnected | Self::DiscoveryFailed { .. } | Self::SessionFailed { .. } => true,
            Self::NoMatchingEndpoint { .. } | Self::ShuttingDown => false,
        }
    }

    /// Reporting severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected => ErrorSeverity::Warning,
            Self::ShuttingDown => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// Stable diagnostic code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotConnected => ErrorCode::new(1, 1),
            Self::DiscoveryFailed { .. } => ErrorCode::new(1, 2),
            Self::NoMatchingEndpoint { .. } => ErrorCode::new(1, 3),
            Self::SessionFailed { .. } => ErrorCode::new(1, 4),
            Self::ShuttingDown => ErrorCode::new(1, 5),
        }
    }

    /// Suggestions for an operator.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::NotConnected => vec![
                "Wait for the connection lifecycle to reach Connected",
                "Check the server is reachable from this host",
            ],
            Self::DiscoveryFailed { .. } => vec![
                "Confirm the server answers GetEndpoints on the configured URL",
                "Check firewalls between this host and port 4840 (or the configured port)",
            ],
            Self::NoMatchingEndpoint { .. } => vec![
                "Check which security modes the server offers",
                "Adjust the configured security mode",
            ],
            Self::SessionFailed { .. } => vec![
                "Verify the username and password",
                "Check server logs for the rejection reason",
            ],
            Self::ShuttingDown => vec![],
        }
    }
}

// =============================================================================
// ServiceError
// =============================================================================

/// Errors returned by gateway service calls.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service (or a single result item) returned a non-good status.
    #[error("{service} returned {status}")]
    ProtocolStatus {
        /// Service name.
        service: String,
        /// Status code returned.
        status: StatusCode,
    },

    /// The underlying transport failed before a status was available.
    #[error("{service} failed: {message}")]
    Transport {
        /// Service name.
        service: String,
        /// Failure description.
        message: String,
    },
}

impl ServiceError {
    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProtocolStatus { status, .. } => status.is_communication_error(),
            Self::Transport { .. } => true,
        }
    }

    /// Stable diagnostic code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ProtocolStatus { .. } => ErrorCode::new(2, 1),
            Self::Transport { .. } => ErrorCode::new(2, 2),
        }
    }

    /// Suggestions for an operator.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::ProtocolStatus { .. } => vec![
                "Inspect the status code name for the exact cause",
                "Verify the node exists in the server address space",
            ],
            Self::Transport { .. } => vec!["Check network connectivity", "Retry the operation"],
        }
    }
}

// =============================================================================
// NamespaceError
// =============================================================================

/// Identity translation errors.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// The namespace URI is not present in the current session's table.
    #[error("Namespace '{uri}' is not exposed by the server")]
    UnknownNamespace {
        /// Namespace URI.
        uri: String,
    },

    /// The namespace index is not present in the current session's table.
    #[error("Namespace index {index} is not in the namespace table")]
    UnknownNamespaceIndex {
        /// Namespace index.
        index: u16,
    },
}

impl NamespaceError {
    /// Reporting severity.
    ///
    /// An unknown index means the session returned an index that its own
    /// namespace table does not contain.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::UnknownNamespace { .. } => ErrorSeverity::Warning,
            Self::UnknownNamespaceIndex { .. } => ErrorSeverity::Critical,
        }
    }

    /// Stable diagnostic code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnknownNamespace { .. } => ErrorCode::new(3, 1),
            Self::UnknownNamespaceIndex { .. } => ErrorCode::new(3, 2),
        }
    }

    /// Suggestions for an operator.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::UnknownNamespace { .. } => vec![
                "Check that the server loads the companion specification",
                "Compare the configured URI against the server namespace array",
            ],
            Self::UnknownNamespaceIndex { .. } => {
                vec!["Reconnect to rebuild the namespace cache"]
            }
        }
    }
}

// =============================================================================
// ModelError
// =============================================================================

/// Server responses whose shape disagrees with what the caller assumed.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Wrong result cardinality, wrong value type or similar.
    #[error("Semantic mismatch: {message}")]
    SemanticMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A node had a class that the operation does not accept.
    #[error("Invalid node class {node_class} for node '{node_id}'")]
    InvalidNodeClass {
        /// The node in question.
        node_id: String,
        /// The class that was read.
        node_class: String,
    },
}

impl ModelError {
    /// Stable diagnostic code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SemanticMismatch { .. } => ErrorCode::new(4, 1),
            Self::InvalidNodeClass { .. } => ErrorCode::new(4, 2),
        }
    }

    /// Suggestions for an operator.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::SemanticMismatch { .. } => vec!["Check the server's address space for modelling errors"],
            Self::InvalidNodeClass { .. } => {
                vec!["Type definitions must be ObjectType or VariableType nodes"]
            }
        }
    }
}

// =============================================================================
// ArgumentError
// =============================================================================

/// Invalid caller-supplied arguments.
#[derive(Debug, Error)]
pub enum ArgumentError {
    /// A required identifier was null or empty.
    #[error("Invalid argument '{argument}': {reason}")]
    InvalidArgument {
        /// Argument name.
        argument: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ArgumentError {
    /// Stable diagnostic code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument { .. } => ErrorCode::new(5, 1),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required field is missing.
    #[error("Missing required configuration field: '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// The endpoint URL is malformed.
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// Endpoint URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// A field has an invalid value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// A security mode string or number could not be parsed.
    #[error("Invalid security mode: '{value}'")]
    InvalidSecurityMode {
        /// The rejected value.
        value: String,
    },

    /// A node id string could not be parsed.
    #[error("Invalid node id '{value}': {reason}")]
    InvalidNodeId {
        /// The rejected value.
        value: String,
        /// Reason.
        reason: String,
    },

    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", path.display())]
    FileNotFound {
        /// File path.
        path: PathBuf,
    },

    /// The configuration file extension is not supported.
    #[error("Unsupported configuration format: '{extension}'")]
    UnsupportedFormat {
        /// File extension.
        extension: String,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration{}: {message}", path.as_ref().map(|p| format!(" '{}'", p.display())).unwrap_or_default())]
    Parse {
        /// File path, when loaded from disk.
        path: Option<PathBuf>,
        /// Parser message.
        message: String,
    },

    /// The configuration file could not be read.
    #[error("Failed to read configuration '{}': {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl ConfigurationError {
    /// A required setting is absent.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// The endpoint URL was rejected.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// A setting is out of range.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Unknown security mode name.
    pub fn invalid_security_mode(value: impl Into<String>) -> Self {
        Self::InvalidSecurityMode {
            value: value.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// The configuration path does not exist.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// The file could not be parsed.
    pub fn parse(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path,
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable diagnostic code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingField { .. } => ErrorCode::new(6, 1),
            Self::InvalidEndpoint { .. } => ErrorCode::new(6, 2),
            Self::InvalidValue { .. } => ErrorCode::new(6, 3),
            Self::InvalidSecurityMode { .. } => ErrorCode::new(6, 4),
            Self::InvalidNodeId { .. } => ErrorCode::new(6, 5),
            Self::FileNotFound { .. } => ErrorCode::new(6, 6),
            Self::UnsupportedFormat { .. } => ErrorCode::new(6, 7),
            Self::Parse { .. } => ErrorCode::new(6, 8),
            Self::Io { .. } => ErrorCode::new(6, 9),
        }
    }

    /// Suggestions for an operator.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::MissingField { .. } => vec!["Add the missing field to the configuration file"],
            Self::InvalidEndpoint { .. } => vec!["Use format: opc.tcp://hostname:port/path"],
            Self::InvalidSecurityMode { .. } => {
                vec!["Use 1/none, 2/sign or 3/sign_and_encrypt"]
            }
            Self::InvalidNodeId { .. } => vec!["Use format: ns=<index>;i=<number> or s=<name>"],
            Self::FileNotFound { .. } => vec!["Check the --config path"],
            Self::UnsupportedFormat { .. } => vec!["Use a .yaml, .yml, .toml or .json file"],
            _ => vec!["Review the configuration file"],
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// How serious an error is, mapped onto tracing levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected during normal operation.
    Info,
    /// Transient or caller-side problem.
    Warning,
    /// The operation failed.
    Error,
    /// The bridge cannot run as configured.
    Critical,
}

impl ErrorSeverity {
    /// Tracing level for events of this severity.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error => Level::ERROR,
            Self::Critical => Level::ERROR,
        }
    }

    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Error code rendered as `UA-CCNN` (category, code in hex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-6).
    pub category: u8,
    /// Variant within the family.
    pub code: u8,
}

impl ErrorCode {
    /// Builds `UA-{category}{code}`.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Family in the high byte, variant in the low byte.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result alias and context extension
// =============================================================================

/// Result type for bridge operations.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

/// Logs a failed result at debug level with the endpoint or node involved,
/// passing the error through untouched.
pub trait OpcUaErrorContext<T> {
    /// Tags a failure with the endpoint URL.
    fn with_endpoint(self, endpoint: &str) -> OpcUaResult<T>;

    /// Tags a failure with the node id.
    fn with_node(self, node_id: &str) -> OpcUaResult<T>;
}

impl<T> OpcUaErrorContext<T> for OpcUaResult<T> {
    fn with_endpoint(self, endpoint: &str) -> OpcUaResult<T> {
        self.map_err(|e| {
            tracing::debug!(%endpoint, code = %e.error_code(), "{}", e);
            e
        })
    }

    fn with_node(self, node_id: &str) -> OpcUaResult<T> {
        self.map_err(|e| {
            tracing::debug!(node = node_id, code = %e.error_code(), "{}", e);
            e
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

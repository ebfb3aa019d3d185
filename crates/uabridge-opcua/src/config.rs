// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bridge configuration.
//!
//! # Sections
//!
//! | Section                 | Purpose                                              |
//! |-------------------------|------------------------------------------------------|
//! | `opcua`                 | Endpoint, credentials, desired security mode         |
//! | `object_type_namespaces`| Namespace URIs whose types are modelled              |
//! | `namespace_information` | Per-namespace machine types and identification type  |
//! | `machines_filter`       | Optional allow-list of machine instances             |
//! | `connection`            | Retry backoff and idle polling                       |
//! | `type_tree`             | Type discovery root, reference type and bounds       |
//! | `browse`                | Supertype depth and continuation page cap            |
//! | `subscription`          | Data-change subscription parameters                  |
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders
//! 3. Parse YAML (via `config`), TOML or JSON
//! 4. Apply `UABRIDGE_OPCUA_*` environment overrides
//! 5. Validate
//!
//! # Example
//!
//! ```yaml
//! opcua:
//!   endpoint: "opc.tcp://localhost:4840"
//!   security_mode: sign
//!   username: "${UA_USER:}"
//!   password: "${UA_PASSWORD:}"
//! object_type_namespaces:
//!   - "http://opcfoundation.org/UA/MachineTool/"
//! connection:
//!   strategy: exponential
//!   base_delay: 500ms
//!   max_delay: 30s
//! ```

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::client::gateway::ConnectInfo;
use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};
use crate::supertype::DEFAULT_MAX_SUPERTYPE_DEPTH;
use crate::type_tree::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES};
use crate::types::{ids, PortableNodeId, SecurityMode};

// =============================================================================
// BridgeConfig
// =============================================================================

/// Root configuration of the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Server connection.
    pub opcua: OpcUaConfig,

    /// Namespace URIs whose object types are discovered and flattened.
    #[serde(default)]
    pub object_type_namespaces: Vec<String>,

    /// Companion-specification details per namespace.
    #[serde(default)]
    pub namespace_information: Vec<NamespaceInformation>,

    /// Machine instances to restrict to. Empty means all.
    #[serde(default)]
    pub machines_filter: Vec<PortableNodeId>,

    /// Retry behaviour of the connection loop.
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Type discovery parameters.
    #[serde(default)]
    pub type_tree: TypeTreeSettings,

    /// Browse parameters.
    #[serde(default)]
    pub browse: BrowseSettings,

    /// Data-change subscription parameters.
    #[serde(default)]
    pub subscription: SubscriptionSettings,
}

impl BridgeConfig {
    /// Creates a configuration with defaults for everything but the server.
    pub fn new(opcua: OpcUaConfig) -> Self {
        Self {
            opcua,
            object_type_namespaces: Vec::new(),
            namespace_information: Vec::new(),
            machines_filter: Vec::new(),
            connection: ConnectionSettings::default(),
            type_tree: TypeTreeSettings::default(),
            browse: BrowseSettings::default(),
            subscription: SubscriptionSettings::default(),
        }
    }

    /// Adds a namespace of interest.
    pub fn with_namespace(mut self, uri: impl Into<String>) -> Self {
        self.object_type_namespaces.push(uri.into());
        self
    }

    /// Replaces the connection settings.
    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    /// Replaces the type-tree settings.
    pub fn with_type_tree(mut self, type_tree: TypeTreeSettings) -> Self {
        self.type_tree = type_tree;
        self
    }

    /// Validates every section.
    pub fn validate(&self) -> OpcUaResult<()> {
        self.opcua.validate()?;

        if let Some(uri) = self.object_type_namespaces.iter().find(|u| u.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "object_type_namespaces",
                format!("empty namespace URI '{}'", uri),
            )
            .into());
        }

        for info in &self.namespace_information {
            if info.namespace.trim().is_empty() {
                return Err(ConfigurationError::missing_field("namespace_information.namespace").into());
            }
        }

        self.connection.validate()?;
        self.type_tree.validate()?;
        self.browse.validate()?;
        Ok(())
    }
}

/// Companion-specification details for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInformation {
    /// Namespace URI.
    pub namespace: String,

    /// Machine types declared by the namespace.
    #[serde(default)]
    pub types: Vec<PortableNodeId>,

    /// Type of the identification object of a machine.
    #[serde(default)]
    pub identification_type: PortableNodeId,
}

// =============================================================================
// OpcUaConfig
// =============================================================================

/// OPC UA server connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpcUaConfig {
    /// Discovery URL, `opc.tcp://host:port[/path]`.
    pub endpoint: String,

    /// User name. Anonymous when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password, required together with `username`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Desired message security mode. The first discovered endpoint with
    /// this mode is used.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Skip server certificate verification.
    #[serde(default)]
    pub bypass_cert_verification: bool,

    /// Application name announced to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Application URI.
    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    /// Product URI.
    #[serde(default = "default_product_uri")]
    pub product_uri: String,

    /// Session name.
    #[serde(default = "default_session_name")]
    pub session_name: String,

    /// Timeout for individual service requests.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// PKI directory for the client certificate store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pki_dir: Option<PathBuf>,
}

fn default_application_name() -> String {
    "KonI4.0 OPC UA Data Client".to_string()
}

fn default_application_uri() -> String {
    "http://dashboard.umati.app/OPCUA_DataClient".to_string()
}

fn default_product_uri() -> String {
    "KonI40OpcUaClient_Product".to_string()
}

fn default_session_name() -> String {
    "DefaultSession".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

impl OpcUaConfig {
    /// Starts an empty builder.
    pub fn builder() -> OpcUaConfigBuilder {
        OpcUaConfigBuilder::default()
    }

    /// Creates an anonymous, unsecured configuration for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Rejects endpoints, timeouts and credentials the client cannot use.
    pub fn validate(&self) -> OpcUaResult<()> {
        if self.endpoint.is_empty() {
            return Err(ConfigurationError::missing_field("endpoint").into());
        }

        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(ConfigurationError::invalid_endpoint(
                &self.endpoint,
                "only the opc.tcp scheme is supported",
            )
            .into());
        }

        let has_user = self.username.as_deref().is_some_and(|u| !u.is_empty());
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        if has_user != has_password {
            return Err(ConfigurationError::invalid_value(
                "username/password",
                "username and password must be set together",
            )
            .into());
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "request_timeout",
                "request timeout cannot be zero",
            )
            .into());
        }

        if self.session_timeout.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "session_timeout",
                "session timeout cannot be zero",
            )
            .into());
        }

        Ok(())
    }

    /// Returns `true` if user credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Returns the session creation parameters.
    pub fn connect_info(&self) -> ConnectInfo {
        ConnectInfo {
            application_name: self.application_name.clone(),
            application_uri: self.application_uri.clone(),
            product_uri: self.product_uri.clone(),
            session_name: self.session_name.clone(),
            session_timeout: self.session_timeout,
            request_timeout: self.request_timeout,
            bypass_cert_verification: self.bypass_cert_verification,
        }
    }
}

impl Default for OpcUaConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: None,
            password: None,
            security_mode: SecurityMode::default(),
            bypass_cert_verification: false,
            application_name: default_application_name(),
            application_uri: default_application_uri(),
            product_uri: default_product_uri(),
            session_name: default_session_name(),
            request_timeout: default_request_timeout(),
            session_timeout: default_session_timeout(),
            pki_dir: None,
        }
    }
}

impl fmt::Debug for OpcUaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcUaConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("security_mode", &self.security_mode)
            .field("bypass_cert_verification", &self.bypass_cert_verification)
            .field("application_name", &self.application_name)
            .field("application_uri", &self.application_uri)
            .field("product_uri", &self.product_uri)
            .field("session_name", &self.session_name)
            .field("request_timeout", &self.request_timeout)
            .field("session_timeout", &self.session_timeout)
            .field("pki_dir", &self.pki_dir)
            .finish()
    }
}

// =============================================================================
// OpcUaConfigBuilder
// =============================================================================

/// Fluent construction of an [`OpcUaConfig`]; unset fields take defaults.
#[derive(Debug, Default)]
pub struct OpcUaConfigBuilder {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    security_mode: Option<SecurityMode>,
    bypass_cert_verification: Option<bool>,
    application_name: Option<String>,
    application_uri: Option<String>,
    product_uri: Option<String>,
    session_name: Option<String>,
    request_timeout: Option<Duration>,
    session_timeout: Option<Duration>,
    pki_dir: Option<PathBuf>,
}

impl OpcUaConfigBuilder {
    /// Discovery URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// User-name identity instead of anonymous.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the desired security mode.
    pub fn security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = Some(mode);
        self
    }

    /// Skips server certificate verification.
    pub fn bypass_cert_verification(mut self, bypass: bool) -> Self {
        self.bypass_cert_verification = Some(bypass);
        self
    }

    /// Name announced in the session's application description.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Application URI; must match the client certificate when signing.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.application_uri = Some(uri.into());
        self
    }

    /// Sets the product URI.
    pub fn product_uri(mut self, uri: impl Into<String>) -> Self {
        self.product_uri = Some(uri.into());
        self
    }

    /// Session name shown in server diagnostics.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Per-service-call timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Requested session lifetime.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Directory holding the client certificate store.
    pub fn pki_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pki_dir = Some(dir.into());
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> OpcUaResult<OpcUaConfig> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| OpcUaError::configuration(ConfigurationError::missing_field("endpoint")))?;

        let config = OpcUaConfig {
            endpoint,
            username: self.username,
            password: self.password,
            security_mode: self.security_mode.unwrap_or_default(),
            bypass_cert_verification: self.bypass_cert_verification.unwrap_or(false),
            application_name: self.application_name.unwrap_or_else(default_application_name),
            application_uri: self.application_uri.unwrap_or_else(default_application_uri),
            product_uri: self.product_uri.unwrap_or_else(default_product_uri),
            session_name: self.session_name.unwrap_or_else(default_session_name),
            request_timeout: self.request_timeout.unwrap_or_else(default_request_timeout),
            session_timeout: self.session_timeout.unwrap_or_else(default_session_timeout),
            pki_dir: self.pki_dir,
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// RetryStrategy / ConnectionSettings
// =============================================================================

/// Strategy for delays between failed connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Fixed delay between attempts.
    Fixed,

    /// `base_delay * (attempt + 1)`.
    Linear,

    /// `base_delay` doubled per attempt.
    #[default]
    Exponential,
}

impl RetryStrategy {
    /// Calculates the delay for a given zero-based attempt.
    pub fn delay(&self, base_delay: Duration, attempt: u32) -> Duration {
        let factor = match self {
            Self::Fixed => 1,
            Self::Linear => attempt.saturating_add(1),
            Self::Exponential => 2u32.saturating_pow(attempt),
        };
        base_delay.checked_mul(factor).unwrap_or(Duration::MAX)
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "Fixed"),
            Self::Linear => write!(f, "Linear"),
            Self::Exponential => write!(f, "Exponential"),
        }
    }
}

/// Connection loop settings.
///
/// The loop retries for as long as the client runs; there is no attempt
/// limit. `Fixed` with a zero `base_delay` retries back-to-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Backoff strategy.
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Delay after the first failed attempt.
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound for any backoff delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Poll interval while connected.
    #[serde(default = "default_idle_interval", with = "humantime_serde")]
    pub idle_interval: Duration,
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_idle_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            idle_interval: default_idle_interval(),
        }
    }
}

impl ConnectionSettings {
    /// Constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: RetryStrategy::Fixed,
            base_delay: delay,
            max_delay: delay,
            ..Default::default()
        }
    }

    /// Sets the idle poll interval.
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Calculates the delay after the given zero-based failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.strategy.delay(self.base_delay, attempt).min(self.max_delay)
    }

    fn validate(&self) -> OpcUaResult<()> {
        if self.max_delay < self.base_delay {
            return Err(ConfigurationError::invalid_value(
                "connection.max_delay",
                "max_delay must not be smaller than base_delay",
            )
            .into());
        }
        if self.idle_interval.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "connection.idle_interval",
                "idle_interval must be greater than 0",
            )
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// TypeTreeSettings / BrowseSettings
// =============================================================================

/// Type discovery parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeTreeSettings {
    /// Node the discovery starts at.
    #[serde(default = "default_root_type")]
    pub root_type: PortableNodeId,

    /// Reference type followed, subtypes included.
    #[serde(default = "default_tree_reference_type")]
    pub reference_type: PortableNodeId,

    /// Deepest level expanded below the root.
    #[serde(default = "default_tree_max_depth")]
    pub max_depth: usize,

    /// Total node ceiling.
    #[serde(default = "default_tree_max_nodes")]
    pub max_nodes: usize,
}

fn default_root_type() -> PortableNodeId {
    PortableNodeId::ns0(ids::BASE_OBJECT_TYPE)
}

fn default_tree_reference_type() -> PortableNodeId {
    PortableNodeId::ns0(ids::HIERARCHICAL_REFERENCES)
}

fn default_tree_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_tree_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}

impl Default for TypeTreeSettings {
    fn default() -> Self {
        Self {
            root_type: default_root_type(),
            reference_type: default_tree_reference_type(),
            max_depth: default_tree_max_depth(),
            max_nodes: default_tree_max_nodes(),
        }
    }
}

impl TypeTreeSettings {
    fn validate(&self) -> OpcUaResult<()> {
        if self.root_type.is_null() {
            return Err(ConfigurationError::missing_field("type_tree.root_type").into());
        }
        if self.reference_type.is_null() {
            return Err(ConfigurationError::missing_field("type_tree.reference_type").into());
        }
        if self.max_depth == 0 || self.max_nodes == 0 {
            return Err(ConfigurationError::invalid_value(
                "type_tree",
                "max_depth and max_nodes must be greater than 0",
            )
            .into());
        }
        Ok(())
    }
}

/// Browse parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseSettings {
    /// Upward hops tried before a subtype check gives up.
    #[serde(default = "default_max_supertype_depth")]
    pub max_supertype_depth: u32,

    /// Continuation pages followed per browse.
    #[serde(default = "default_max_browse_pages")]
    pub max_browse_pages: usize,
}

fn default_max_supertype_depth() -> u32 {
    DEFAULT_MAX_SUPERTYPE_DEPTH
}

fn default_max_browse_pages() -> usize {
    64
}

impl Default for BrowseSettings {
    fn default() -> Self {
        Self {
            max_supertype_depth: default_max_supertype_depth(),
            max_browse_pages: default_max_browse_pages(),
        }
    }
}

impl BrowseSettings {
    fn validate(&self) -> OpcUaResult<()> {
        if self.max_browse_pages == 0 {
            return Err(ConfigurationError::invalid_value(
                "browse.max_browse_pages",
                "at least one page must be allowed",
            )
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// SubscriptionSettings
// =============================================================================

/// Parameters of the subscription that carries data-change monitoring.
///
/// Controls how the data-change subscription is created and how monitored
/// items are sampled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval", with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Sampling interval requested for monitored items.
    #[serde(default = "default_sampling_interval", with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Publishing intervals without a publish request before the server drops the subscription.
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Max keep-alive count.
    #[serde(default = "default_keepalive_count")]
    pub keepalive_count: u32,

    /// Cap on notifications per publish response, 0 for no cap.
    #[serde(default = "default_max_notifications")]
    pub max_notifications_per_publish: u32,

    /// Relative priority among this client's subscriptions.
    #[serde(default)]
    pub priority: u8,

    /// Publishing enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_lifetime_count() -> u32 {
    60
}

fn default_keepalive_count() -> u32 {
    10
}

fn default_max_notifications() -> u32 {
    65535
}

fn default_true() -> bool {
    true
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            sampling_interval: default_sampling_interval(),
            lifetime_count: default_lifetime_count(),
            keepalive_count: default_keepalive_count(),
            max_notifications_per_publish: default_max_notifications(),
            priority: 0,
            publishing_enabled: true,
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads a [`BridgeConfig`] from YAML, TOML or JSON.
///
/// # Examples
///
/// ```no_run
/// use uabridge_opcua::config::ConfigLoader;
///
/// let config = ConfigLoader::new().load("uabridge.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a loader with the `UABRIDGE` override prefix.
    pub fn new() -> Self {
        Self {
            env_prefix: "UABRIDGE".to_string(),
            resolve_env_vars: true,
        }
    }

    /// Prefix of variables that override file settings.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholder resolution and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads and validates the configuration at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> OpcUaResult<BridgeConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;

        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(&content)
        } else {
            content
        };

        let mut config: BridgeConfig = parse_str(&content, format).map_err(|e| match e {
            OpcUaError::Configuration(ConfigurationError::Parse { path: None, message }) => {
                ConfigurationError::parse(Some(path.to_path_buf()), message).into()
            }
            other => other,
        })?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config);
        }

        config.validate()?;

        info!(
            endpoint = %config.opcua.endpoint,
            namespaces = config.object_type_namespaces.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads and validates configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> OpcUaResult<BridgeConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)
        } else {
            content.to_string()
        };

        let mut config: BridgeConfig = parse_str(&content, format)?;
        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config);
        }

        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> OpcUaResult<String> {
        if !path.exists() {
            return Err(ConfigurationError::file_not_found(path).into());
        }

        fs::read_to_string(path).map_err(|e| ConfigurationError::io(path, e).into())
    }

    /// Resolves `${VAR_NAME}` and `${VAR_NAME:default}` placeholders.
    fn resolve_env_placeholders(&self, content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut var_content = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_content.push(c);
            }

            if !found_close {
                result.push_str("${");
                result.push_str(&var_content);
                continue;
            }

            let (var_name, default_value) = match var_content.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (var_content.as_str(), None),
            };

            match (env::var(var_name), default_value) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default),
                (Err(_), None) => {
                    warn!(variable = var_name, "Environment variable not found");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        }

        result
    }

    fn apply_env_overrides(&self, config: &mut BridgeConfig) {
        let var = |suffix: &str| env::var(format!("{}_OPCUA_{}", self.env_prefix, suffix)).ok();

        if let Some(endpoint) = var("ENDPOINT") {
            debug!(endpoint = %endpoint, "Endpoint overridden from environment");
            config.opcua.endpoint = endpoint;
        }
        if let Some(username) = var("USERNAME") {
            debug!("Username overridden from environment");
            config.opcua.username = Some(username);
        }
        if let Some(password) = var("PASSWORD") {
            debug!("Password overridden from environment");
            config.opcua.password = Some(password);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Formats accepted by [`ConfigLoader`], chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Picks the format from the extension of `path`.
    pub fn from_path(path: &Path) -> OpcUaResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigurationError::UnsupportedFormat {
                extension: other.to_string(),
            }
            .into()),
            None => Err(ConfigurationError::UnsupportedFormat {
                extension: "(no extension)".to_string(),
            }
            .into()),
        }
    }

    /// Canonical extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> OpcUaResult<T> {
    let parsed = match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigurationError::parse(None, message).into())
}

/// YAML parsing through the `config` crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> Result<T, String> {
    config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| e.to_string())
}

/// Loads `path` with `${VAR}` expansion and `UABRIDGE_` overrides.
pub fn load_config(path: impl AsRef<Path>) -> OpcUaResult<BridgeConfig> {
    ConfigLoader::new().load(path)
}

// =============================================================================
// Serde helpers
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
opcua:
  endpoint: "opc.tcp://localhost:4840"
  security_mode: sign
  username: operator
  password: secret
object_type_namespaces:
  - "http://opcfoundation.org/UA/MachineTool/"
  - "http://opcfoundation.org/UA/Woodworking/"
namespace_information:
  - namespace: "http://opcfoundation.org/UA/MachineTool/"
    types:
      - namespace_uri: "http://opcfoundation.org/UA/MachineTool/"
        identifier: "i=13"
    identification_type:
      uri: "http://opcfoundation.org/UA/MachineTool/"
      id: "i=11"
connection:
  strategy: linear
  base_delay: 250ms
  max_delay: 5s
type_tree:
  max_depth: 8
subscription:
  publishing_interval: 500ms
"#;

    #[test]
    fn test_load_yaml() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = ConfigLoader::new()
            .with_env_prefix("UABRIDGE_TEST_YAML")
            .load(file.path())
            .unwrap();

        assert_eq!(config.opcua.endpoint, "opc.tcp://localhost:4840");
        assert_eq!(config.opcua.security_mode, SecurityMode::Sign);
        assert_eq!(config.opcua.session_name, "DefaultSession");
        assert_eq!(config.object_type_namespaces.len(), 2);
        assert_eq!(config.namespace_information[0].types[0].identifier.to_string(), "i=13");
        assert_eq!(
            config.namespace_information[0].identification_type,
            PortableNodeId::numeric("http://opcfoundation.org/UA/MachineTool/", 11)
        );
        assert_eq!(config.connection.strategy, RetryStrategy::Linear);
        assert_eq!(config.connection.base_delay, Duration::from_millis(250));
        assert_eq!(config.type_tree.max_depth, 8);
        assert_eq!(config.type_tree.max_nodes, DEFAULT_MAX_NODES);
        assert_eq!(config.type_tree.root_type, PortableNodeId::ns0(58));
        assert_eq!(config.browse.max_supertype_depth, 100);
        assert_eq!(config.subscription.publishing_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_load_toml_and_json() {
        let toml = r#"
object_type_namespaces = ["http://x/UA/"]

[opcua]
endpoint = "opc.tcp://plc:4840"
security_mode = 3
"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(toml, ConfigFormat::Toml)
            .unwrap();
        assert_eq!(config.opcua.security_mode, SecurityMode::SignAndEncrypt);

        let json = r#"{"opcua": {"endpoint": "opc.tcp://plc:4840", "request_timeout": "2s"}}"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.opcua.request_timeout, Duration::from_secs(2));
        assert!(config.object_type_namespaces.is_empty());
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.TOML")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")).unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path(Path::new("a.txt")).is_err());
        assert!(ConfigFormat::from_path(Path::new("config")).is_err());
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("user: ${UABRIDGE_NONEXISTENT_VAR:guest}");
        assert_eq!(result, "user: guest");

        let result = loader.resolve_env_placeholders("user: ${UABRIDGE_NONEXISTENT_VAR}");
        assert_eq!(result, "user: ${UABRIDGE_NONEXISTENT_VAR}");

        let result = loader.resolve_env_placeholders("cost: $5 ${unterminated");
        assert_eq!(result, "cost: $5 ${unterminated");
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("UABRIDGE_TEST_OVR_OPCUA_ENDPOINT", "opc.tcp://override:4840");
        let config = ConfigLoader::new()
            .with_env_prefix("UABRIDGE_TEST_OVR")
            .load_from_str("opcua:\n  endpoint: \"opc.tcp://file:4840\"\n", ConfigFormat::Yaml)
            .unwrap();
        env::remove_var("UABRIDGE_TEST_OVR_OPCUA_ENDPOINT");

        assert_eq!(config.opcua.endpoint, "opc.tcp://override:4840");
    }

    #[test]
    fn test_file_not_found() {
        let err = ConfigLoader::new().load("/nonexistent/uabridge.yaml").unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Configuration(ConfigurationError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_parse_error_carries_path() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = ConfigLoader::new().load(file.path()).unwrap_err();
        match err {
            OpcUaError::Configuration(ConfigurationError::Parse { path, .. }) => {
                assert_eq!(path.as_deref(), Some(file.path()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = OpcUaConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .build()
            .unwrap();

        assert_eq!(config.application_name, "KonI4.0 OPC UA Data Client");
        assert_eq!(config.application_uri, "http://dashboard.umati.app/OPCUA_DataClient");
        assert_eq!(config.product_uri, "KonI40OpcUaClient_Product");
        assert_eq!(config.security_mode, SecurityMode::None);
        assert!(!config.has_credentials());

        let info = config.connect_info();
        assert_eq!(info.session_name, "DefaultSession");
    }

    #[test]
    fn test_builder_validation() {
        assert!(OpcUaConfig::builder().build().is_err());
        assert!(OpcUaConfig::builder().endpoint("http://localhost").build().is_err());
        assert!(OpcUaConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .credentials("user", "")
            .build()
            .is_err());
        assert!(OpcUaConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .session_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(OpcUaConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .credentials("user", "pass")
            .build()
            .unwrap()
            .has_credentials());
    }

    #[test]
    fn test_password_hidden_in_debug() {
        let config = OpcUaConfig::builder()
            .endpoint("opc.tcp://localhost:4840")
            .credentials("user", "hunter2")
            .build()
            .unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_retry_delays() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(settings.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(settings.delay_for_attempt(40), Duration::from_secs(30));

        let linear = ConnectionSettings {
            strategy: RetryStrategy::Linear,
            ..Default::default()
        };
        assert_eq!(linear.delay_for_attempt(2), Duration::from_millis(1500));

        let busy = ConnectionSettings::fixed(Duration::ZERO);
        assert_eq!(busy.delay_for_attempt(7), Duration::ZERO);
    }

    #[test]
    fn test_bridge_validation() {
        let mut config = BridgeConfig::new(OpcUaConfig::new("opc.tcp://localhost:4840"));
        assert!(config.validate().is_ok());

        config.type_tree.max_depth = 0;
        assert!(config.validate().is_err());

        let config = BridgeConfig::new(OpcUaConfig::new("opc.tcp://localhost:4840")).with_namespace(" ");
        assert!(config.validate().is_err());
    }
}

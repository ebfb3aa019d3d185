// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Namespace-portable OPC UA bridge.
//!
//! This crate connects to an OPC UA server, discovers the object and variable
//! types of the namespaces of interest and answers instance-level queries
//! against that type model. Node identities handed to callers carry the
//! namespace URI instead of the session-local index, so they stay valid
//! across reconnects and servers.
//!
//! # Components
//!
//! - [`namespace::NamespaceIndexCache`]: URI to index mapping of the current session
//! - [`translator::NodeIdentityTranslator`]: portable to session node ids and back
//! - [`supertype::SupertypeResolver`]: memoized subtype checks
//! - [`type_tree::TypeTreeBuilder`]: bounded type hierarchy discovery
//! - [`type_map::TypeMapFlattener`]: one merged entry per type name
//! - [`browse::BrowseResultProjector`]: type-filtered browse results
//! - [`client::BridgeClient`]: connection lifecycle and the query API
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Not connected, discovery, endpoint and session failures
//! ├── Service       - Bad service status, transport failures
//! ├── Namespace     - Unknown namespace URI or index
//! ├── Model         - Semantic mismatch, invalid node class
//! ├── Argument      - Null or empty caller input
//! └── Configuration - Invalid settings
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use uabridge_opcua::client::{BridgeClient, LifecycleState, OpcUaGateway, Platform};
//! use uabridge_opcua::config::load_config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("uabridge.yaml")?;
//!     let gateway = Arc::new(OpcUaGateway::new(&config.opcua));
//!
//!     let client = BridgeClient::new(config, gateway, &Platform::new())?;
//!     client.start();
//!     client.wait_for_state(LifecycleState::Connected, Duration::from_secs(30)).await;
//!
//!     for (uri, _) in client.found_namespaces().await? {
//!         println!("{}: {:?}", uri, client.type_map(&uri).await?);
//!     }
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod browse;
pub mod client;
pub mod config;
pub mod error;
pub mod namespace;
pub mod supertype;
pub mod translator;
pub mod type_map;
pub mod type_tree;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{
    ArgumentError, ConfigurationError, ConnectionError, ErrorCode, ErrorSeverity, ModelError,
    NamespaceError, OpcUaError, OpcUaErrorContext, OpcUaResult, ServiceError,
};

pub use types::{
    AttributeId, BrowseDirection, BrowseResult, NodeClass, NodeId, NodeIdentifier,
    PortableNodeId, PortableQualifiedName, QualifiedName, SecurityMode, StatusCode,
    TimestampsToReturn,
};

pub use config::{
    load_config, BridgeConfig, BrowseSettings, ConfigFormat, ConfigLoader, ConnectionSettings,
    NamespaceInformation, OpcUaConfig, OpcUaConfigBuilder, RetryStrategy, SubscriptionSettings,
    TypeTreeSettings,
};

pub use namespace::NamespaceIndexCache;
pub use supertype::{SupertypeCache, SupertypeResolver};
pub use translator::NodeIdentityTranslator;
pub use type_map::{FlattenedAttribute, FlattenedType, TypeMap, TypeMapFlattener};
pub use type_tree::{TreeLimits, TypeNode, TypeTree, TypeTreeBuilder};

pub use browse::{BrowseContext, BrowseResultProjector};

pub use client::{
    BridgeClient, ConnectionStatus, DataValue, LifecycleState, Platform, SessionGateway,
    ValueSubscriptionHandle, Variant,
};

#[cfg(feature = "real-gateway")]
pub use client::OpcUaGateway;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

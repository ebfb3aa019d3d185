// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        BridgeClient                             │
//! │        (browse / translate / read_values / subscribe)           │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       ClientCore                                │
//! │   (lifecycle state, retry loop, status events, session model)   │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     SessionGateway                              │
//! │         (OpcUaGateway with feature `real-gateway`)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod bridge;
mod conversion;
pub mod gateway;
mod lifecycle;
mod platform;
pub mod subscription;

#[cfg(feature = "real-gateway")]
mod real_gateway;

pub use bridge::BridgeClient;
pub use conversion::{data_value_to_json, variant_to_json, Quality};
pub use gateway::{
    BrowsePage, BrowsePath, BrowsePathResult, BrowsePathTarget, ConnectInfo, ConnectionStatus,
    DataChangeCallback, DataValue, EndpointDescription, IdentityToken, ReadValueId,
    ReferenceDescription, RelativePathElement, SessionGateway, StatusReceiver, StatusSender,
    Variant,
};
pub use lifecycle::{select_endpoint, LifecycleState, SessionModel};
pub use platform::{Platform, PlatformGuard};
pub use subscription::{ValueCallback, ValueSubscriptionHandle};

#[cfg(feature = "real-gateway")]
pub use real_gateway::OpcUaGateway;

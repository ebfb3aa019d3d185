// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value subscriptions that outlive sessions.
//!
//! Subscriptions are registered by [`PortableNodeId`]. The session-local
//! monitored item is created when a session is available and re-created on
//! every reconnect, so a caller's handle stays valid across reconnects.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::OpcUaResult;
use crate::types::PortableNodeId;

use super::conversion::data_value_to_json;
use super::gateway::DataChangeCallback;
use super::lifecycle::ClientCore;

/// Callback receiving each new value as JSON.
pub type ValueCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Server-side identity of a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitoredItemRef {
    /// Subscription the item belongs to.
    pub subscription_id: u32,
    /// Monitored item id.
    pub monitored_item_id: u32,
}

/// A registered value subscription.
#[derive(Clone)]
pub struct SubscriptionEntry {
    /// Registration id.
    pub id: Uuid,
    /// Subscribed node.
    pub node_id: PortableNodeId,
    /// Value callback.
    pub callback: ValueCallback,
    /// Monitored item in the current session, if created.
    pub monitored: Option<MonitoredItemRef>,
}

impl SubscriptionEntry {
    /// Returns a gateway callback converting each data change to JSON.
    pub fn data_change_callback(&self) -> DataChangeCallback {
        let callback = self.callback.clone();
        Arc::new(move |value| callback(data_value_to_json(&value)))
    }
}

impl fmt::Debug for SubscriptionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionEntry")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("monitored", &self.monitored)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// SubscriptionRegistry
// =============================================================================

/// All value subscriptions of one client.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<Uuid, SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription and returns its entry.
    pub fn register(&self, node_id: PortableNodeId, callback: ValueCallback) -> SubscriptionEntry {
        let entry = SubscriptionEntry {
            id: Uuid::new_v4(),
            node_id,
            callback,
            monitored: None,
        };
        self.entries.lock().insert(entry.id, entry.clone());
        tracing::debug!(subscription = %entry.id, node_id = %entry.node_id, "Subscription registered");
        entry
    }

    /// Records the monitored item created for `id`.
    ///
    /// Returns `false` if the subscription was removed in the meantime.
    pub fn set_monitored(&self, id: Uuid, monitored: MonitoredItemRef) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(entry) => {
                entry.monitored = Some(monitored);
                true
            }
            None => false,
        }
    }

    /// Removes a subscription.
    pub fn remove(&self, id: Uuid) -> Option<SubscriptionEntry> {
        self.entries.lock().remove(&id)
    }

    /// Forgets every monitored item. Called when a session ends.
    pub fn reset_session_state(&self) {
        for entry in self.entries.lock().values_mut() {
            entry.monitored = None;
        }
    }

    /// Returns a snapshot of all entries.
    pub fn snapshot(&self) -> Vec<SubscriptionEntry> {
        self.entries.lock().values().cloned().collect()
    }

    /// Returns the number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// =============================================================================
// ValueSubscriptionHandle
// =============================================================================

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to end it.
pub struct ValueSubscriptionHandle {
    id: Uuid,
    node_id: PortableNodeId,
    core: Weak<ClientCore>,
}

impl ValueSubscriptionHandle {
    pub(crate) fn new(id: Uuid, node_id: PortableNodeId, core: Weak<ClientCore>) -> Self {
        Self { id, node_id, core }
    }

    /// Returns the registration id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the subscribed node.
    pub fn node_id(&self) -> &PortableNodeId {
        &self.node_id
    }

    /// Ends the subscription and deletes its monitored item, if any.
    pub async fn unsubscribe(self) -> OpcUaResult<()> {
        match self.core.upgrade() {
            Some(core) => core.unsubscribe(self.id).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ValueSubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSubscriptionHandle")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::gateway::{DataValue, Variant};
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_register_and_reset() {
        let registry = SubscriptionRegistry::new();
        let entry = registry.register(PortableNodeId::numeric("http://x/UA/", 6001), Arc::new(|_| {}));

        let item = MonitoredItemRef {
            subscription_id: 1,
            monitored_item_id: 7,
        };
        assert!(registry.set_monitored(entry.id, item));
        assert_eq!(registry.snapshot()[0].monitored, Some(item));

        registry.reset_session_state();
        assert_eq!(registry.snapshot()[0].monitored, None);

        assert!(registry.remove(entry.id).is_some());
        assert!(!registry.set_monitored(entry.id, item));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_data_change_callback_converts() {
        let seen = Arc::new(AtomicI64::new(0));
        let registry = SubscriptionRegistry::new();
        let entry = {
            let seen = seen.clone();
            registry.register(
                PortableNodeId::numeric("http://x/UA/", 6001),
                Arc::new(move |value| {
                    seen.store(value.as_i64().unwrap_or(-1), Ordering::SeqCst);
                }),
            )
        };

        let callback = entry.data_change_callback();
        callback(DataValue::good(Variant::Int32(42)));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subtype resolution by walking `HasSubtype` upward.
//!
//! Every upward hop costs a NodeClass read plus an inverse browse, so each
//! hop is memoized in a [`SupertypeCache`]. The cache holds session-local
//! node ids and is cleared together with the namespace cache on every
//! reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::browse::{browse_all, read_node_class, BrowseContext};
use crate::client::gateway::SessionGateway;
use crate::error::{OpcUaError, OpcUaResult};
use crate::types::NodeId;

/// Default bound on upward hops.
pub const DEFAULT_MAX_SUPERTYPE_DEPTH: u32 = 100;

// =============================================================================
// SupertypeCache
// =============================================================================

/// Memoized single-hop supertype lookups for one session.
///
/// `None` records a hierarchy root (or an ambiguous node treated as one).
#[derive(Debug, Default)]
pub struct SupertypeCache {
    entries: Mutex<HashMap<NodeId, Option<NodeId>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SupertypeCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached hop for `node`, counting hits and misses.
    pub fn get(&self, node: &NodeId) -> Option<Option<NodeId>> {
        let entry = self.entries.lock().get(node).cloned();
        match entry {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        entry
    }

    /// Records the hop for `node`.
    pub fn insert(&self, node: NodeId, supertype: Option<NodeId>) {
        self.entries.lock().insert(node, supertype);
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&mut self) {
        self.entries.get_mut().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Returns the number of cached hops.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns `(hits, misses)` since the last clear.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

// =============================================================================
// SupertypeResolver
// =============================================================================

/// Answers "is this type the same as, or a subtype of, that type?".
pub struct SupertypeResolver<'a, G: ?Sized> {
    gateway: &'a G,
    cache: &'a SupertypeCache,
    max_browse_pages: usize,
}

impl<'a, G> SupertypeResolver<'a, G>
where
    G: SessionGateway + ?Sized,
{
    /// Creates a resolver over `gateway` memoizing into `cache`.
    pub fn new(gateway: &'a G, cache: &'a SupertypeCache, max_browse_pages: usize) -> Self {
        Self {
            gateway,
            cache,
            max_browse_pages,
        }
    }

    /// Returns the gateway used for lookups.
    pub fn gateway(&self) -> &'a G {
        self.gateway
    }

    /// Returns `true` if `candidate` equals `expected` or reaches it within
    /// `max_depth` upward hops.
    ///
    /// A null candidate, a hierarchy root and depth exhaustion all yield
    /// `false`.
    pub async fn is_same_or_subtype(
        &self,
        expected: &NodeId,
        candidate: &NodeId,
        max_depth: u32,
    ) -> OpcUaResult<bool> {
        let mut current = candidate.clone();
        let mut remaining = max_depth;

        loop {
            if current.is_null() {
                return Ok(false);
            }
            if current == *expected {
                return Ok(true);
            }
            if remaining == 0 {
                tracing::debug!(
                    expected = %expected,
                    candidate = %candidate,
                    max_depth = max_depth,
                    "Supertype depth exhausted"
                );
                return Ok(false);
            }

            match self.supertype_of(&current).await? {
                Some(supertype) => current = supertype,
                None => return Ok(false),
            }
            remaining -= 1;
        }
    }

    /// Returns the direct supertype of `node`, consulting the cache first.
    pub async fn supertype_of(&self, node: &NodeId) -> OpcUaResult<Option<NodeId>> {
        if let Some(hop) = self.cache.get(node) {
            tracing::debug!(node_id = %node, "Supertype cache hit");
            return Ok(hop);
        }

        let supertype = self.browse_supertype(node).await?;
        self.cache.insert(node.clone(), supertype.clone());
        Ok(supertype)
    }

    async fn browse_supertype(&self, node: &NodeId) -> OpcUaResult<Option<NodeId>> {
        let class = read_node_class(self.gateway, node).await?;
        if !class.is_type() {
            tracing::error!(node_id = %node, node_class = %class, "Invalid NodeClass for supertype browse");
            return Err(OpcUaError::invalid_node_class(node.to_string(), class.name()));
        }

        let references = browse_all(
            self.gateway,
            node,
            &BrowseContext::supertype(class),
            self.max_browse_pages,
        )
        .await
        .inspect_err(|e| tracing::error!(node_id = %node, error = %e, "Bad return from browse"))?;

        match references.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(single.node_id.clone())),
            many => {
                tracing::error!(
                    node_id = %node,
                    supertypes = many.len(),
                    "Found multiple supertypes"
                );
                Ok(None)
            }
        }
    }
}

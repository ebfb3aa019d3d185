// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Conversion between portable and session-local identities.

use crate::error::{OpcUaError, OpcUaResult};
use crate::namespace::NamespaceIndexCache;
use crate::types::{NodeId, PortableNodeId, PortableQualifiedName, QualifiedName};

/// Translates node ids and qualified names against a namespace cache.
///
/// The translator borrows the cache, so it can only be used while the
/// caller holds the session model lock.
#[derive(Debug, Clone, Copy)]
pub struct NodeIdentityTranslator<'a> {
    cache: &'a NamespaceIndexCache,
}

impl<'a> NodeIdentityTranslator<'a> {
    /// Creates a translator over `cache`.
    pub fn new(cache: &'a NamespaceIndexCache) -> Self {
        Self { cache }
    }

    /// Resolves a portable id to the current session's index.
    ///
    /// # Errors
    ///
    /// `UnknownNamespace` when the server does not expose the URI.
    pub fn to_session(&self, id: &PortableNodeId) -> OpcUaResult<NodeId> {
        let index = self.index_of(&id.namespace_uri)?;
        Ok(NodeId::new(index, id.identifier.clone()))
    }

    /// Resolves a session id back to its namespace URI.
    ///
    /// # Errors
    ///
    /// `UnknownNamespaceIndex` when the index is not in the session's table.
    pub fn to_portable(&self, id: &NodeId) -> OpcUaResult<PortableNodeId> {
        let uri = self.uri_of(id.namespace_index)?;
        Ok(PortableNodeId::new(uri, id.identifier.clone()))
    }

    /// Like [`to_portable`](Self::to_portable), but maps the null id to the
    /// null portable id instead of resolving namespace 0.
    pub fn to_portable_or_null(&self, id: &NodeId) -> OpcUaResult<PortableNodeId> {
        if id.is_null() {
            return Ok(PortableNodeId::null());
        }
        self.to_portable(id)
    }

    /// Resolves a portable qualified name to the session form.
    pub fn name_to_session(&self, name: &PortableQualifiedName) -> OpcUaResult<QualifiedName> {
        let index = self.index_of(&name.namespace_uri)?;
        Ok(QualifiedName::new(index, name.name.clone()))
    }

    /// Resolves a session qualified name to the portable form.
    pub fn name_to_portable(&self, name: &QualifiedName) -> OpcUaResult<PortableQualifiedName> {
        let uri = self.uri_of(name.namespace_index)?;
        Ok(PortableQualifiedName::new(uri, name.name.clone()))
    }

    fn index_of(&self, uri: &str) -> OpcUaResult<u16> {
        self.cache
            .index_of(uri)
            .ok_or_else(|| OpcUaError::unknown_namespace(uri))
    }

    fn uri_of(&self, index: u16) -> OpcUaResult<&'a str> {
        self.cache
            .uri_of(index)
            .ok_or_else(|| OpcUaError::unknown_namespace_index(index))
    }
}

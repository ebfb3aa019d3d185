// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Namespace index cache.
//!
//! Maps namespace URIs to the numeric indices the current session assigned
//! them, and back. Both directions are rebuilt together from the server's
//! namespace table after every successful connect.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

// =============================================================================
// NamespaceRebuild
// =============================================================================

/// Outcome of a cache rebuild against the namespaces of interest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceRebuild {
    /// Namespaces of interest present in the table, with their new indices.
    pub found: Vec<(String, u16)>,
    /// Namespaces of interest absent from the table.
    pub missing: Vec<String>,
}

impl NamespaceRebuild {
    /// Returns the indices of every found namespace.
    pub fn found_indices(&self) -> BTreeSet<u16> {
        self.found.iter().map(|(_, index)| *index).collect()
    }
}

// =============================================================================
// NamespaceIndexCache
// =============================================================================

/// Bidirectional URI / index mapping for one session.
#[derive(Debug, Clone, Default)]
pub struct NamespaceIndexCache {
    uri_to_index: HashMap<String, u16>,
    index_to_uri: HashMap<u16, String>,
}

impl NamespaceIndexCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears both mappings and refills them from `table`.
    ///
    /// Position `i` in `table` is namespace index `i`. Entries past
    /// `u16::MAX` cannot be addressed by a node id and are ignored.
    pub fn rebuild<S: AsRef<str>>(&mut self, table: &[String], interest: &[S]) -> NamespaceRebuild {
        self.clear();

        let mut found = Vec::new();
        for (position, uri) in table.iter().enumerate() {
            let Ok(index) = u16::try_from(position) else {
                tracing::warn!(entries = table.len(), "Namespace table exceeds u16 range");
                break;
            };

            tracing::info!(index = index, namespace_uri = %uri, "Namespace table entry");
            // A URI listed twice resolves to its last position.
            self.uri_to_index.insert(uri.clone(), index);
            self.index_to_uri.insert(index, uri.clone());

            if interest.iter().any(|wanted| wanted.as_ref() == uri) {
                match found.iter_mut().find(|(known, _)| known == uri) {
                    Some(entry) => entry.1 = index,
                    None => found.push((uri.clone(), index)),
                }
            }
        }

        let missing: Vec<String> = interest
            .iter()
            .map(|wanted| wanted.as_ref())
            .filter(|wanted| !found.iter().any(|(uri, _)| uri == wanted))
            .map(str::to_string)
            .collect();

        for uri in &missing {
            tracing::warn!(namespace_uri = %uri, "Unable to find namespace");
        }

        NamespaceRebuild { found, missing }
    }

    /// Empties both mappings.
    pub fn clear(&mut self) {
        self.uri_to_index.clear();
        self.index_to_uri.clear();
    }

    /// Returns the index assigned to `uri`.
    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.uri_to_index.get(uri).copied()
    }

    /// Returns the URI at `index`.
    pub fn uri_of(&self, index: u16) -> Option<&str> {
        self.index_to_uri.get(&index).map(String::as_str)
    }

    /// Returns the number of cached namespaces.
    pub fn len(&self) -> usize {
        self.index_to_uri.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.index_to_uri.is_empty()
    }
}

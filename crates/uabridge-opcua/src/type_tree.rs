// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Type tree discovery.
//!
//! Starting at a root type (normally `BaseObjectType`) the builder browses
//! forward depth-first and records every discovered object, variable,
//! object type and variable type in an arena. Parent and child links are
//! arena indices.
//!
//! ```text
//! BaseObjectType (root, not stored)
//! ├── MachineType            [ObjectType, registered]
//! │   ├── Identification     [Object]
//! │   │   └── Manufacturer   [Variable]
//! │   └── SpecialMachineType [ObjectType, registered]
//! └── ToolType               [ObjectType, registered]
//! ```
//!
//! ObjectType nodes in a namespace of interest are registered by
//! `(namespace index, browse name)`. The first discovery wins; later ones
//! stay in the tree but are not registered.
//!
//! Expansion stops at `max_depth`, after `max_nodes` nodes, and at any node
//! already on its own ancestor path. A tree cut short by either limit is
//! marked [`truncated`](TypeTree::is_truncated).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::browse::{browse_all, BrowseContext};
use crate::client::gateway::{ReferenceDescription, SessionGateway};
use crate::error::OpcUaResult;
use crate::translator::NodeIdentityTranslator;
use crate::types::{BrowseResult, NodeClass, NodeId};

/// Default maximum tree depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Default maximum number of stored nodes.
pub const DEFAULT_MAX_NODES: usize = 10_000;

// =============================================================================
// TreeLimits
// =============================================================================

/// Resource bounds for one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeLimits {
    /// Nodes at this depth are stored but not expanded. Roots are depth 1.
    pub max_depth: usize,
    /// Traversal stops once this many nodes are stored.
    pub max_nodes: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

// =============================================================================
// TypeNode / TypeTree
// =============================================================================

/// One discovered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    /// Portable browse metadata.
    pub metadata: BrowseResult,
    /// Session-local id, valid until the next reconnect.
    pub node_id: NodeId,
    /// Namespace index of `node_id`.
    pub namespace_index: u16,
    /// Discovery parent.
    pub parent: Option<usize>,
    /// Children in discovery order.
    pub children: Vec<usize>,
    /// Distance from the root type (roots are 1).
    pub depth: usize,
}

impl TypeNode {
    /// Returns the browse name text.
    pub fn name(&self) -> &str {
        &self.metadata.browse_name.name
    }
}

/// Arena-backed tree produced by [`TypeTreeBuilder`].
#[derive(Debug, Clone, Default)]
pub struct TypeTree {
    nodes: Vec<TypeNode>,
    roots: Vec<usize>,
    registered: BTreeMap<(u16, String), usize>,
    duplicates: usize,
    truncated: bool,
}

impl TypeTree {
    /// Returns the node at `index`.
    pub fn node(&self, index: usize) -> Option<&TypeNode> {
        self.nodes.get(index)
    }

    /// Returns every stored node in discovery order.
    pub fn nodes(&self) -> &[TypeNode] {
        &self.nodes
    }

    /// Returns the direct children of the root type.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Returns the children of `index`.
    pub fn children(&self, index: usize) -> &[usize] {
        self.nodes
            .get(index)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Returns the registered ObjectType node for `(namespace_index, name)`.
    pub fn lookup(&self, namespace_index: u16, name: &str) -> Option<usize> {
        self.registered
            .get(&(namespace_index, name.to_string()))
            .copied()
    }

    /// Iterates registered types as `(namespace_index, name, node index)`.
    pub fn registered(&self) -> impl Iterator<Item = (u16, &str, usize)> + '_ {
        self.registered
            .iter()
            .map(|((ns, name), index)| (*ns, name.as_str(), *index))
    }

    /// Returns the path from the top-level ancestor down to `index`.
    pub fn lineage(&self, index: usize) -> Vec<usize> {
        let mut lineage = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            let Some(node) = self.nodes.get(i) else { break };
            lineage.push(i);
            current = node.parent;
        }
        lineage.reverse();
        lineage
    }

    /// Returns the number of stored nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing was discovered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns how many ObjectType names were discovered more than once.
    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }

    /// Returns `true` if a depth or node limit cut the traversal short.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn push(&mut self, node: TypeNode) -> usize {
        let index = self.nodes.len();
        match node.parent {
            Some(parent) => self.nodes[parent].children.push(index),
            None => self.roots.push(index),
        }
        self.nodes.push(node);
        index
    }

    fn register(&mut self, index: usize) {
        let node = &self.nodes[index];
        let key = (node.namespace_index, node.name().to_string());
        if self.registered.contains_key(&key) {
            tracing::debug!(
                type_name = %key.1,
                namespace_index = key.0,
                "Found type again, keeping first"
            );
            self.duplicates += 1;
            return;
        }
        self.registered.insert(key, index);
    }

    fn is_on_path(&self, from: Option<usize>, node_id: &NodeId) -> bool {
        let mut current = from;
        while let Some(i) = current {
            let node = &self.nodes[i];
            if &node.node_id == node_id {
                return true;
            }
            current = node.parent;
        }
        false
    }
}

// =============================================================================
// TypeTreeBuilder
// =============================================================================

struct Frame {
    parent: Option<usize>,
    depth: usize,
    references: std::vec::IntoIter<ReferenceDescription>,
}

/// Depth-first type discovery over a gateway.
pub struct TypeTreeBuilder<'a, G: ?Sized> {
    gateway: &'a G,
    translator: NodeIdentityTranslator<'a>,
    context: BrowseContext,
    limits: TreeLimits,
    max_browse_pages: usize,
}

impl<'a, G> TypeTreeBuilder<'a, G>
where
    G: SessionGateway + ?Sized,
{
    /// Creates a builder following `reference_type` (subtypes included).
    pub fn new(
        gateway: &'a G,
        translator: NodeIdentityTranslator<'a>,
        reference_type: NodeId,
        limits: TreeLimits,
        max_browse_pages: usize,
    ) -> Self {
        Self {
            gateway,
            translator,
            context: BrowseContext::type_tree(reference_type),
            limits,
            max_browse_pages,
        }
    }

    /// Builds the tree below `root`, registering ObjectTypes whose
    /// namespace index is in `available`.
    ///
    /// # Errors
    ///
    /// Browse failures and namespace translation failures abort the build.
    pub async fn build(&self, root: &NodeId, available: &BTreeSet<u16>) -> OpcUaResult<TypeTree> {
        let mut tree = TypeTree::default();
        let mut unexpanded = 0usize;

        let references = self.browse(root).await?;
        let mut stack = vec![Frame {
            parent: None,
            depth: 1,
            references: references.into_iter(),
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(reference) = frame.references.next() else {
                stack.pop();
                continue;
            };
            let (parent, depth) = (frame.parent, frame.depth);

            if tree.len() >= self.limits.max_nodes {
                tree.truncated = true;
                tracing::warn!(
                    max_nodes = self.limits.max_nodes,
                    "Type tree node limit reached, stopping discovery"
                );
                break;
            }

            let metadata = self.to_metadata(&reference)?;
            let index = tree.push(TypeNode {
                metadata,
                node_id: reference.node_id.clone(),
                namespace_index: reference.node_id.namespace_index,
                parent,
                children: Vec::new(),
                depth,
            });

            if reference.node_class == NodeClass::ObjectType
                && available.contains(&reference.node_id.namespace_index)
            {
                tree.register(index);
            }

            if reference.node_id == *root || tree.is_on_path(parent, &reference.node_id) {
                tracing::debug!(node_id = %reference.node_id, "Node already on its ancestor path");
                continue;
            }

            if depth >= self.limits.max_depth {
                tree.truncated = true;
                unexpanded += 1;
                tracing::trace!(node_id = %reference.node_id, depth = depth, "Depth limit reached");
                continue;
            }

            let children = self.browse(&reference.node_id).await?;
            stack.push(Frame {
                parent: Some(index),
                depth: depth + 1,
                references: children.into_iter(),
            });
        }

        if unexpanded > 0 {
            tracing::warn!(
                max_depth = self.limits.max_depth,
                unexpanded = unexpanded,
                "Type tree depth limit reached"
            );
        }

        tracing::info!(
            root = %root,
            nodes = tree.len(),
            registered = tree.registered.len(),
            duplicates = tree.duplicates,
            truncated = tree.truncated,
            "Type tree built"
        );

        Ok(tree)
    }

    async fn browse(&self, node: &NodeId) -> OpcUaResult<Vec<ReferenceDescription>> {
        browse_all(self.gateway, node, &self.context, self.max_browse_pages)
            .await
            .inspect_err(|e| tracing::error!(node_id = %node, error = %e, "Bad return from browse"))
    }

    fn to_metadata(&self, reference: &ReferenceDescription) -> OpcUaResult<BrowseResult> {
        Ok(BrowseResult {
            node_id: self.translator.to_portable(&reference.node_id)?,
            node_class: reference.node_class,
            browse_name: self.translator.name_to_portable(&reference.browse_name)?,
            type_definition: self.translator.to_portable_or_null(&reference.type_definition)?,
            reference_type_id: self.translator.to_portable_or_null(&reference.reference_type_id)?,
        })
    }
}

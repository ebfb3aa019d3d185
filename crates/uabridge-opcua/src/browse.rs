// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Browse contexts, paging and browse-result projection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │     BrowseContext    │─────▶│   browse_all (pages) │
//! └──────────────────────┘      └──────────┬───────────┘
//!                                          │ ReferenceDescription
//!                                          ▼
//!                               ┌──────────────────────┐
//!                               │ BrowseResultProjector│──▶ SupertypeResolver
//!                               └──────────┬───────────┘
//!                                          │ BrowseResult (portable)
//!                                          ▼
//! ```
//!
//! The projector keeps only references whose declared type definition is
//! the requested type or one of its subtypes. Order is preserved.

use serde::{Deserialize, Serialize};

use crate::client::gateway::{ReadValueId, ReferenceDescription, SessionGateway, Variant};
use crate::error::{OpcUaError, OpcUaErrorContext, OpcUaResult};
use crate::supertype::SupertypeResolver;
use crate::translator::NodeIdentityTranslator;
use crate::types::{
    AttributeId, BrowseDirection, BrowseResult, NodeClass, NodeId, TimestampsToReturn,
};

// =============================================================================
// Standard Reference Type Node IDs
// =============================================================================

/// Standard OPC UA reference type node IDs.
pub mod reference_types {
    use crate::types::{ids, NodeId};

    /// HierarchicalReferences (abstract) - i=33.
    pub fn hierarchical_references() -> NodeId {
        NodeId::ns0(ids::HIERARCHICAL_REFERENCES)
    }

    /// HasSubtype - i=45.
    pub fn has_subtype() -> NodeId {
        NodeId::ns0(ids::HAS_SUBTYPE)
    }
}

/// Browse result mask bits.
pub mod result_mask {
    /// No optional fields.
    pub const NONE: u32 = 0;
    /// ReferenceTypeId.
    pub const REFERENCE_TYPE_ID: u32 = 1;
    /// NodeClass.
    pub const NODE_CLASS: u32 = 4;
    /// BrowseName.
    pub const BROWSE_NAME: u32 = 8;
    /// TypeDefinition.
    pub const TYPE_DEFINITION: u32 = 32;
    /// All fields, including IsForward (2) and DisplayName (16).
    pub const ALL: u32 = 63;
}

// =============================================================================
// BrowseContext
// =============================================================================

/// Parameters of one browse request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseContext {
    /// Direction to follow.
    pub direction: BrowseDirection,
    /// Reference type filter; `None` follows all references.
    pub reference_type: Option<NodeId>,
    /// Include subtypes of `reference_type`.
    pub include_subtypes: bool,
    /// Node class mask (0 = all).
    pub node_class_mask: u32,
    /// Result mask.
    pub result_mask: u32,
}

impl Default for BrowseContext {
    fn default() -> Self {
        Self {
            direction: BrowseDirection::Forward,
            reference_type: None,
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: result_mask::ALL,
        }
    }
}

impl BrowseContext {
    /// Context for instance browsing: forward, subtypes included, with
    /// the fields the projector needs.
    pub fn instances(reference_type: Option<NodeId>, node_class_mask: u32) -> Self {
        Self {
            reference_type,
            node_class_mask,
            result_mask: result_mask::BROWSE_NAME
                | result_mask::TYPE_DEFINITION
                | result_mask::NODE_CLASS
                | result_mask::REFERENCE_TYPE_ID,
            ..Default::default()
        }
    }

    /// Context for one upward hop along `HasSubtype`.
    pub fn supertype(node_class: NodeClass) -> Self {
        Self {
            direction: BrowseDirection::Inverse,
            reference_type: Some(reference_types::has_subtype()),
            include_subtypes: true,
            node_class_mask: node_class.value(),
            result_mask: result_mask::NONE,
        }
    }

    /// Context for type-tree discovery.
    pub fn type_tree(reference_type: NodeId) -> Self {
        Self {
            reference_type: Some(reference_type),
            node_class_mask: NodeClass::mask(&[
                NodeClass::ObjectType,
                NodeClass::Object,
                NodeClass::Variable,
                NodeClass::VariableType,
            ]),
            ..Default::default()
        }
    }
}

// =============================================================================
// Gateway helpers
// =============================================================================

/// Browses `start` and follows continuation points up to `max_pages`.
///
/// When the cap is reached the outstanding continuation point is released
/// and the references collected so far are returned.
pub async fn browse_all<G>(
    gateway: &G,
    start: &NodeId,
    context: &BrowseContext,
    max_pages: usize,
) -> OpcUaResult<Vec<ReferenceDescription>>
where
    G: SessionGateway + ?Sized,
{
    let mut page = gateway.browse(start, context).await.with_node(&start.to_string())?;
    let mut references = std::mem::take(&mut page.references);
    let mut pages = 1;

    while let Some(point) = page.continuation_point.take() {
        if pages >= max_pages {
            tracing::warn!(
                node_id = %start,
                pages = pages,
                references = references.len(),
                "Browse page limit reached, releasing continuation point"
            );
            gateway.browse_next(&point, true).await?;
            break;
        }

        page = gateway.browse_next(&point, false).await?;
        references.append(&mut page.references);
        pages += 1;
    }

    tracing::trace!(node_id = %start, pages = pages, references = references.len(), "Browse complete");
    Ok(references)
}

/// Reads the NodeClass attribute of `node`.
///
/// # Errors
///
/// - `ProtocolStatus` when the service or the item status is bad
/// - `SemanticMismatch` when the result count is not one, the value is not
///   an `Int32`, or the value is not a known node class
pub async fn read_node_class<G>(gateway: &G, node: &NodeId) -> OpcUaResult<NodeClass>
where
    G: SessionGateway + ?Sized,
{
    let request = [ReadValueId::new(node.clone(), AttributeId::NodeClass)];
    let results = gateway
        .read(&request, TimestampsToReturn::Neither)
        .await
        .inspect_err(|e| tracing::error!(node_id = %node, error = %e, "readNodeClass failed"))?;

    let [result] = results.as_slice() else {
        tracing::error!(node_id = %node, results = results.len(), "readNodeClass expected one result");
        return Err(OpcUaError::semantic_mismatch(format!(
            "Length mismatch: expected 1 read result, got {}",
            results.len()
        )));
    };

    if result.status.is_bad() {
        tracing::error!(node_id = %node, status = %result.status, "Bad value status for node class");
        return Err(OpcUaError::protocol_status("Read", result.status));
    }

    let Variant::Int32(raw) = result.value else {
        tracing::error!(node_id = %node, value_type = result.value.type_name(), "Expected Int32 node class");
        return Err(OpcUaError::semantic_mismatch(format!(
            "Type mismatch: expected Int32 node class, got {}",
            result.value.type_name()
        )));
    };

    u32::try_from(raw)
        .ok()
        .and_then(NodeClass::from_value)
        .ok_or_else(|| OpcUaError::semantic_mismatch(format!("Unknown node class value {}", raw)))
}

// =============================================================================
// BrowseResultProjector
// =============================================================================

/// Filters raw references by type conformance and converts them to the
/// portable model.
pub struct BrowseResultProjector<'a, G: ?Sized> {
    resolver: &'a SupertypeResolver<'a, G>,
    translator: NodeIdentityTranslator<'a>,
    max_depth: u32,
}

impl<'a, G> BrowseResultProjector<'a, G>
where
    G: SessionGateway + ?Sized,
{
    /// Creates a projector.
    pub fn new(
        resolver: &'a SupertypeResolver<'a, G>,
        translator: NodeIdentityTranslator<'a>,
        max_depth: u32,
    ) -> Self {
        Self {
            resolver,
            translator,
            max_depth,
        }
    }

    /// Returns the instance class mask matching `type_definition`.
    ///
    /// ObjectType selects Objects, VariableType selects Variables.
    ///
    /// # Errors
    ///
    /// `InvalidNodeClass` for any other class.
    pub async fn instance_mask(&self, type_definition: &NodeId) -> OpcUaResult<u32> {
        let class = read_node_class(self.resolver.gateway(), type_definition).await?;
        match class {
            NodeClass::ObjectType => Ok(NodeClass::Object.value()),
            NodeClass::VariableType => Ok(NodeClass::Variable.value()),
            other => {
                tracing::error!(
                    node_id = %type_definition,
                    node_class = %other,
                    "Expected object or variable type"
                );
                Err(OpcUaError::invalid_node_class(type_definition.to_string(), other.name()))
            }
        }
    }

    /// Keeps references whose type definition conforms to `type_definition`.
    ///
    /// `type_definition` must already be validated with
    /// [`instance_mask`](Self::instance_mask).
    pub async fn project(
        &self,
        references: &[ReferenceDescription],
        type_definition: &NodeId,
    ) -> OpcUaResult<Vec<BrowseResult>> {
        let mut kept = Vec::with_capacity(references.len());

        for reference in references {
            let conforms = self
                .resolver
                .is_same_or_subtype(type_definition, &reference.type_definition, self.max_depth)
                .await?;
            if !conforms {
                tracing::trace!(
                    node_id = %reference.node_id,
                    type_definition = %reference.type_definition,
                    "Skipping non-conforming reference"
                );
                continue;
            }
            kept.push(self.to_browse_result(reference)?);
        }

        Ok(kept)
    }

    /// Converts one reference to the portable model.
    pub fn to_browse_result(&self, reference: &ReferenceDescription) -> OpcUaResult<BrowseResult> {
        Ok(BrowseResult {
            node_id: self.translator.to_portable(&reference.node_id)?,
            node_class: reference.node_class,
            browse_name: self.translator.name_to_portable(&reference.browse_name)?,
            type_definition: self.translator.to_portable_or_null(&reference.type_definition)?,
            reference_type_id: self.translator.to_portable_or_null(&reference.reference_type_id)?,
        })
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory address space used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::browse::BrowseContext;
use crate::client::gateway::{
    BrowsePage, BrowsePath, BrowsePathResult, BrowsePathTarget, ConnectInfo, DataChangeCallback,
    DataValue, EndpointDescription, IdentityToken, ReadValueId, ReferenceDescription,
    SessionGateway, StatusSender, Variant,
};
use crate::config::SubscriptionSettings;
use crate::error::OpcUaResult;
use crate::types::{
    ids, AttributeId, BrowseDirection, NodeClass, NodeId, QualifiedName, StatusCode,
    TimestampsToReturn,
};

#[derive(Debug, Clone)]
struct Node {
    class: NodeClass,
    browse_name: QualifiedName,
    type_definition: NodeId,
}

#[derive(Debug, Clone)]
struct Reference {
    source: NodeId,
    reference_type: NodeId,
    target: NodeId,
}

/// Scripted address space implementing [`SessionGateway`].
pub(crate) struct AddressSpace {
    namespaces: RwLock<Vec<String>>,
    nodes: RwLock<HashMap<NodeId, Node>>,
    references: RwLock<Vec<Reference>>,
    values: RwLock<HashMap<NodeId, Variant>>,
    pending_pages: RwLock<HashMap<Vec<u8>, Vec<ReferenceDescription>>>,
    page_size: Option<usize>,
    connected: AtomicBool,
    next_id: AtomicU32,
    pub browse_calls: AtomicUsize,
    pub released_points: AtomicUsize,
}

impl AddressSpace {
    pub fn new(namespaces: &[&str]) -> Self {
        let space = Self {
            namespaces: RwLock::new(namespaces.iter().map(|s| s.to_string()).collect()),
            nodes: RwLock::new(HashMap::new()),
            references: RwLock::new(Vec::new()),
            values: RwLock::new(HashMap::new()),
            pending_pages: RwLock::new(HashMap::new()),
            page_size: None,
            connected: AtomicBool::new(true),
            next_id: AtomicU32::new(1),
            browse_calls: AtomicUsize::new(0),
            released_points: AtomicUsize::new(0),
        };
        space.add_node(
            NodeId::ns0(ids::BASE_OBJECT_TYPE),
            NodeClass::ObjectType,
            QualifiedName::new(0, "BaseObjectType"),
            NodeId::null(),
        );
        space
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn add_node(&self, id: NodeId, class: NodeClass, browse_name: QualifiedName, type_definition: NodeId) {
        self.nodes.write().unwrap().insert(
            id,
            Node {
                class,
                browse_name,
                type_definition,
            },
        );
    }

    pub fn add_reference(&self, source: NodeId, reference_type: u32, target: NodeId) {
        self.references.write().unwrap().push(Reference {
            source,
            reference_type: NodeId::ns0(reference_type),
            target,
        });
    }

    /// Adds a type node with a `HasSubtype` reference from `supertype`.
    pub fn add_type(&self, id: NodeId, class: NodeClass, name: &str, supertype: &NodeId) {
        let browse_name = QualifiedName::new(id.namespace_index, name);
        self.add_node(id.clone(), class, browse_name, NodeId::null());
        self.add_reference(supertype.clone(), ids::HAS_SUBTYPE, id);
    }

    /// Adds an instance declaration under `parent` via `HasComponent`.
    pub fn add_member(&self, parent: &NodeId, id: NodeId, class: NodeClass, name: &str, type_definition: NodeId) {
        let browse_name = QualifiedName::new(id.namespace_index, name);
        self.add_node(id.clone(), class, browse_name, type_definition);
        self.add_reference(parent.clone(), ids::HAS_COMPONENT, id);
    }

    /// Sets the Value attribute of `id`.
    pub fn set_value(&self, id: NodeId, value: Variant) {
        self.values.write().unwrap().insert(id, value);
    }

    /// Replaces the namespace table, as a restarted server would.
    pub fn set_namespaces(&self, namespaces: &[&str]) {
        *self.namespaces.write().unwrap() = namespaces.iter().map(|s| s.to_string()).collect();
    }

    fn reference_matches(context: &BrowseContext, reference_type: &NodeId) -> bool {
        match &context.reference_type {
            None => true,
            Some(wanted) if wanted == reference_type => true,
            Some(wanted) => {
                context.include_subtypes
                    && wanted.as_numeric() == Some(ids::HIERARCHICAL_REFERENCES)
                    && matches!(
                        reference_type.as_numeric(),
                        Some(ids::ORGANIZES | ids::HAS_SUBTYPE | ids::HAS_PROPERTY | ids::HAS_COMPONENT)
                    )
            }
        }
    }

    fn collect(&self, start: &NodeId, context: &BrowseContext) -> Vec<ReferenceDescription> {
        let nodes = self.nodes.read().unwrap();
        let references = self.references.read().unwrap();

        references
            .iter()
            .filter(|r| Self::reference_matches(context, &r.reference_type))
            .filter_map(|r| match context.direction {
                BrowseDirection::Forward if &r.source == start => Some((r, &r.target, true)),
                BrowseDirection::Inverse if &r.target == start => Some((r, &r.source, false)),
                _ => None,
            })
            .filter_map(|(r, other, is_forward)| {
                let node = nodes.get(other)?;
                if context.node_class_mask != 0 && context.node_class_mask & node.class.value() == 0 {
                    return None;
                }
                Some(ReferenceDescription {
                    reference_type_id: r.reference_type.clone(),
                    is_forward,
                    node_id: other.clone(),
                    browse_name: node.browse_name.clone(),
                    node_class: node.class,
                    type_definition: node.type_definition.clone(),
                })
            })
            .collect()
    }

    fn paginate(&self, mut references: Vec<ReferenceDescription>) -> BrowsePage {
        let Some(size) = self.page_size else {
            return BrowsePage {
                references,
                continuation_point: None,
            };
        };
        if references.len() <= size {
            return BrowsePage {
                references,
                continuation_point: None,
            };
        }

        let rest = references.split_off(size);
        let point = self.next_id.fetch_add(1, Ordering::SeqCst).to_be_bytes().to_vec();
        self.pending_pages.write().unwrap().insert(point.clone(), rest);
        BrowsePage {
            references,
            continuation_point: Some(point),
        }
    }
}

#[async_trait]
impl SessionGateway for AddressSpace {
    async fn discover_endpoints(&self, url: &str) -> OpcUaResult<Vec<EndpointDescription>> {
        Ok(vec![EndpointDescription::new(url, Default::default())])
    }

    async fn connect_session(
        &self,
        _endpoint: &EndpointDescription,
        _connect_info: &ConnectInfo,
        _identity: &IdentityToken,
        _status: StatusSender,
    ) -> OpcUaResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect_session(&self) -> OpcUaResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_session_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read(&self, nodes: &[ReadValueId], _timestamps: TimestampsToReturn) -> OpcUaResult<Vec<DataValue>> {
        let known = self.nodes.read().unwrap();
        let values = self.values.read().unwrap();
        Ok(nodes
            .iter()
            .map(|item| match (known.get(&item.node_id), item.attribute_id) {
                (Some(node), AttributeId::NodeClass) => {
                    DataValue::good(Variant::Int32(node.class.value() as i32))
                }
                (Some(_), AttributeId::Value) => match values.get(&item.node_id) {
                    Some(value) => DataValue::good(value.clone()),
                    None => DataValue::good(Variant::Empty),
                },
                (Some(_), _) => DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
                (None, _) => DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN),
            })
            .collect())
    }

    async fn browse(&self, start: &NodeId, context: &BrowseContext) -> OpcUaResult<BrowsePage> {
        self.browse_calls.fetch_add(1, Ordering::SeqCst);
        let references = self.collect(start, context);
        Ok(self.paginate(references))
    }

    async fn browse_next(&self, continuation_point: &[u8], release: bool) -> OpcUaResult<BrowsePage> {
        let rest = self
            .pending_pages
            .write()
            .unwrap()
            .remove(continuation_point)
            .unwrap_or_default();
        if release {
            self.released_points.fetch_add(1, Ordering::SeqCst);
            return Ok(BrowsePage::default());
        }
        Ok(self.paginate(rest))
    }

    async fn translate_browse_paths(&self, paths: &[BrowsePath]) -> OpcUaResult<Vec<BrowsePathResult>> {
        let nodes = self.nodes.read().unwrap();
        let references = self.references.read().unwrap();
        Ok(paths
            .iter()
            .map(|path| {
                let Some(element) = path.relative_path.first() else {
                    return BrowsePathResult {
                        status: StatusCode::BAD_NO_MATCH,
                        targets: Vec::new(),
                    };
                };
                let targets: Vec<_> = references
                    .iter()
                    .filter(|r| r.source == path.starting_node)
                    .filter(|r| nodes.get(&r.target).map(|n| &n.browse_name) == Some(&element.target_name))
                    .map(|r| BrowsePathTarget {
                        target_id: r.target.clone(),
                        remaining_path_index: u32::MAX,
                    })
                    .collect();
                let status = if targets.is_empty() {
                    StatusCode::BAD_NO_MATCH
                } else {
                    StatusCode::GOOD
                };
                BrowsePathResult { status, targets }
            })
            .collect())
    }

    async fn namespace_table(&self) -> OpcUaResult<Vec<String>> {
        Ok(self.namespaces.read().unwrap().clone())
    }

    async fn create_subscription(&self, _settings: &SubscriptionSettings) -> OpcUaResult<u32> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn create_monitored_item(
        &self,
        _subscription_id: u32,
        _node: &NodeId,
        _sampling_interval: Duration,
        _callback: DataChangeCallback,
    ) -> OpcUaResult<u32> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn delete_monitored_item(&self, _subscription_id: u32, _monitored_item_id: u32) -> OpcUaResult<()> {
        Ok(())
    }
}

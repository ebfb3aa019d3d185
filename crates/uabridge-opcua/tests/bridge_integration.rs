// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bridge integration tests.
//!
//! These tests drive [`BridgeClient`] and the model components against a
//! scripted in-memory gateway. No server is required.
//!
//! ```bash
//! cargo test -p uabridge-opcua --test bridge_integration
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use uabridge_opcua::client::{
    BrowsePage, BrowsePath, BrowsePathResult, BrowsePathTarget, ConnectInfo, DataChangeCallback,
    DataValue, EndpointDescription, IdentityToken, ReadValueId, ReferenceDescription,
    StatusSender, Variant,
};
use uabridge_opcua::types::ids;
use uabridge_opcua::{
    AttributeId, BridgeClient, BridgeConfig, BrowseContext, BrowseDirection, ConnectionSettings,
    ConnectionStatus, LifecycleState, NamespaceIndexCache, NodeClass, NodeId,
    NodeIdentityTranslator, OpcUaConfig, OpcUaResult, Platform, PortableNodeId,
    PortableQualifiedName, QualifiedName, SecurityMode, SessionGateway, StatusCode,
    SubscriptionSettings, SupertypeCache, SupertypeResolver, TimestampsToReturn, TreeLimits,
    TypeMapFlattener, TypeTreeBuilder,
};

// =============================================================================
// Test Configuration
// =============================================================================

const UA: &str = "http://opcfoundation.org/UA/";
const SERVER: &str = "urn:mock:server";
const MACHINE_NS: &str = "http://example.com/Machinery/";
const ENDPOINT: &str = "opc.tcp://mock:4840";

fn config(mode: SecurityMode) -> BridgeConfig {
    let opcua = OpcUaConfig::builder()
        .endpoint(ENDPOINT)
        .security_mode(mode)
        .build()
        .unwrap();
    BridgeConfig::new(opcua)
        .with_namespace(MACHINE_NS)
        .with_connection(ConnectionSettings::fixed(Duration::from_millis(10)).with_idle_interval(Duration::from_millis(10)))
}

// =============================================================================
// Mock Gateway
// =============================================================================

type Key = (String, u32);

#[derive(Debug, Clone)]
struct MockNode {
    class: NodeClass,
    name: String,
    type_definition: Option<Key>,
}

/// Scripted gateway over an in-memory address space.
///
/// Nodes are keyed by namespace URI so the same address space can be served
/// under differently ordered namespace tables.
struct MockGateway {
    endpoints: RwLock<Vec<EndpointDescription>>,
    namespaces: RwLock<Vec<String>>,
    nodes: RwLock<HashMap<Key, MockNode>>,
    references: RwLock<Vec<(Key, u32, Key)>>,
    values: RwLock<HashMap<Key, Variant>>,
    monitored: RwLock<HashMap<u32, (Key, DataChangeCallback)>>,
    status: RwLock<Option<StatusSender>>,
    connected: RwLock<bool>,
    next_id: AtomicU32,
    connected_endpoints: RwLock<Vec<String>>,
    read_requests: RwLock<Vec<Vec<NodeId>>>,
    inverse_browse_calls: AtomicUsize,
    disconnects: AtomicUsize,
    connects_over_live_session: AtomicUsize,
}

fn key(uri: &str, id: u32) -> Key {
    (uri.to_string(), id)
}

impl MockGateway {
    fn new(namespaces: &[&str]) -> Self {
        let gateway = Self {
            endpoints: RwLock::new(vec![EndpointDescription::new(ENDPOINT, SecurityMode::None)]),
            namespaces: RwLock::new(namespaces.iter().map(|s| s.to_string()).collect()),
            nodes: RwLock::new(HashMap::new()),
            references: RwLock::new(Vec::new()),
            values: RwLock::new(HashMap::new()),
            monitored: RwLock::new(HashMap::new()),
            status: RwLock::new(None),
            connected: RwLock::new(false),
            next_id: AtomicU32::new(1),
            connected_endpoints: RwLock::new(Vec::new()),
            read_requests: RwLock::new(Vec::new()),
            inverse_browse_calls: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            connects_over_live_session: AtomicUsize::new(0),
        };
        gateway.add_node(UA, ids::BASE_OBJECT_TYPE, NodeClass::ObjectType, "BaseObjectType", None);
        gateway.add_node(UA, ids::OBJECTS_FOLDER, NodeClass::Object, "Objects", None);
        gateway
    }

    fn with_endpoints(self, endpoints: Vec<EndpointDescription>) -> Self {
        *self.endpoints.write().unwrap() = endpoints;
        self
    }

    fn add_node(&self, uri: &str, id: u32, class: NodeClass, name: &str, type_definition: Option<(&str, u32)>) {
        self.nodes.write().unwrap().insert(
            key(uri, id),
            MockNode {
                class,
                name: name.to_string(),
                type_definition: type_definition.map(|(uri, id)| key(uri, id)),
            },
        );
    }

    fn add_reference(&self, source: (&str, u32), reference_type: u32, target: (&str, u32)) {
        self.references
            .write()
            .unwrap()
            .push((key(source.0, source.1), reference_type, key(target.0, target.1)));
    }

    fn add_type(&self, uri: &str, id: u32, name: &str, supertype: (&str, u32)) {
        self.add_node(uri, id, NodeClass::ObjectType, name, None);
        self.add_reference(supertype, ids::HAS_SUBTYPE, (uri, id));
    }

    fn add_instance(&self, parent: (&str, u32), uri: &str, id: u32, name: &str, type_definition: (&str, u32)) {
        self.add_node(uri, id, NodeClass::Object, name, Some(type_definition));
        self.add_reference(parent, ids::ORGANIZES, (uri, id));
    }

    fn set_namespaces(&self, namespaces: &[&str]) {
        *self.namespaces.write().unwrap() = namespaces.iter().map(|s| s.to_string()).collect();
    }

    /// Loses the session without notifying, as a crashed server would.
    fn drop_session(&self) {
        *self.connected.write().unwrap() = false;
    }

    /// Delivers a connection status event.
    fn emit(&self, status: ConnectionStatus) {
        if let Some(sender) = self.status.read().unwrap().as_ref() {
            let _ = sender.send(status);
        }
    }

    /// Pushes a value to every monitored item on `node`.
    fn publish(&self, uri: &str, id: u32, value: Variant) {
        let target = key(uri, id);
        for (node, callback) in self.monitored.read().unwrap().values() {
            if *node == target {
                callback(DataValue::good(value.clone()));
            }
        }
    }

    fn index_of(&self, uri: &str) -> u16 {
        self.namespaces
            .read()
            .unwrap()
            .iter()
            .position(|u| u == uri)
            .map(|i| i as u16)
            .unwrap_or(u16::MAX)
    }

    fn key_of(&self, node: &NodeId) -> Option<Key> {
        let uri = self.namespaces.read().unwrap().get(node.namespace_index as usize)?.clone();
        Some((uri, node.as_numeric()?))
    }

    fn node_id(&self, key: &Key) -> NodeId {
        NodeId::numeric(self.index_of(&key.0), key.1)
    }

    fn browse_name(&self, key: &Key, node: &MockNode) -> QualifiedName {
        QualifiedName::new(self.index_of(&key.0), node.name.as_str())
    }

    fn reference_matches(context: &BrowseContext, reference_type: u32) -> bool {
        match context.reference_type.as_ref().and_then(NodeId::as_numeric) {
            None => true,
            Some(wanted) if wanted == reference_type => true,
            Some(ids::HIERARCHICAL_REFERENCES) => context.include_subtypes,
            Some(_) => false,
        }
    }
}

#[async_trait]
impl SessionGateway for MockGateway {
    async fn discover_endpoints(&self, _url: &str) -> OpcUaResult<Vec<EndpointDescription>> {
        Ok(self.endpoints.read().unwrap().clone())
    }

    async fn connect_session(
        &self,
        endpoint: &EndpointDescription,
        _connect_info: &ConnectInfo,
        _identity: &IdentityToken,
        status: StatusSender,
    ) -> OpcUaResult<()> {
        if *self.connected.read().unwrap() {
            self.connects_over_live_session.fetch_add(1, Ordering::SeqCst);
        }
        self.connected_endpoints.write().unwrap().push(endpoint.endpoint_url.clone());
        self.monitored.write().unwrap().clear();
        *self.status.write().unwrap() = Some(status);
        *self.connected.write().unwrap() = true;
        Ok(())
    }

    async fn disconnect_session(&self) -> OpcUaResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.connected.write().unwrap() = false;
        self.monitored.write().unwrap().clear();
        Ok(())
    }

    fn is_session_connected(&self) -> bool {
        *self.connected.read().unwrap()
    }

    async fn read(&self, nodes: &[ReadValueId], _timestamps: TimestampsToReturn) -> OpcUaResult<Vec<DataValue>> {
        self.read_requests
            .write()
            .unwrap()
            .push(nodes.iter().map(|n| n.node_id.clone()).collect());

        let known = self.nodes.read().unwrap();
        let values = self.values.read().unwrap();
        Ok(nodes
            .iter()
            .map(|item| {
                let Some(key) = self.key_of(&item.node_id) else {
                    return DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN);
                };
                match (known.get(&key), item.attribute_id) {
                    (Some(node), AttributeId::NodeClass) => {
                        DataValue::good(Variant::Int32(node.class.value() as i32))
                    }
                    (Some(_), AttributeId::Value) => {
                        DataValue::good(values.get(&key).cloned().unwrap_or_default())
                    }
                    (Some(_), _) => DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
                    (None, _) => DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN),
                }
            })
            .collect())
    }

    async fn browse(&self, start: &NodeId, context: &BrowseContext) -> OpcUaResult<BrowsePage> {
        if context.direction == BrowseDirection::Inverse {
            self.inverse_browse_calls.fetch_add(1, Ordering::SeqCst);
        }
        let Some(start_key) = self.key_of(start) else {
            return Ok(BrowsePage::default());
        };

        let nodes = self.nodes.read().unwrap();
        let references = self.references.read().unwrap();
        let found = references
            .iter()
            .filter(|(_, reference_type, _)| Self::reference_matches(context, *reference_type))
            .filter_map(|(source, reference_type, target)| {
                let other = match context.direction {
                    BrowseDirection::Forward if *source == start_key => target,
                    BrowseDirection::Inverse if *target == start_key => source,
                    _ => return None,
                };
                let node = nodes.get(other)?;
                if context.node_class_mask != 0 && context.node_class_mask & node.class.value() == 0 {
                    return None;
                }
                Some(ReferenceDescription {
                    reference_type_id: NodeId::ns0(*reference_type),
                    is_forward: context.direction == BrowseDirection::Forward,
                    node_id: self.node_id(other),
                    browse_name: self.browse_name(other, node),
                    node_class: node.class,
                    type_definition: node
                        .type_definition
                        .as_ref()
                        .map(|t| self.node_id(t))
                        .unwrap_or_else(NodeId::null),
                })
            })
            .collect();

        Ok(BrowsePage {
            references: found,
            continuation_point: None,
        })
    }

    async fn browse_next(&self, _continuation_point: &[u8], _release: bool) -> OpcUaResult<BrowsePage> {
        Ok(BrowsePage::default())
    }

    async fn translate_browse_paths(&self, paths: &[BrowsePath]) -> OpcUaResult<Vec<BrowsePathResult>> {
        let nodes = self.nodes.read().unwrap();
        let references = self.references.read().unwrap();
        Ok(paths
            .iter()
            .map(|path| {
                let start = self.key_of(&path.starting_node);
                let name = path.relative_path.first().map(|e| &e.target_name);
                let targets: Vec<_> = references
                    .iter()
                    .filter(|(source, ..)| start.as_ref() == Some(source))
                    .filter(|(.., target)| {
                        nodes.get(target).map(|n| self.browse_name(target, n)).as_ref() == name
                    })
                    .map(|(.., target)| BrowsePathTarget {
                        target_id: self.node_id(target),
                        remaining_path_index: u32::MAX,
                    })
                    .collect();
                BrowsePathResult {
                    status: if targets.is_empty() {
                        StatusCode::BAD_NO_MATCH
                    } else {
                        StatusCode::GOOD
                    },
                    targets,
                }
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
        node: &NodeId,
        _sampling_interval: Duration,
        callback: DataChangeCallback,
    ) -> OpcUaResult<u32> {
        let key = self.key_of(node).unwrap_or_default();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.monitored.write().unwrap().insert(id, (key, callback));
        Ok(id)
    }

    async fn delete_monitored_item(&self, _subscription_id: u32, monitored_item_id: u32) -> OpcUaResult<()> {
        self.monitored.write().unwrap().remove(&monitored_item_id);
        Ok(())
    }
}

/// Machinery-style address space.
///
/// ```text
/// BaseObjectType
/// ├── MachineType
/// │   └── MillType
/// └── ToolType
/// Objects
/// ├── Mill1     : MillType
/// ├── Tool1     : ToolType
/// ├── Machine1  : MachineType
/// └── Tool2     : ToolType
/// ```
fn machinery(namespaces: &[&str]) -> MockGateway {
    let gateway = MockGateway::new(namespaces);
    let base = (UA, ids::BASE_OBJECT_TYPE);
    let objects = (UA, ids::OBJECTS_FOLDER);

    gateway.add_type(MACHINE_NS, 1001, "MachineType", base);
    gateway.add_type(MACHINE_NS, 1002, "ToolType", base);
    gateway.add_type(MACHINE_NS, 1003, "MillType", (MACHINE_NS, 1001));

    gateway.add_instance(objects, MACHINE_NS, 5001, "Mill1", (MACHINE_NS, 1003));
    gateway.add_instance(objects, MACHINE_NS, 5002, "Tool1", (MACHINE_NS, 1002));
    gateway.add_instance(objects, MACHINE_NS, 5003, "Machine1", (MACHINE_NS, 1001));
    gateway.add_instance(objects, MACHINE_NS, 5004, "Tool2", (MACHINE_NS, 1002));

    gateway
        .values
        .write()
        .unwrap()
        .insert(key(MACHINE_NS, 5001), Variant::Double(1200.0));
    gateway
}

async fn connected_client(gateway: Arc<MockGateway>) -> BridgeClient {
    let client = BridgeClient::new(config(SecurityMode::None), gateway, &Platform::new()).unwrap();
    client.connect().await.unwrap();
    client
}

// =============================================================================
// Endpoint Selection
// =============================================================================

#[tokio::test]
async fn test_sign_endpoint_selected() {
    let gateway = Arc::new(machinery(&[UA, SERVER, MACHINE_NS]).with_endpoints(vec![
        EndpointDescription::new("opc.tcp://mock:4840/none", SecurityMode::None),
        EndpointDescription::new("opc.tcp://mock:4840/sign", SecurityMode::Sign),
        EndpointDescription::new("opc.tcp://mock:4840/encrypt", SecurityMode::SignAndEncrypt),
    ]));

    let client = BridgeClient::new(config(SecurityMode::Sign), gateway.clone(), &Platform::new()).unwrap();
    client.connect().await.unwrap();

    assert!(client.is_connected());
    assert_eq!(
        *gateway.connected_endpoints.read().unwrap(),
        vec!["opc.tcp://mock:4840/sign".to_string()]
    );
}

#[tokio::test]
async fn test_no_matching_endpoint_creates_no_session() {
    let gateway = Arc::new(machinery(&[UA, SERVER, MACHINE_NS]).with_endpoints(vec![
        EndpointDescription::new("opc.tcp://mock:4840/none", SecurityMode::None),
    ]));

    let client = BridgeClient::new(config(SecurityMode::Sign), gateway.clone(), &Platform::new()).unwrap();
    assert!(client.connect().await.is_err());

    assert_eq!(client.state(), LifecycleState::Disconnected);
    assert!(gateway.connected_endpoints.read().unwrap().is_empty());
    assert!(client.generation().await.unwrap_err().is_not_connected());
}

// =============================================================================
// Namespace Identity
// =============================================================================

#[test]
fn test_namespace_round_trip() {
    let table: Vec<String> = [UA, SERVER, MACHINE_NS, "http://example.com/Tools/"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut cache = NamespaceIndexCache::new();
    cache.rebuild(&table, &[MACHINE_NS]);
    let translator = NodeIdentityTranslator::new(&cache);

    for uri in &table {
        let portable = PortableNodeId::numeric(uri.as_str(), 42);
        let session = translator.to_session(&portable).unwrap();
        assert_eq!(translator.to_portable(&session).unwrap().namespace_uri, *uri);
    }
}

#[tokio::test]
async fn test_reconnect_resolves_new_namespace_index() {
    let gateway = Arc::new(machinery(&[UA, SERVER, MACHINE_NS]));
    let client = BridgeClient::new(config(SecurityMode::None), gateway.clone(), &Platform::new()).unwrap();
    client.start();
    assert!(client.wait_for_state(LifecycleState::Connected, Duration::from_secs(5)).await);

    let mill = PortableNodeId::numeric(MACHINE_NS, 5001);
    client.read_values(std::slice::from_ref(&mill)).await.unwrap();
    assert_eq!(gateway.read_requests.read().unwrap().last().unwrap()[0], NodeId::numeric(2, 5001));

    gateway.set_namespaces(&[UA, MACHINE_NS, SERVER]);
    gateway.drop_session();

    let mut reconnected = false;
    for _ in 0..500 {
        if matches!(client.generation().await, Ok(g) if g >= 2) {
            reconnected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reconnected, "client did not reconnect");

    assert_eq!(client.found_namespaces().await.unwrap(), vec![(MACHINE_NS.to_string(), 1)]);
    let values = client.read_values(std::slice::from_ref(&mill)).await.unwrap();
    assert_eq!(values, vec![json!(1200.0)]);
    assert_eq!(gateway.read_requests.read().unwrap().last().unwrap()[0], NodeId::numeric(1, 5001));

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disconnected_status_triggers_rebuild() {
    let gateway = Arc::new(machinery(&[UA, SERVER, MACHINE_NS]));
    let client = BridgeClient::new(config(SecurityMode::None), gateway.clone(), &Platform::new()).unwrap();
    client.start();
    assert!(client.wait_for_state(LifecycleState::Connected, Duration::from_secs(5)).await);
    assert_eq!(client.generation().await.unwrap(), 1);

    gateway.emit(ConnectionStatus::Disconnected);

    let mut rebuilt = false;
    for _ in 0..500 {
        if matches!(client.generation().await, Ok(g) if g >= 2) {
            rebuilt = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(rebuilt, "status event did not rebuild the session model");
    assert!(gateway.connected_endpoints.read().unwrap().len() >= 2);
    // The session the server still held was closed, not replaced.
    assert!(gateway.disconnects.load(Ordering::SeqCst) >= 1);
    assert_eq!(gateway.connects_over_live_session.load(Ordering::SeqCst), 0);

    client.shutdown().await.unwrap();
}

// =============================================================================
// Supertype Resolution
// =============================================================================

#[tokio::test]
async fn test_supertype_cache_hit_issues_one_browse() {
    let gateway = machinery(&[UA, SERVER, MACHINE_NS]);
    let cache = SupertypeCache::new();
    let resolver = SupertypeResolver::new(&gateway, &cache, 8);

    let machine = NodeId::numeric(2, 1001);
    let mill = NodeId::numeric(2, 1003);

    assert!(resolver.is_same_or_subtype(&machine, &mill, 10).await.unwrap());
    assert_eq!(gateway.inverse_browse_calls.load(Ordering::SeqCst), 1);

    assert!(resolver.is_same_or_subtype(&machine, &mill, 10).await.unwrap());
    assert_eq!(gateway.inverse_browse_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_subtype_properties() {
    let gateway = machinery(&[UA, SERVER, MACHINE_NS]);
    let cache = SupertypeCache::new();
    let resolver = SupertypeResolver::new(&gateway, &cache, 8);

    let base = NodeId::ns0(ids::BASE_OBJECT_TYPE);
    let machine = NodeId::numeric(2, 1001);
    let tool = NodeId::numeric(2, 1002);
    let mill = NodeId::numeric(2, 1003);

    for t in [&base, &machine, &tool, &mill] {
        assert!(resolver.is_same_or_subtype(t, t, 1).await.unwrap());
    }

    // Mill -> Machine -> Base is two hops.
    assert!(!resolver.is_same_or_subtype(&base, &mill, 1).await.unwrap());
    assert!(resolver.is_same_or_subtype(&base, &mill, 2).await.unwrap());
    assert!(!resolver.is_same_or_subtype(&tool, &mill, 100).await.unwrap());
}

// =============================================================================
// Browse Projection
// =============================================================================

#[tokio::test]
async fn test_browse_keeps_conforming_in_order() {
    let gateway = Arc::new(machinery(&[UA, SERVER, MACHINE_NS]));
    let client = connected_client(gateway).await;

    let machines = client
        .browse(
            &PortableNodeId::ns0(ids::OBJECTS_FOLDER),
            &PortableNodeId::ns0(ids::HIERARCHICAL_REFERENCES),
            &PortableNodeId::numeric(MACHINE_NS, 1001),
        )
        .await
        .unwrap();
    let names: Vec<_> = machines.iter().map(|r| r.browse_name.name.as_str()).collect();
    assert_eq!(names, vec!["Mill1", "Machine1"]);

    let tools = client
        .browse(
            &PortableNodeId::ns0(ids::OBJECTS_FOLDER),
            &PortableNodeId::null(),
            &PortableNodeId::numeric(MACHINE_NS, 1002),
        )
        .await
        .unwrap();
    let names: Vec<_> = tools.iter().map(|r| r.browse_name.name.as_str()).collect();
    assert_eq!(names, vec!["Tool1", "Tool2"]);
    assert!(tools.iter().all(|r| r.node_id.namespace_uri == MACHINE_NS));
    assert_eq!(tools[0].browse_name, PortableQualifiedName::new(MACHINE_NS, "Tool1"));
}

// =============================================================================
// Type Discovery
// =============================================================================

#[tokio::test]
async fn test_duplicate_type_name_keeps_first_discovery() {
    let gateway = machinery(&[UA, SERVER, MACHINE_NS]);
    // A second MachineType node reached through ToolType's branch.
    gateway.add_type(MACHINE_NS, 1099, "MachineType", (MACHINE_NS, 1002));

    let table = gateway.namespace_table().await.unwrap();
    let mut cache = NamespaceIndexCache::new();
    let rebuild = cache.rebuild(&table, &[MACHINE_NS]);

    let tree = TypeTreeBuilder::new(
        &gateway,
        NodeIdentityTranslator::new(&cache),
        NodeId::ns0(ids::HIERARCHICAL_REFERENCES),
        TreeLimits::default(),
        8,
    )
    .build(&NodeId::ns0(ids::BASE_OBJECT_TYPE), &rebuild.found_indices())
    .await
    .unwrap();
    assert_eq!(tree.duplicate_count(), 1);

    let map = TypeMapFlattener::flatten(&tree, 2);
    assert_eq!(map.iter().filter(|t| t.name == "MachineType").count(), 1);
    assert_eq!(
        map.get("MachineType").unwrap().type_node.node_id,
        PortableNodeId::numeric(MACHINE_NS, 1001)
    );
    assert!(map.get("ToolType").is_some());
    assert_eq!(map.get("MillType").unwrap().lineage, vec!["MachineType", "MillType"]);
}

#[tokio::test]
async fn test_tree_depth_limit_fails_closed() {
    let gateway = machinery(&[UA, SERVER, MACHINE_NS]);
    let table = gateway.namespace_table().await.unwrap();
    let mut cache = NamespaceIndexCache::new();
    cache.rebuild(&table, &[MACHINE_NS]);

    let limits = TreeLimits {
        max_depth: 1,
        ..TreeLimits::default()
    };
    let tree = TypeTreeBuilder::new(
        &gateway,
        NodeIdentityTranslator::new(&cache),
        NodeId::ns0(ids::HIERARCHICAL_REFERENCES),
        limits,
        8,
    )
    .build(&NodeId::ns0(ids::BASE_OBJECT_TYPE), &BTreeSet::from([2]))
    .await
    .unwrap();

    assert!(tree.is_truncated());
    let names: Vec<_> = tree.nodes().iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["MachineType", "ToolType"]);
}

#[tokio::test]
async fn test_connect_exposes_type_maps() {
    let gateway = Arc::new(machinery(&[UA, SERVER, MACHINE_NS]));
    let client = connected_client(gateway).await;

    let map = client.type_map(MACHINE_NS).await.unwrap().unwrap();
    let mut names: Vec<_> = map.iter().map(|t| t.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["MachineType", "MillType", "ToolType"]);
    assert!(client.missing_namespaces().await.unwrap().is_empty());
    assert!(client.type_map(SERVER).await.unwrap().is_none());
}

// =============================================================================
// Translate, Read, Subscribe
// =============================================================================

#[tokio::test]
async fn test_translate_browse_path() {
    let gateway = Arc::new(machinery(&[UA, SERVER, MACHINE_NS]));
    let client = connected_client(gateway).await;

    let id = client
        .translate_browse_path_to_node_id(
            &PortableNodeId::ns0(ids::OBJECTS_FOLDER),
            &PortableQualifiedName::new(MACHINE_NS, "Machine1"),
        )
        .await
        .unwrap();
    assert_eq!(id, PortableNodeId::numeric(MACHINE_NS, 5003));

    let err = client
        .translate_browse_path_to_node_id(&PortableNodeId::null(), &PortableQualifiedName::new(MACHINE_NS, "Machine1"))
        .await
        .unwrap_err();
    assert!(matches!(err, uabridge_opcua::OpcUaError::Argument(_)));
}

#[tokio::test]
async fn test_subscription_survives_reconnect() {
    let gateway = Arc::new(machinery(&[UA, SERVER, MACHINE_NS]));
    let client = BridgeClient::new(config(SecurityMode::None), gateway.clone(), &Platform::new()).unwrap();

    let seen = Arc::new(RwLock::new(Vec::new()));
    let handle = {
        let seen = seen.clone();
        client
            .subscribe(&PortableNodeId::numeric(MACHINE_NS, 5001), move |value| {
                seen.write().unwrap().push(value);
            })
            .await
            .unwrap()
    };
    assert!(gateway.monitored.read().unwrap().is_empty());

    client.start();
    assert!(client.wait_for_state(LifecycleState::Connected, Duration::from_secs(5)).await);
    gateway.publish(MACHINE_NS, 5001, Variant::Double(1.0));

    gateway.drop_session();
    let mut republished = false;
    for _ in 0..500 {
        if matches!(client.generation().await, Ok(g) if g >= 2) && !gateway.monitored.read().unwrap().is_empty() {
            republished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(republished, "monitored item was not re-created");
    gateway.publish(MACHINE_NS, 5001, Variant::Double(2.0));

    assert_eq!(*seen.read().unwrap(), vec![json!(1.0), json!(2.0)]);

    handle.unsubscribe().await.unwrap();
    assert!(gateway.monitored.read().unwrap().is_empty());
    assert_eq!(client.subscription_count(), 0);

    client.shutdown().await.unwrap();
}

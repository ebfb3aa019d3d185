// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Flattening of the type tree into one entry per type name.
//!
//! For each registered type the lineage is walked from the top-level
//! ancestor down to the type itself. Object and Variable children of every
//! generation are merged by browse name: a more specific declaration
//! replaces an inherited one in place, new names are appended.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::type_tree::TypeTree;
use crate::types::{BrowseResult, PortableQualifiedName};

/// An attribute visible on a flattened type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlattenedAttribute {
    /// Browse name of the instance declaration.
    pub browse_name: PortableQualifiedName,
    /// Browse metadata of the declaration.
    pub metadata: BrowseResult,
    /// Name of the type that declared it.
    pub declared_by: String,
}

/// A type with its inherited attributes merged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlattenedType {
    /// Type name.
    pub name: String,
    /// Namespace index the type was found at.
    pub namespace_index: u16,
    /// Browse metadata of the type itself.
    pub type_node: BrowseResult,
    /// Browse metadata of the top-level ancestor.
    pub root: BrowseResult,
    /// Type names from the top-level ancestor down to this type.
    pub lineage: Vec<String>,
    /// Merged attributes.
    pub attributes: Vec<FlattenedAttribute>,
}

impl FlattenedType {
    /// Returns the attribute called `name`, if any.
    pub fn attribute(&self, name: &str) -> Option<&FlattenedAttribute> {
        self.attributes.iter().find(|a| a.browse_name.name == name)
    }
}

/// Flattened types of one namespace, keyed by type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeMap {
    namespace_index: u16,
    types: BTreeMap<String, FlattenedType>,
}

impl TypeMap {
    /// Returns the namespace index the map was built for.
    pub fn namespace_index(&self) -> u16 {
        self.namespace_index
    }

    /// Returns the flattened type called `name`.
    pub fn get(&self, name: &str) -> Option<&FlattenedType> {
        self.types.get(name)
    }

    /// Iterates types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FlattenedType> {
        self.types.values()
    }

    /// Returns the number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Builds [`TypeMap`]s from a [`TypeTree`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeMapFlattener;

impl TypeMapFlattener {
    /// Flattens every type registered under `namespace_index`.
    pub fn flatten(tree: &TypeTree, namespace_index: u16) -> TypeMap {
        let mut types = BTreeMap::new();

        for (ns, name, index) in tree.registered() {
            if ns != namespace_index {
                continue;
            }

            let lineage = tree.lineage(index);
            let (Some(&top), Some(leaf)) = (lineage.first(), tree.node(index)) else {
                continue;
            };
            let Some(root) = tree.node(top) else { continue };

            let mut attributes: Vec<FlattenedAttribute> = Vec::new();
            for &ancestor in &lineage {
                let Some(declaring) = tree.node(ancestor) else { continue };
                for &child in tree.children(ancestor) {
                    let Some(child) = tree.node(child) else { continue };
                    if !child.metadata.node_class.is_instance() {
                        continue;
                    }
                    let attribute = FlattenedAttribute {
                        browse_name: child.metadata.browse_name.clone(),
                        metadata: child.metadata.clone(),
                        declared_by: declaring.name().to_string(),
                    };
                    match attributes
                        .iter_mut()
                        .find(|a| a.browse_name == attribute.browse_name)
                    {
                        Some(existing) => *existing = attribute,
                        None => attributes.push(attribute),
                    }
                }
            }

            let lineage_names = lineage
                .iter()
                .filter_map(|&i| tree.node(i))
                .map(|node| node.name().to_string())
                .collect();

            types.insert(
                name.to_string(),
                FlattenedType {
                    name: name.to_string(),
                    namespace_index: ns,
                    type_node: leaf.metadata.clone(),
                    root: root.metadata.clone(),
                    lineage: lineage_names,
                    attributes,
                },
            );
        }

        tracing::debug!(namespace_index = namespace_index, types = types.len(), "Type map flattened");
        TypeMap {
            namespace_index,
            types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceIndexCache;
    use crate::testing::AddressSpace;
    use crate::translator::NodeIdentityTranslator;
    use crate::type_tree::{TreeLimits, TypeTreeBuilder};
    use crate::types::{ids, NodeClass, NodeId, QualifiedName};

    const NAMESPACES: [&str; 4] = [
        "http://opcfoundation.org/UA/",
        "urn:s",
        "http://x/UA/",
        "http://y/UA/",
    ];

    async fn build(space: &AddressSpace) -> TypeTree {
        let mut cache = NamespaceIndexCache::new();
        let table: Vec<String> = NAMESPACES.iter().map(|s| s.to_string()).collect();
        let found = cache.rebuild(&table, &["http://x/UA/", "http://y/UA/"]);
        TypeTreeBuilder::new(
            space,
            NodeIdentityTranslator::new(&cache),
            NodeId::ns0(ids::HIERARCHICAL_REFERENCES),
            TreeLimits::default(),
            8,
        )
        .build(&NodeId::ns0(ids::BASE_OBJECT_TYPE), &found.found_indices())
        .await
        .unwrap()
    }

    fn space() -> AddressSpace {
        let space = AddressSpace::new(&NAMESPACES);
        let base = NodeId::ns0(ids::BASE_OBJECT_TYPE);
        let machine = NodeId::numeric(2, 1001);
        let special = NodeId::numeric(2, 1002);

        space.add_type(machine.clone(), NodeClass::ObjectType, "MachineType", &base);
        space.add_member(&machine, NodeId::numeric(2, 6001), NodeClass::Object, "Identification", NodeId::ns0(58));
        space.add_member(&machine, NodeId::numeric(2, 6002), NodeClass::Variable, "State", NodeId::ns0(63));

        space.add_type(special.clone(), NodeClass::ObjectType, "SpecialMachineType", &machine);
        space.add_member(&special, NodeId::numeric(2, 7001), NodeClass::Object, "Identification", NodeId::numeric(2, 1001));
        space.add_member(&special, NodeId::numeric(2, 7002), NodeClass::Variable, "Speed", NodeId::ns0(63));

        space.add_type(NodeId::numeric(3, 1), NodeClass::ObjectType, "ToolType", &base);
        space
    }

    #[tokio::test]
    async fn test_flatten_merges_lineage() {
        let space = space();
        let tree = build(&space).await;
        let map = TypeMapFlattener::flatten(&tree, 2);

        assert_eq!(map.len(), 2);
        let special = map.get("SpecialMachineType").unwrap();
        assert_eq!(special.lineage, vec!["MachineType", "SpecialMachineType"]);
        assert_eq!(special.root.browse_name.name, "MachineType");

        let names: Vec<&str> = special
            .attributes
            .iter()
            .map(|a| a.browse_name.name.as_str())
            .collect();
        assert_eq!(names, vec!["Identification", "State", "Speed"]);
        assert_eq!(special.attribute("Identification").unwrap().declared_by, "SpecialMachineType");
        assert_eq!(special.attribute("State").unwrap().declared_by, "MachineType");

        let machine = map.get("MachineType").unwrap();
        assert_eq!(machine.attributes.len(), 2);
        assert!(machine.attribute("Speed").is_none());
    }

    #[tokio::test]
    async fn test_flatten_skips_other_namespaces() {
        let space = space();
        let tree = build(&space).await;

        let x = TypeMapFlattener::flatten(&tree, 2);
        let y = TypeMapFlattener::flatten(&tree, 3);
        assert!(x.get("ToolType").is_none());
        assert_eq!(y.len(), 1);
        assert_eq!(y.get("ToolType").unwrap().namespace_index, 3);
        assert_eq!(y.namespace_index(), 3);
    }

    #[tokio::test]
    async fn test_flatten_single_entry_for_duplicate() {
        let space = space();
        let catalog = NodeId::numeric(2, 1010);
        space.add_type(catalog.clone(), NodeClass::ObjectType, "CatalogType", &NodeId::ns0(58));
        space.add_node(
            NodeId::numeric(2, 1011),
            NodeClass::ObjectType,
            QualifiedName::new(2, "MachineType"),
            NodeId::null(),
        );
        space.add_reference(catalog, ids::HAS_SUBTYPE, NodeId::numeric(2, 1011));

        let tree = build(&space).await;
        let map = TypeMapFlattener::flatten(&tree, 2);

        let machine = map.get("MachineType").unwrap();
        assert_eq!(machine.type_node.node_id.identifier, crate::types::NodeIdentifier::Numeric(1001));
        assert_eq!(map.iter().filter(|t| t.name == "MachineType").count(), 1);
    }

    #[test]
    fn test_empty_tree() {
        let map = TypeMapFlattener::flatten(&TypeTree::default(), 2);
        assert!(map.is_empty());
    }
}

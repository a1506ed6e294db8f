//! Pre-commit transaction description.
//!
//! The engine assembles a [`TransactionData`] from its staged mutations and
//! hands it to the commit pipeline. Handles carry the post-transaction
//! property snapshot of their entity; removals carry the former value, so
//! deletions (which report every former property as removed) stay fully
//! reconstructable on the pipeline side.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::models::entity::{NodeId, RelationshipId};
use crate::models::property::PropertyMap;
use crate::models::relation::RelKind;

/// Snapshot of a node involved in a transaction.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    pub id: NodeId,
    pub properties: PropertyMap,
}

impl NodeHandle {
    pub fn new(id: NodeId, properties: PropertyMap) -> Self {
        Self { id, properties }
    }
}

/// Snapshot of a relationship involved in a transaction.
#[derive(Debug, Clone)]
pub struct RelationshipHandle {
    pub id: RelationshipId,
    pub rel_kind: RelKind,
    pub start: NodeId,
    pub end: NodeId,
    pub properties: PropertyMap,
}

impl RelationshipHandle {
    pub fn new(
        id: RelationshipId,
        rel_kind: RelKind,
        start: NodeId,
        end: NodeId,
        properties: PropertyMap,
    ) -> Self {
        Self {
            id,
            rel_kind,
            start,
            end,
            properties,
        }
    }
}

/// One property mutation against an owner handle. `value: None` marks a
/// removal; `previous` is the pre-transaction value when one existed.
#[derive(Debug, Clone)]
pub struct PropertyEntry<H> {
    pub owner: H,
    pub db_name: String,
    pub value: Option<Value>,
    pub previous: Option<Value>,
}

/// Everything the engine is about to commit, in feed order.
#[derive(Debug, Clone, Default)]
pub struct TransactionData {
    created_nodes: Vec<NodeHandle>,
    created_relationships: Vec<RelationshipHandle>,
    deleted_nodes: Vec<NodeHandle>,
    deleted_relationships: Vec<RelationshipHandle>,
    assigned_node_properties: Vec<PropertyEntry<NodeHandle>>,
    removed_node_properties: Vec<PropertyEntry<NodeHandle>>,
    assigned_relationship_properties: Vec<PropertyEntry<RelationshipHandle>>,
    removed_relationship_properties: Vec<PropertyEntry<RelationshipHandle>>,
    nodes: HashMap<NodeId, NodeHandle>,
    deleted_node_ids: HashSet<NodeId>,
    deleted_relationship_ids: HashSet<RelationshipId>,
}

impl TransactionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node snapshot for endpoint lookup without marking it
    /// created or deleted.
    pub fn record_node(&mut self, handle: NodeHandle) {
        self.nodes.insert(handle.id, handle);
    }

    pub fn add_created_node(&mut self, handle: NodeHandle) {
        self.nodes.insert(handle.id, handle.clone());
        self.created_nodes.push(handle);
    }

    pub fn add_created_relationship(&mut self, handle: RelationshipHandle) {
        self.created_relationships.push(handle);
    }

    /// Mark a node deleted. Its former properties are expected to arrive as
    /// removed entries.
    pub fn add_deleted_node(&mut self, id: NodeId) {
        self.deleted_node_ids.insert(id);
        self.deleted_nodes.push(NodeHandle::new(id, PropertyMap::new()));
    }

    /// Mark a relationship deleted. The handle keeps kind and endpoints for
    /// the pipeline; former properties arrive as removed entries.
    pub fn add_deleted_relationship(&mut self, handle: RelationshipHandle) {
        self.deleted_relationship_ids.insert(handle.id);
        self.deleted_relationships.push(handle);
    }

    pub fn assign_node_property(
        &mut self,
        owner: NodeHandle,
        db_name: impl Into<String>,
        value: Value,
        previous: Option<Value>,
    ) {
        self.assigned_node_properties.push(PropertyEntry {
            owner,
            db_name: db_name.into(),
            value: Some(value),
            previous,
        });
    }

    pub fn remove_node_property(
        &mut self,
        owner: NodeHandle,
        db_name: impl Into<String>,
        previous: Option<Value>,
    ) {
        self.removed_node_properties.push(PropertyEntry {
            owner,
            db_name: db_name.into(),
            value: None,
            previous,
        });
    }

    pub fn assign_relationship_property(
        &mut self,
        owner: RelationshipHandle,
        db_name: impl Into<String>,
        value: Value,
        previous: Option<Value>,
    ) {
        self.assigned_relationship_properties.push(PropertyEntry {
            owner,
            db_name: db_name.into(),
            value: Some(value),
            previous,
        });
    }

    pub fn remove_relationship_property(
        &mut self,
        owner: RelationshipHandle,
        db_name: impl Into<String>,
        previous: Option<Value>,
    ) {
        self.removed_relationship_properties.push(PropertyEntry {
            owner,
            db_name: db_name.into(),
            value: None,
            previous,
        });
    }

    pub fn created_nodes(&self) -> &[NodeHandle] {
        &self.created_nodes
    }

    pub fn created_relationships(&self) -> &[RelationshipHandle] {
        &self.created_relationships
    }

    pub fn deleted_nodes(&self) -> &[NodeHandle] {
        &self.deleted_nodes
    }

    pub fn deleted_relationships(&self) -> &[RelationshipHandle] {
        &self.deleted_relationships
    }

    pub fn assigned_node_properties(&self) -> &[PropertyEntry<NodeHandle>] {
        &self.assigned_node_properties
    }

    pub fn removed_node_properties(&self) -> &[PropertyEntry<NodeHandle>] {
        &self.removed_node_properties
    }

    pub fn assigned_relationship_properties(&self) -> &[PropertyEntry<RelationshipHandle>] {
        &self.assigned_relationship_properties
    }

    pub fn removed_relationship_properties(&self) -> &[PropertyEntry<RelationshipHandle>] {
        &self.removed_relationship_properties
    }

    /// Post-transaction snapshot of an involved node, if one was recorded.
    pub fn node(&self, id: NodeId) -> Option<&NodeHandle> {
        self.nodes.get(&id)
    }

    pub fn is_node_deleted(&self, id: NodeId) -> bool {
        self.deleted_node_ids.contains(&id)
    }

    pub fn is_relationship_deleted(&self, id: RelationshipId) -> bool {
        self.deleted_relationship_ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.created_nodes.is_empty()
            && self.created_relationships.is_empty()
            && self.deleted_nodes.is_empty()
            && self.deleted_relationships.is_empty()
            && self.assigned_node_properties.is_empty()
            && self.removed_node_properties.is_empty()
            && self.assigned_relationship_properties.is_empty()
            && self.removed_relationship_properties.is_empty()
    }
}

//! Per-transaction record of created, modified and deleted entities.
//!
//! Buckets keep insertion order and deduplicate by entity id, so listeners
//! observe each entity once no matter how many property entries touched
//! it. The change set also tracks which relationship endpoints were
//! touched and whether any non-system property changed, which downstream
//! consumers use to skip bookkeeping-only transactions.

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::entity::{EntityId, GraphEntity};
use crate::models::relation::RelKind;

#[derive(Debug, Clone, Default)]
pub struct TransactionChangeSet {
    created_nodes: Vec<Arc<GraphEntity>>,
    created_relationships: Vec<Arc<GraphEntity>>,
    modified_nodes: Vec<Arc<GraphEntity>>,
    modified_relationships: Vec<Arc<GraphEntity>>,
    deleted_nodes: Vec<Arc<GraphEntity>>,
    deleted_relationships: Vec<Arc<GraphEntity>>,
    created_ids: HashSet<EntityId>,
    modified_ids: HashSet<EntityId>,
    deleted_ids: HashSet<EntityId>,
    touched_endpoints: Vec<(Arc<GraphEntity>, RelKind)>,
    touched_endpoint_ids: HashSet<(EntityId, RelKind)>,
    non_system_property: bool,
}

impl TransactionChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, entity: Arc<GraphEntity>) {
        if self.created_ids.insert(entity.entity_id()) {
            if entity.is_node() {
                self.created_nodes.push(entity);
            } else {
                self.created_relationships.push(entity);
            }
        }
    }

    pub fn modify(&mut self, entity: Arc<GraphEntity>) {
        if self.modified_ids.insert(entity.entity_id()) {
            if entity.is_node() {
                self.modified_nodes.push(entity);
            } else {
                self.modified_relationships.push(entity);
            }
        }
    }

    pub fn delete(&mut self, entity: Arc<GraphEntity>) {
        if self.deleted_ids.insert(entity.entity_id()) {
            if entity.is_node() {
                self.deleted_nodes.push(entity);
            } else {
                self.deleted_relationships.push(entity);
            }
        }
    }

    /// Record a node touched as the endpoint of a created or deleted
    /// relationship. Deduplicated per `(node, kind)` pair.
    pub fn modify_relationship_endpoint(&mut self, endpoint: Arc<GraphEntity>, rel_kind: RelKind) {
        let marker = (endpoint.entity_id(), rel_kind.clone());
        if self.touched_endpoint_ids.insert(marker) {
            self.touched_endpoints.push((endpoint, rel_kind));
        }
    }

    pub fn set_non_system_property(&mut self) {
        self.non_system_property = true;
    }

    pub fn has_non_system_property(&self) -> bool {
        self.non_system_property
    }

    pub fn created_nodes(&self) -> &[Arc<GraphEntity>] {
        &self.created_nodes
    }

    pub fn created_relationships(&self) -> &[Arc<GraphEntity>] {
        &self.created_relationships
    }

    pub fn modified_nodes(&self) -> &[Arc<GraphEntity>] {
        &self.modified_nodes
    }

    pub fn modified_relationships(&self) -> &[Arc<GraphEntity>] {
        &self.modified_relationships
    }

    pub fn deleted_nodes(&self) -> &[Arc<GraphEntity>] {
        &self.deleted_nodes
    }

    pub fn deleted_relationships(&self) -> &[Arc<GraphEntity>] {
        &self.deleted_relationships
    }

    pub fn touched_endpoints(&self) -> &[(Arc<GraphEntity>, RelKind)] {
        &self.touched_endpoints
    }

    /// Whether the entity was created or deleted within this transaction.
    /// Used to suppress redundant modified notifications.
    pub fn is_new_or_deleted(&self, entity: &GraphEntity) -> bool {
        let id = entity.entity_id();
        self.created_ids.contains(&id) || self.deleted_ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.created_nodes.is_empty()
            && self.created_relationships.is_empty()
            && self.modified_nodes.is_empty()
            && self.modified_relationships.is_empty()
            && self.deleted_nodes.is_empty()
            && self.deleted_relationships.is_empty()
            && self.touched_endpoints.is_empty()
    }
}

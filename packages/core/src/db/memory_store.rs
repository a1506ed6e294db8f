//! Embedded In-Memory Graph Engine
//!
//! [`MemoryGraphStore`] keeps committed nodes and relationships under a
//! single mutex and funnels every mutation through a [`GraphTransaction`].
//! Transactions stage their changes locally, describe them as
//! [`TransactionData`] and hand that description to the commit pipeline;
//! staged state reaches the shared maps only when the pipeline accepts the
//! transaction.
//!
//! # Architecture
//!
//! - **Staged writes**: created entities, property overlays and deletion
//!   snapshots live on the transaction until commit, so concurrent readers
//!   never observe half-applied work
//! - **Cascade on delete**: deleting a node removes its incident
//!   relationships and follows registered cascade policies transitively,
//!   with a visited set guarding against cycles
//! - **Pipeline contract**: a rejected commit discards the staged state and
//!   surfaces the recorded [`CommitFailure`] as
//!   [`StoreError::TransactionAborted`]
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use graft_core::db::MemoryGraphStore;
//! use graft_core::models::AccessContext;
//! use graft_core::registry::EntityRegistry;
//! use graft_core::tx::CommitPipeline;
//! use serde_json::json;
//!
//! let registry = Arc::new(EntityRegistry::new());
//! let pipeline = Arc::new(CommitPipeline::new(registry.clone()));
//! pipeline.set_ready(true);
//! let store = MemoryGraphStore::new(registry, pipeline);
//!
//! let ctx = AccessContext::system();
//! let mut tx = store.begin(&ctx);
//! let id = tx.create_node(
//!     "Folder",
//!     [("name".to_string(), json!("inbox"))].into(),
//! );
//! tx.commit()?;
//!
//! let folder = store.node(id).unwrap();
//! assert_eq!(folder.type_name(), "Folder");
//! assert_eq!(folder.property("name"), Some(&json!("inbox")));
//! # Ok::<(), graft_core::db::StoreError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::models::context::AccessContext;
use crate::models::entity::{NodeEntity, NodeId, RelationshipEntity, RelationshipId};
use crate::models::property::{PropertyMap, CREATED_AT_KEY, TYPE_KEY, UUID_KEY};
use crate::models::relation::{CascadePolicy, RelKind};
use crate::models::types::{TypeName, GRAPH_OBJECT_TYPE};
use crate::registry::EntityRegistry;
use crate::tx::{CommitPipeline, TransactionKey};

use super::error::StoreError;
use super::tx_data::{NodeHandle, RelationshipHandle, TransactionData};

/// Committed relationship record.
#[derive(Debug, Clone)]
struct StoredRelationship {
    kind: RelKind,
    start: NodeId,
    end: NodeId,
    properties: PropertyMap,
}

fn relationship_handle(id: RelationshipId, stored: &StoredRelationship) -> RelationshipHandle {
    RelationshipHandle::new(
        id,
        stored.kind.clone(),
        stored.start,
        stored.end,
        stored.properties.clone(),
    )
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeMap<NodeId, PropertyMap>,
    relationships: BTreeMap<RelationshipId, StoredRelationship>,
}

/// In-memory graph engine wired to a commit pipeline.
#[derive(Debug)]
pub struct MemoryGraphStore {
    registry: Arc<EntityRegistry>,
    pipeline: Arc<CommitPipeline>,
    state: Mutex<GraphState>,
    next_node_id: AtomicU64,
    next_relationship_id: AtomicU64,
    next_transaction_key: AtomicU64,
}

impl MemoryGraphStore {
    pub fn new(registry: Arc<EntityRegistry>, pipeline: Arc<CommitPipeline>) -> Self {
        Self {
            registry,
            pipeline,
            state: Mutex::new(GraphState::default()),
            next_node_id: AtomicU64::new(1),
            next_relationship_id: AtomicU64::new(1),
            next_transaction_key: AtomicU64::new(1),
        }
    }

    /// Opens a transaction. The pipeline is notified immediately so `begin`
    /// listeners fire and a change-set slot exists for the key.
    pub fn begin(&self, ctx: &AccessContext) -> GraphTransaction<'_> {
        let key = TransactionKey(self.next_transaction_key.fetch_add(1, Ordering::SeqCst));
        self.pipeline.begin(ctx, key);
        tracing::debug!("transaction {} begun", key);
        GraphTransaction {
            store: self,
            ctx: ctx.clone(),
            key,
            staged: Staged::default(),
            finished: false,
        }
    }

    /// Committed node by id.
    pub fn node(&self, id: NodeId) -> Option<NodeEntity> {
        let state = self.lock_state();
        state
            .nodes
            .get(&id)
            .map(|properties| NodeEntity::from_parts(id, properties.clone()))
    }

    /// Committed relationship by id.
    pub fn relationship(&self, id: RelationshipId) -> Option<RelationshipEntity> {
        let state = self.lock_state();
        state.relationships.get(&id).map(|stored| {
            RelationshipEntity::from_parts(
                id,
                stored.kind.clone(),
                stored.start,
                stored.end,
                stored.properties.clone(),
            )
        })
    }

    /// Committed node carrying the given `uuid` property.
    pub fn node_by_uuid(&self, uuid: &str) -> Option<NodeEntity> {
        let state = self.lock_state();
        state
            .nodes
            .iter()
            .find(|(_, properties)| {
                properties.get(UUID_KEY).and_then(Value::as_str) == Some(uuid)
            })
            .map(|(id, properties)| NodeEntity::from_parts(*id, properties.clone()))
    }

    /// All committed relationships touching the node, in id order.
    pub fn relationships_of(&self, node: NodeId) -> Vec<RelationshipEntity> {
        let state = self.lock_state();
        state
            .relationships
            .iter()
            .filter(|(_, stored)| stored.start == node || stored.end == node)
            .map(|(id, stored)| {
                RelationshipEntity::from_parts(
                    *id,
                    stored.kind.clone(),
                    stored.start,
                    stored.end,
                    stored.properties.clone(),
                )
            })
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.lock_state().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.lock_state().relationships.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Staged assignment, recorded per call with the value it replaced.
#[derive(Debug)]
struct StagedAssignment<I> {
    owner: I,
    db_name: String,
    value: Value,
    previous: Option<Value>,
}

/// Staged removal of a property that had a value.
#[derive(Debug)]
struct StagedRemoval<I> {
    owner: I,
    db_name: String,
    previous: Value,
}

#[derive(Debug, Default)]
struct Staged {
    created_nodes: BTreeMap<NodeId, PropertyMap>,
    created_relationships: BTreeMap<RelationshipId, StoredRelationship>,
    node_overlays: BTreeMap<NodeId, PropertyMap>,
    relationship_overlays: BTreeMap<RelationshipId, PropertyMap>,
    deleted_nodes: BTreeMap<NodeId, PropertyMap>,
    deleted_relationships: BTreeMap<RelationshipId, StoredRelationship>,
    node_assignments: Vec<StagedAssignment<NodeId>>,
    relationship_assignments: Vec<StagedAssignment<RelationshipId>>,
    node_removals: Vec<StagedRemoval<NodeId>>,
    relationship_removals: Vec<StagedRemoval<RelationshipId>>,
}

/// A unit of work against a [`MemoryGraphStore`].
///
/// Mutations stage locally; [`commit`](GraphTransaction::commit) runs the
/// pipeline and either applies or discards the staged state. Dropping an
/// unfinished transaction rolls it back.
#[derive(Debug)]
pub struct GraphTransaction<'a> {
    store: &'a MemoryGraphStore,
    ctx: AccessContext,
    key: TransactionKey,
    staged: Staged,
    finished: bool,
}

impl GraphTransaction<'_> {
    pub fn key(&self) -> TransactionKey {
        self.key
    }

    pub fn context(&self) -> &AccessContext {
        &self.ctx
    }

    /// Stages a new node. The `type` property is forced to `type_name`;
    /// `uuid` and `created_at` are generated unless supplied. Creation
    /// transformations registered along the type's resolution chain run in
    /// ascending order before the node is staged.
    pub fn create_node(
        &mut self,
        type_name: impl Into<TypeName>,
        properties: PropertyMap,
    ) -> NodeId {
        let type_name = type_name.into();
        let id = NodeId(self.store.next_node_id.fetch_add(1, Ordering::SeqCst));
        let mut properties = properties;
        properties.insert(TYPE_KEY.to_string(), Value::String(type_name.clone()));
        properties
            .entry(UUID_KEY.to_string())
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        properties
            .entry(CREATED_AT_KEY.to_string())
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        for transformation in self.store.registry.creation_transformations(&type_name) {
            transformation.apply(&self.ctx, &mut properties);
        }
        self.staged.created_nodes.insert(id, properties);
        id
    }

    /// Stages a new relationship. Both endpoints must exist, committed or
    /// staged in this transaction.
    pub fn create_relationship(
        &mut self,
        kind: impl Into<RelKind>,
        start: NodeId,
        end: NodeId,
        properties: PropertyMap,
    ) -> Result<RelationshipId, StoreError> {
        for endpoint in [start, end] {
            if !self.node_exists(endpoint) {
                return Err(StoreError::EndpointMissing(endpoint));
            }
        }
        let id = RelationshipId(self.store.next_relationship_id.fetch_add(1, Ordering::SeqCst));
        let mut properties = properties;
        properties
            .entry(UUID_KEY.to_string())
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        self.staged.created_relationships.insert(
            id,
            StoredRelationship {
                kind: kind.into(),
                start,
                end,
                properties,
            },
        );
        Ok(id)
    }

    pub fn set_node_property(
        &mut self,
        id: NodeId,
        db_name: impl Into<String>,
        value: Value,
    ) -> Result<(), StoreError> {
        let db_name = db_name.into();
        if let Some(properties) = self.staged.created_nodes.get_mut(&id) {
            properties.insert(db_name, value);
            return Ok(());
        }
        self.ensure_node_overlay(id)?;
        let previous = self
            .staged
            .node_overlays
            .entry(id)
            .or_default()
            .insert(db_name.clone(), value.clone());
        self.staged.node_assignments.push(StagedAssignment {
            owner: id,
            db_name,
            value,
            previous,
        });
        Ok(())
    }

    /// Removing an absent property is a no-op.
    pub fn remove_node_property(&mut self, id: NodeId, db_name: &str) -> Result<(), StoreError> {
        if let Some(properties) = self.staged.created_nodes.get_mut(&id) {
            properties.remove(db_name);
            return Ok(());
        }
        self.ensure_node_overlay(id)?;
        let removed = self
            .staged
            .node_overlays
            .entry(id)
            .or_default()
            .remove(db_name);
        if let Some(previous) = removed {
            self.staged.node_removals.push(StagedRemoval {
                owner: id,
                db_name: db_name.to_string(),
                previous,
            });
        }
        Ok(())
    }

    pub fn set_relationship_property(
        &mut self,
        id: RelationshipId,
        db_name: impl Into<String>,
        value: Value,
    ) -> Result<(), StoreError> {
        let db_name = db_name.into();
        if let Some(stored) = self.staged.created_relationships.get_mut(&id) {
            stored.properties.insert(db_name, value);
            return Ok(());
        }
        self.ensure_relationship_overlay(id)?;
        let previous = self
            .staged
            .relationship_overlays
            .entry(id)
            .or_default()
            .insert(db_name.clone(), value.clone());
        self.staged.relationship_assignments.push(StagedAssignment {
            owner: id,
            db_name,
            value,
            previous,
        });
        Ok(())
    }

    pub fn remove_relationship_property(
        &mut self,
        id: RelationshipId,
        db_name: &str,
    ) -> Result<(), StoreError> {
        if let Some(stored) = self.staged.created_relationships.get_mut(&id) {
            stored.properties.remove(db_name);
            return Ok(());
        }
        self.ensure_relationship_overlay(id)?;
        let removed = self
            .staged
            .relationship_overlays
            .entry(id)
            .or_default()
            .remove(db_name);
        if let Some(previous) = removed {
            self.staged.relationship_removals.push(StagedRemoval {
                owner: id,
                db_name: db_name.to_string(),
                previous,
            });
        }
        Ok(())
    }

    /// Deleting a relationship created in this transaction leaves no trace.
    pub fn delete_relationship(&mut self, id: RelationshipId) -> Result<(), StoreError> {
        if self.staged.created_relationships.remove(&id).is_some() {
            return Ok(());
        }
        if self.staged.deleted_relationships.contains_key(&id) {
            return Err(StoreError::UnknownRelationship(id));
        }
        let mut snapshot = self
            .store
            .lock_state()
            .relationships
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownRelationship(id))?;
        if let Some(overlay) = self.staged.relationship_overlays.remove(&id) {
            snapshot.properties = overlay;
        }
        self.staged.deleted_relationships.insert(id, snapshot);
        Ok(())
    }

    /// Deletes the node, its incident relationships, and transitively every
    /// node a registered cascade policy points at. A visited set keeps
    /// cyclic cascades terminating.
    pub fn delete_node(&mut self, id: NodeId) -> Result<(), StoreError> {
        if !self.node_exists(id) {
            return Err(StoreError::UnknownNode(id));
        }
        let mut queue = VecDeque::from([id]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) || !self.node_exists(current) {
                continue;
            }
            queue.extend(self.delete_single_node(current));
        }
        Ok(())
    }

    /// Commits the staged changes through the pipeline. On rejection the
    /// staged state is discarded and the recorded failure is returned.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        let data = self.build_transaction_data();
        match self.store.pipeline.before_commit(&self.ctx, self.key, &data) {
            Ok(()) => {
                self.apply();
                self.store.pipeline.after_commit(self.key);
                tracing::debug!("transaction {} committed", self.key);
                Ok(())
            }
            Err(_) => {
                let failure = self.store.pipeline.after_rollback(self.key);
                tracing::warn!(
                    "transaction {} aborted with status {}",
                    self.key,
                    failure.status
                );
                Err(StoreError::TransactionAborted(failure))
            }
        }
    }

    /// Discards the staged changes without running commit validation.
    pub fn rollback(mut self) {
        self.finished = true;
        self.store.pipeline.after_rollback(self.key);
        tracing::debug!("transaction {} rolled back", self.key);
    }

    fn node_exists(&self, id: NodeId) -> bool {
        if self.staged.deleted_nodes.contains_key(&id) {
            return false;
        }
        self.staged.created_nodes.contains_key(&id)
            || self.staged.node_overlays.contains_key(&id)
            || self.store.lock_state().nodes.contains_key(&id)
    }

    fn ensure_node_overlay(&mut self, id: NodeId) -> Result<(), StoreError> {
        if self.staged.deleted_nodes.contains_key(&id) {
            return Err(StoreError::UnknownNode(id));
        }
        if self.staged.node_overlays.contains_key(&id) {
            return Ok(());
        }
        let committed = self
            .store
            .lock_state()
            .nodes
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownNode(id))?;
        self.staged.node_overlays.insert(id, committed);
        Ok(())
    }

    fn ensure_relationship_overlay(&mut self, id: RelationshipId) -> Result<(), StoreError> {
        if self.staged.deleted_relationships.contains_key(&id) {
            return Err(StoreError::UnknownRelationship(id));
        }
        if self.staged.relationship_overlays.contains_key(&id) {
            return Ok(());
        }
        let committed = self
            .store
            .lock_state()
            .relationships
            .get(&id)
            .map(|stored| stored.properties.clone())
            .ok_or(StoreError::UnknownRelationship(id))?;
        self.staged.relationship_overlays.insert(id, committed);
        Ok(())
    }

    /// Node properties as this transaction sees them. `None` when the node
    /// does not exist or was deleted here.
    fn effective_node_properties(&self, id: NodeId) -> Option<PropertyMap> {
        if self.staged.deleted_nodes.contains_key(&id) {
            return None;
        }
        if let Some(properties) = self.staged.created_nodes.get(&id) {
            return Some(properties.clone());
        }
        if let Some(properties) = self.staged.node_overlays.get(&id) {
            return Some(properties.clone());
        }
        self.store.lock_state().nodes.get(&id).cloned()
    }

    fn effective_node_type(&self, id: NodeId) -> TypeName {
        self.effective_node_properties(id)
            .and_then(|properties| {
                properties
                    .get(TYPE_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| GRAPH_OBJECT_TYPE.to_string())
    }

    /// Incident relationships still alive in this transaction, with staged
    /// property overlays applied.
    fn incident_relationships(&self, id: NodeId) -> Vec<(RelationshipId, StoredRelationship)> {
        let mut incident = Vec::new();
        {
            let state = self.store.lock_state();
            for (rel_id, stored) in &state.relationships {
                if self.staged.deleted_relationships.contains_key(rel_id) {
                    continue;
                }
                if stored.start != id && stored.end != id {
                    continue;
                }
                let mut stored = stored.clone();
                if let Some(overlay) = self.staged.relationship_overlays.get(rel_id) {
                    stored.properties = overlay.clone();
                }
                incident.push((*rel_id, stored));
            }
        }
        for (rel_id, stored) in &self.staged.created_relationships {
            if stored.start == id || stored.end == id {
                incident.push((*rel_id, stored.clone()));
            }
        }
        incident
    }

    /// Stages the deletion of one node and returns the cascade targets its
    /// relationships point at.
    fn delete_single_node(&mut self, id: NodeId) -> Vec<NodeId> {
        let node_type = self.effective_node_type(id);
        let mut cascade = Vec::new();

        for (rel_id, relationship) in self.incident_relationships(id) {
            if self.staged.created_relationships.remove(&rel_id).is_none() {
                self.staged.relationship_overlays.remove(&rel_id);
                self.staged
                    .deleted_relationships
                    .insert(rel_id, relationship.clone());
            }
            let other = if relationship.start == id {
                relationship.end
            } else {
                relationship.start
            };
            if other == id {
                continue;
            }
            let outgoing = relationship.start == id;
            let other_type = self.effective_node_type(other);
            let class = if outgoing {
                self.store.registry.relation_class(&node_type, &other_type)
            } else {
                self.store.registry.relation_class(&other_type, &node_type)
            };
            let Some(class) = class else {
                continue;
            };
            if class.rel_kind != relationship.kind {
                continue;
            }
            let follows = match class.cascade {
                CascadePolicy::SourceDeletesTarget => outgoing,
                CascadePolicy::TargetDeletesSource => !outgoing,
                CascadePolicy::None => false,
            };
            if follows {
                cascade.push(other);
            }
        }

        if self.staged.created_nodes.remove(&id).is_none() {
            if let Some(properties) = self.effective_node_properties(id) {
                self.staged.deleted_nodes.insert(id, properties);
            }
            self.staged.node_overlays.remove(&id);
        }
        cascade
    }

    fn live_node_handle(&self, id: NodeId) -> Option<NodeHandle> {
        let properties = self
            .staged
            .node_overlays
            .get(&id)
            .cloned()
            .or_else(|| self.store.lock_state().nodes.get(&id).cloned())?;
        Some(NodeHandle::new(id, properties))
    }

    fn live_relationship_handle(&self, id: RelationshipId) -> Option<RelationshipHandle> {
        let state = self.store.lock_state();
        let stored = state.relationships.get(&id)?;
        let properties = self
            .staged
            .relationship_overlays
            .get(&id)
            .cloned()
            .unwrap_or_else(|| stored.properties.clone());
        Some(RelationshipHandle::new(
            id,
            stored.kind.clone(),
            stored.start,
            stored.end,
            properties,
        ))
    }

    /// Describes the staged changes for the pipeline. Properties of created
    /// entities appear as assignments without a previous value; deletions
    /// report every former property as removed.
    fn build_transaction_data(&self) -> TransactionData {
        let mut data = TransactionData::new();

        for (id, properties) in &self.staged.created_nodes {
            let handle = NodeHandle::new(*id, properties.clone());
            data.add_created_node(handle.clone());
            for (db_name, value) in properties {
                data.assign_node_property(handle.clone(), db_name.clone(), value.clone(), None);
            }
        }
        for (id, stored) in &self.staged.created_relationships {
            let handle = relationship_handle(*id, stored);
            data.add_created_relationship(handle.clone());
            for (db_name, value) in &stored.properties {
                data.assign_relationship_property(
                    handle.clone(),
                    db_name.clone(),
                    value.clone(),
                    None,
                );
            }
        }

        for change in &self.staged.node_assignments {
            if self.staged.deleted_nodes.contains_key(&change.owner) {
                continue;
            }
            let Some(handle) = self.live_node_handle(change.owner) else {
                continue;
            };
            data.assign_node_property(
                handle,
                change.db_name.clone(),
                change.value.clone(),
                change.previous.clone(),
            );
        }
        for change in &self.staged.relationship_assignments {
            if self.staged.deleted_relationships.contains_key(&change.owner) {
                continue;
            }
            let Some(handle) = self.live_relationship_handle(change.owner) else {
                continue;
            };
            data.assign_relationship_property(
                handle,
                change.db_name.clone(),
                change.value.clone(),
                change.previous.clone(),
            );
        }

        for removal in &self.staged.node_removals {
            let handle = match self.staged.deleted_nodes.get(&removal.owner) {
                Some(snapshot) => NodeHandle::new(removal.owner, snapshot.clone()),
                None => match self.live_node_handle(removal.owner) {
                    Some(handle) => handle,
                    None => continue,
                },
            };
            data.remove_node_property(
                handle,
                removal.db_name.clone(),
                Some(removal.previous.clone()),
            );
        }
        for removal in &self.staged.relationship_removals {
            let handle = match self.staged.deleted_relationships.get(&removal.owner) {
                Some(snapshot) => relationship_handle(removal.owner, snapshot),
                None => match self.live_relationship_handle(removal.owner) {
                    Some(handle) => handle,
                    None => continue,
                },
            };
            data.remove_relationship_property(
                handle,
                removal.db_name.clone(),
                Some(removal.previous.clone()),
            );
        }

        // Deletion-generated removals come last so their previous values win
        // when the same property was also removed explicitly.
        for (id, snapshot) in &self.staged.deleted_nodes {
            let handle = NodeHandle::new(*id, snapshot.clone());
            for (db_name, value) in snapshot {
                data.remove_node_property(handle.clone(), db_name.clone(), Some(value.clone()));
            }
            data.add_deleted_node(*id);
        }
        for (id, snapshot) in &self.staged.deleted_relationships {
            let handle = relationship_handle(*id, snapshot);
            for (db_name, value) in &snapshot.properties {
                data.remove_relationship_property(
                    handle.clone(),
                    db_name.clone(),
                    Some(value.clone()),
                );
            }
            data.add_deleted_relationship(handle);
        }

        // Endpoint snapshots for the pipeline's relationship touches.
        let mut endpoints = BTreeSet::new();
        for stored in self.staged.created_relationships.values() {
            endpoints.insert(stored.start);
            endpoints.insert(stored.end);
        }
        for stored in self.staged.deleted_relationships.values() {
            endpoints.insert(stored.start);
            endpoints.insert(stored.end);
        }
        for id in endpoints {
            if self.staged.created_nodes.contains_key(&id) {
                continue;
            }
            if let Some(properties) = self.effective_node_properties(id) {
                data.record_node(NodeHandle::new(id, properties));
            }
        }

        data
    }

    fn apply(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        let mut state = self.store.lock_state();
        for (id, properties) in staged.created_nodes {
            state.nodes.insert(id, properties);
        }
        for (id, stored) in staged.created_relationships {
            state.relationships.insert(id, stored);
        }
        for (id, properties) in staged.node_overlays {
            if let Some(slot) = state.nodes.get_mut(&id) {
                *slot = properties;
            }
        }
        for (id, properties) in staged.relationship_overlays {
            if let Some(stored) = state.relationships.get_mut(&id) {
                stored.properties = properties;
            }
        }
        for id in staged.deleted_relationships.into_keys() {
            state.relationships.remove(&id);
        }
        for id in staged.deleted_nodes.into_keys() {
            state.nodes.remove(&id);
        }
    }
}

impl Drop for GraphTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.pipeline.after_rollback(self.key);
            tracing::debug!("transaction {} dropped without commit", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::GraphEntity;
    use crate::models::error::{ErrorBuffer, TOKEN_MUST_NOT_BE_EMPTY};
    use crate::models::lifecycle::CreationTransformation;
    use crate::models::property::PropertyKey;
    use crate::models::relation::{Cardinality, Direction, RelationClass};
    use crate::models::types::TypeDefinition;
    use crate::models::validators::NonEmptyValidator;
    use crate::tx::TransactionListener;
    use serde_json::json;

    fn test_store() -> MemoryGraphStore {
        let registry = Arc::new(EntityRegistry::new());
        let pipeline = Arc::new(CommitPipeline::new(registry.clone()));
        pipeline.set_ready(true);
        MemoryGraphStore::new(registry, pipeline)
    }

    fn props(entries: &[(&str, Value)]) -> PropertyMap {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[derive(Default)]
    struct CreationCounter {
        created: Mutex<usize>,
    }

    impl TransactionListener for CreationCounter {
        fn graph_object_created(
            &self,
            _ctx: &AccessContext,
            _key: TransactionKey,
            _errors: &mut ErrorBuffer,
            _entity: &GraphEntity,
        ) -> bool {
            *self.created.lock().unwrap() += 1;
            true
        }
    }

    #[test]
    fn test_create_node_commit_and_read_back() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let id = tx.create_node("Folder", props(&[("name", json!("inbox"))]));
        tx.commit().unwrap();

        let folder = store.node(id).unwrap();
        assert_eq!(folder.type_name(), "Folder");
        assert_eq!(folder.property("name"), Some(&json!("inbox")));
        let uuid = folder.property("uuid").and_then(Value::as_str).unwrap();
        assert_eq!(uuid.len(), 36);
        assert!(folder.property("created_at").is_some());

        assert_eq!(store.node_by_uuid(uuid).unwrap().id(), id);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_supplied_uuid_is_kept() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let id = tx.create_node("Folder", props(&[("uuid", json!("fixed-id"))]));
        tx.commit().unwrap();

        assert_eq!(
            store.node(id).unwrap().property("uuid"),
            Some(&json!("fixed-id"))
        );
        assert_eq!(store.node_by_uuid("fixed-id").unwrap().id(), id);
    }

    #[test]
    fn test_creation_transformations_seed_properties() {
        struct SeedStatus;
        impl CreationTransformation for SeedStatus {
            fn apply(&self, _ctx: &AccessContext, properties: &mut PropertyMap) {
                properties
                    .entry("status".to_string())
                    .or_insert_with(|| json!("draft"));
            }
        }

        let store = test_store();
        store.registry.register_type(TypeDefinition::node("Task"));
        store
            .registry
            .register_creation_transformation("Task", Arc::new(SeedStatus));
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let id = tx.create_node("Task", PropertyMap::new());
        tx.commit().unwrap();

        assert_eq!(
            store.node(id).unwrap().property("status"),
            Some(&json!("draft"))
        );
    }

    #[test]
    fn test_set_and_remove_properties_across_transactions() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let id = tx.create_node(
            "Page",
            props(&[("title", json!("Old")), ("subtitle", json!("Keep?"))]),
        );
        tx.commit().unwrap();

        let mut tx = store.begin(&ctx);
        tx.set_node_property(id, "title", json!("New")).unwrap();
        tx.remove_node_property(id, "subtitle").unwrap();
        tx.commit().unwrap();

        let page = store.node(id).unwrap();
        assert_eq!(page.property("title"), Some(&json!("New")));
        assert_eq!(page.property("subtitle"), None);
    }

    #[test]
    fn test_validator_rejection_rolls_back() {
        let store = test_store();
        store.registry.register_type(TypeDefinition::node("Page"));
        let title = store
            .registry
            .register_property_key("Page", PropertyKey::new("Page", "title"));
        store
            .registry
            .register_validator("Page", &title, Arc::new(NonEmptyValidator));
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        tx.create_node("Page", props(&[("title", json!(""))]));
        let error = tx.commit().unwrap_err();

        match error {
            StoreError::TransactionAborted(failure) => {
                assert_eq!(failure.status, 422);
                assert_eq!(failure.errors.tokens()[0].token, TOKEN_MUST_NOT_BE_EMPTY);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_create_relationship_requires_endpoints() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let start = tx.create_node("Page", PropertyMap::new());
        let error = tx
            .create_relationship("LINKS_TO", start, NodeId(999), PropertyMap::new())
            .unwrap_err();
        assert_eq!(error, StoreError::EndpointMissing(NodeId(999)));
    }

    #[test]
    fn test_relationship_round_trip() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let a = tx.create_node("Page", PropertyMap::new());
        let b = tx.create_node("Image", PropertyMap::new());
        let rel = tx
            .create_relationship("SHOWS", a, b, props(&[("caption", json!("Cover"))]))
            .unwrap();
        tx.commit().unwrap();

        let shown = store.relationship(rel).unwrap();
        assert_eq!(shown.kind().as_str(), "SHOWS");
        assert_eq!(shown.start(), a);
        assert_eq!(shown.end(), b);
        assert_eq!(shown.property("caption"), Some(&json!("Cover")));
        assert_eq!(store.relationships_of(a).len(), 1);
        assert_eq!(store.relationships_of(b).len(), 1);
    }

    #[test]
    fn test_delete_node_drops_incident_relationships() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let a = tx.create_node("Page", PropertyMap::new());
        let b = tx.create_node("Image", PropertyMap::new());
        tx.create_relationship("SHOWS", a, b, PropertyMap::new())
            .unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin(&ctx);
        tx.delete_node(a).unwrap();
        tx.commit().unwrap();

        assert!(store.node(a).is_none());
        // No cascade registered, the other endpoint survives.
        assert!(store.node(b).is_some());
        assert_eq!(store.relationship_count(), 0);
    }

    #[test]
    fn test_cascade_source_deletes_target_transitively() {
        let store = test_store();
        store.registry.register_type(TypeDefinition::node("Folder"));
        store.registry.register_entity_relation(
            "Folder",
            RelationClass::new(
                "Folder",
                RelKind::from("CONTAINS"),
                Direction::Outgoing,
                Cardinality::OneToMany,
            )
            .with_cascade(CascadePolicy::SourceDeletesTarget),
        );
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let f1 = tx.create_node("Folder", PropertyMap::new());
        let f2 = tx.create_node("Folder", PropertyMap::new());
        let f3 = tx.create_node("Folder", PropertyMap::new());
        tx.create_relationship("CONTAINS", f1, f2, PropertyMap::new())
            .unwrap();
        tx.create_relationship("CONTAINS", f2, f3, PropertyMap::new())
            .unwrap();
        // Cycle back to the root; the visited set must keep this finite.
        tx.create_relationship("CONTAINS", f3, f1, PropertyMap::new())
            .unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin(&ctx);
        tx.delete_node(f1).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.node_count(), 0);
        assert_eq!(store.relationship_count(), 0);
    }

    #[test]
    fn test_cascade_target_deletes_source() {
        let store = test_store();
        store.registry.register_type(TypeDefinition::node("Page"));
        store.registry.register_entity_relation(
            "Page",
            RelationClass::new(
                "Image",
                RelKind::from("SHOWS"),
                Direction::Outgoing,
                Cardinality::ManyToMany,
            )
            .with_cascade(CascadePolicy::TargetDeletesSource),
        );
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let page = tx.create_node("Page", PropertyMap::new());
        let image = tx.create_node("Image", PropertyMap::new());
        tx.create_relationship("SHOWS", page, image, PropertyMap::new())
            .unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin(&ctx);
        tx.delete_node(image).unwrap();
        tx.commit().unwrap();

        assert!(store.node(page).is_none());
        assert!(store.node(image).is_none());
    }

    #[test]
    fn test_cascade_requires_matching_kind() {
        let store = test_store();
        store.registry.register_type(TypeDefinition::node("Folder"));
        store.registry.register_entity_relation(
            "Folder",
            RelationClass::new(
                "Folder",
                RelKind::from("CONTAINS"),
                Direction::Outgoing,
                Cardinality::OneToMany,
            )
            .with_cascade(CascadePolicy::SourceDeletesTarget),
        );
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let f1 = tx.create_node("Folder", PropertyMap::new());
        let f2 = tx.create_node("Folder", PropertyMap::new());
        tx.create_relationship("LINKS_TO", f1, f2, PropertyMap::new())
            .unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin(&ctx);
        tx.delete_node(f1).unwrap();
        tx.commit().unwrap();

        // The relation class is for CONTAINS, so LINKS_TO must not cascade.
        assert!(store.node(f2).is_some());
    }

    #[test]
    fn test_created_then_deleted_leaves_no_trace() {
        let store = test_store();
        let counter = Arc::new(CreationCounter::default());
        store.pipeline.listeners().register(counter.clone());
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let id = tx.create_node("Folder", PropertyMap::new());
        tx.delete_node(id).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.node_count(), 0);
        assert_eq!(*counter.created.lock().unwrap(), 0);
    }

    #[test]
    fn test_rollback_discards_staging() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let id = tx.create_node("Page", props(&[("title", json!("Kept"))]));
        tx.commit().unwrap();

        let mut tx = store.begin(&ctx);
        tx.set_node_property(id, "title", json!("Discarded")).unwrap();
        tx.create_node("Page", PropertyMap::new());
        let key = tx.key();
        tx.rollback();

        assert_eq!(store.node_count(), 1);
        assert_eq!(
            store.node(id).unwrap().property("title"),
            Some(&json!("Kept"))
        );
        assert!(store.pipeline.change_set(key).is_none());
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let store = test_store();
        let ctx = AccessContext::system();

        let key = {
            let mut tx = store.begin(&ctx);
            tx.create_node("Page", PropertyMap::new());
            tx.key()
        };

        assert_eq!(store.node_count(), 0);
        assert!(store.pipeline.change_set(key).is_none());
    }

    #[test]
    fn test_unknown_ids_error() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        assert_eq!(
            tx.set_node_property(NodeId(42), "title", json!("x")),
            Err(StoreError::UnknownNode(NodeId(42)))
        );
        assert_eq!(
            tx.delete_relationship(RelationshipId(42)),
            Err(StoreError::UnknownRelationship(RelationshipId(42)))
        );

        let id = tx.create_node("Page", PropertyMap::new());
        tx.delete_node(id).unwrap();
        assert_eq!(
            tx.set_node_property(id, "title", json!("x")),
            Err(StoreError::UnknownNode(id))
        );
    }

    #[test]
    fn test_modified_then_deleted_node_reports_full_former_state() {
        let store = test_store();
        let ctx = AccessContext::system();

        let mut tx = store.begin(&ctx);
        let id = tx.create_node("Page", props(&[("title", json!("Old"))]));
        tx.commit().unwrap();

        let mut tx = store.begin(&ctx);
        tx.set_node_property(id, "title", json!("New")).unwrap();
        tx.delete_node(id).unwrap();
        tx.commit().unwrap();

        assert!(store.node(id).is_none());
        assert_eq!(store.node_count(), 0);
    }
}

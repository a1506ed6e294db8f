//! Nine-phase commit pipeline.
//!
//! The engine describes everything it is about to commit as a
//! [`TransactionData`] and calls [`CommitPipeline::before_commit`]. The
//! pipeline walks the description in a fixed phase order, maintains the
//! transaction's change set, runs lifecycle hooks, validators and
//! listeners, and decides at the very end whether the commit may proceed.
//! Individual failures never short-circuit; a failed commit reports every
//! problem found.
//!
//! # Architecture
//!
//! - **Phases 1-2**: removed node and relationship properties. Former
//!   values are accumulated so later deletion phases can reconstruct the
//!   last state of deleted entities
//! - **Phases 3-4**: created nodes, then created relationships, each
//!   sorted ascending by id; relationship endpoints are touched
//!   best-effort
//! - **Phases 5-6**: deleted relationships, then deleted nodes, in feed
//!   order, reported with their reconstructed former properties
//! - **Phases 7-8**: assigned node, then relationship properties;
//!   validators aggregate along the type chain; relationship assignments
//!   additionally hit the external indexer on every entry
//! - **Phase 9**: a final sweep notifies `graph_object_modified` for every
//!   entity still marked modified, reindexes modified relationships and
//!   indexes every created relationship

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::db::indexing::{NoopIndexer, RelationshipIndexer};
use crate::db::tx_data::{NodeHandle, RelationshipHandle, TransactionData};
use crate::models::context::AccessContext;
use crate::models::entity::{GraphEntity, NodeEntity, NodeId, RelationshipEntity, RelationshipId};
use crate::models::error::{ErrorBuffer, ErrorToken, STATUS_UNPROCESSABLE, TOKEN_INDEX_TIMEOUT};
use crate::models::property::{PropertyMap, TYPE_KEY};
use crate::models::types::GRAPH_OBJECT_TYPE;
use crate::registry::EntityRegistry;

use super::change_set::TransactionChangeSet;
use super::error::CommitFailure;
use super::listener::ListenerSet;
use super::TransactionKey;

/// Default cumulative wall-clock budget for external index calls within
/// one commit.
pub const DEFAULT_INDEX_CALL_BUDGET: Duration = Duration::from_secs(5);

/// Tunables of the commit pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Cumulative budget for indexer invocations in one `before_commit`.
    /// Exceeding it fails the transaction with an `index_timeout` token.
    pub index_call_budget: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index_call_budget: DEFAULT_INDEX_CALL_BUDGET,
        }
    }
}

/// The commit pipeline. One instance serves every transaction of an
/// engine; per-transaction state is keyed by [`TransactionKey`].
pub struct CommitPipeline {
    registry: Arc<EntityRegistry>,
    listeners: ListenerSet,
    indexer: Arc<dyn RelationshipIndexer>,
    config: PipelineConfig,
    ready: AtomicBool,
    change_sets: Mutex<HashMap<TransactionKey, Arc<Mutex<TransactionChangeSet>>>>,
    failures: Mutex<HashMap<TransactionKey, CommitFailure>>,
}

impl CommitPipeline {
    /// Pipeline with default configuration and a no-op indexer. Starts not
    /// ready; flip [`Self::set_ready`] once bootstrap registration is done.
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self::with_config(registry, PipelineConfig::default())
    }

    pub fn with_config(registry: Arc<EntityRegistry>, config: PipelineConfig) -> Self {
        Self {
            registry,
            listeners: ListenerSet::new(),
            indexer: Arc::new(NoopIndexer),
            config,
            ready: AtomicBool::new(false),
            change_sets: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the relationship indexer. Builder-style, intended for
    /// wiring before the pipeline is shared.
    pub fn with_indexer(mut self, indexer: Arc<dyn RelationshipIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Open pipeline state for a transaction and notify listeners. A
    /// pipeline that is not ready keeps listeners out of the loop entirely.
    pub fn begin(&self, ctx: &AccessContext, key: TransactionKey) {
        self.lock_change_sets()
            .insert(key, Arc::new(Mutex::new(TransactionChangeSet::new())));
        if !self.is_ready() {
            return;
        }
        for listener in self.listeners.snapshot() {
            listener.begin(ctx, key);
        }
    }

    /// Clone-on-read view of a live change set. Usable from listener
    /// callbacks mid-commit.
    pub fn change_set(&self, key: TransactionKey) -> Option<TransactionChangeSet> {
        let slot = self.lock_change_sets().get(&key).cloned();
        slot.map(|change_set| {
            change_set
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone()
        })
    }

    /// Run the full phase sequence against a pre-commit description.
    ///
    /// Returns `Err` when any validator, lifecycle hook or listener failed
    /// the transaction; the failure is also recorded for
    /// [`Self::after_rollback`]. When the pipeline is not ready the
    /// description passes through untouched.
    pub fn before_commit(
        &self,
        ctx: &AccessContext,
        key: TransactionKey,
        data: &TransactionData,
    ) -> Result<(), CommitFailure> {
        if !self.is_ready() {
            tracing::warn!("commit pipeline not ready, passing transaction {} through", key);
            return Ok(());
        }

        let change_set = self.change_set_slot(key);
        let listeners = self.listeners.snapshot();
        let mut errors = ErrorBuffer::new();
        let mut valid = true;
        let mut budget = IndexBudget::new(self.config.index_call_budget);

        // Former values per entity id, reconstructed from the removal log.
        // Deletions report every former property as removed, so these maps
        // hold the full last state of deleted entities.
        let mut former_node_properties: HashMap<NodeId, PropertyMap> = HashMap::new();
        let mut former_relationship_properties: HashMap<RelationshipId, PropertyMap> =
            HashMap::new();

        // Phase 1: removed node properties.
        for entry in data.removed_node_properties() {
            let owner_id = entry.owner.id;
            if let Some(previous) = &entry.previous {
                former_node_properties
                    .entry(owner_id)
                    .or_default()
                    .insert(entry.db_name.clone(), previous.clone());
            }
            if data.is_node_deleted(owner_id) {
                continue;
            }
            let entity = Arc::new(node_entity(&entry.owner));
            let property = self
                .registry
                .property_key_for_db_name(entity.type_name(), &entry.db_name);
            if !property.system {
                with_change_set(&change_set, |cs| cs.set_non_system_property());
            }
            with_change_set(&change_set, |cs| cs.modify(entity.clone()));
            for listener in &listeners {
                valid &= listener.property_removed(
                    ctx,
                    key,
                    &mut errors,
                    &entity,
                    &property,
                    entry.previous.as_ref(),
                );
            }
        }

        // Phase 2: removed relationship properties.
        for entry in data.removed_relationship_properties() {
            let owner_id = entry.owner.id;
            if let Some(previous) = &entry.previous {
                former_relationship_properties
                    .entry(owner_id)
                    .or_default()
                    .insert(entry.db_name.clone(), previous.clone());
            }
            if data.is_relationship_deleted(owner_id) {
                continue;
            }
            let entity = Arc::new(relationship_entity(&entry.owner));
            let property = self
                .registry
                .property_key_for_db_name(entity.type_name(), &entry.db_name);
            if !property.system {
                with_change_set(&change_set, |cs| cs.set_non_system_property());
            }
            with_change_set(&change_set, |cs| cs.modify(entity.clone()));
            for listener in &listeners {
                valid &= listener.property_removed(
                    ctx,
                    key,
                    &mut errors,
                    &entity,
                    &property,
                    entry.previous.as_ref(),
                );
            }
        }

        // Phase 3: created nodes, ascending by id.
        let mut created_nodes: Vec<&NodeHandle> = data.created_nodes().iter().collect();
        created_nodes.sort_by_key(|handle| handle.id);
        for handle in created_nodes {
            let entity = Arc::new(node_entity(handle));
            if let Some(hook) = self.registry.lifecycle(entity.type_name()) {
                valid &= hook.before_create(ctx, &entity, &mut errors);
            }
            with_change_set(&change_set, |cs| cs.create(entity.clone()));
            for listener in &listeners {
                valid &= listener.graph_object_created(ctx, key, &mut errors, &entity);
            }
        }

        // Phase 4: created relationships, ascending by id, with endpoint
        // touches.
        let mut created_relationships: Vec<&RelationshipHandle> =
            data.created_relationships().iter().collect();
        created_relationships.sort_by_key(|handle| handle.id);
        for handle in created_relationships {
            let entity = Arc::new(relationship_entity(handle));
            if let Some(hook) = self.registry.lifecycle(entity.type_name()) {
                valid &= hook.before_create(ctx, &entity, &mut errors);
            }
            with_change_set(&change_set, |cs| cs.create(entity.clone()));
            for listener in &listeners {
                valid &= listener.graph_object_created(ctx, key, &mut errors, &entity);
            }
            touch_endpoints(&change_set, data, handle);
        }

        // Phase 5: deleted relationships, feed order.
        for handle in data.deleted_relationships() {
            let former = former_relationship_properties
                .remove(&handle.id)
                .unwrap_or_default();
            let entity = Arc::new(relationship_entity_with(handle, former.clone()));
            if let Some(hook) = self.registry.lifecycle(entity.type_name()) {
                valid &= hook.before_delete(ctx, &entity, &former, &mut errors);
            }
            for listener in &listeners {
                valid &= listener.graph_object_deleted(ctx, key, &mut errors, &entity, &former);
            }
            with_change_set(&change_set, |cs| cs.delete(entity.clone()));
            touch_endpoints(&change_set, data, handle);
        }

        // Phase 6: deleted nodes, feed order. The former type comes from
        // the removed "type" property.
        for handle in data.deleted_nodes() {
            let former = former_node_properties.remove(&handle.id).unwrap_or_default();
            let former_type = former
                .get(TYPE_KEY)
                .and_then(|value| value.as_str())
                .unwrap_or(GRAPH_OBJECT_TYPE)
                .to_string();
            let entity = Arc::new(GraphEntity::from(NodeEntity::deleted_placeholder(
                handle.id,
                former_type,
            )));
            if let Some(hook) = self.registry.lifecycle(entity.type_name()) {
                valid &= hook.before_delete(ctx, &entity, &former, &mut errors);
            }
            for listener in &listeners {
                valid &= listener.graph_object_deleted(ctx, key, &mut errors, &entity, &former);
            }
            with_change_set(&change_set, |cs| cs.delete(entity.clone()));
        }

        // Phase 7: assigned node properties. The owning entity is rebuilt
        // only when the owner changes between consecutive entries.
        let mut current_node: Option<(NodeId, Arc<GraphEntity>)> = None;
        for entry in data.assigned_node_properties() {
            let owner_id = entry.owner.id;
            let entity = match &current_node {
                Some((id, entity)) if *id == owner_id => entity.clone(),
                _ => {
                    let entity = Arc::new(node_entity(&entry.owner));
                    current_node = Some((owner_id, entity.clone()));
                    entity
                }
            };
            let property = self
                .registry
                .property_key_for_db_name(entity.type_name(), &entry.db_name);
            if !property.system {
                with_change_set(&change_set, |cs| cs.set_non_system_property());
            }
            for validator in self.registry.validators(entity.type_name(), &entry.db_name) {
                valid &= validator.is_valid(ctx, &entity, &property, entry.value.as_ref(), &mut errors);
            }
            for listener in &listeners {
                valid &= listener.property_modified(
                    ctx,
                    key,
                    &mut errors,
                    &entity,
                    &property,
                    entry.previous.as_ref(),
                    entry.value.as_ref(),
                );
            }
            with_change_set(&change_set, |cs| {
                if !cs.is_new_or_deleted(&entity) {
                    cs.modify(entity.clone());
                }
            });
        }

        // Phase 8: assigned relationship properties. Every assignment hits
        // the indexer, and the modified bucket is fed unconditionally.
        let mut current_relationship: Option<(RelationshipId, Arc<GraphEntity>)> = None;
        for entry in data.assigned_relationship_properties() {
            let owner_id = entry.owner.id;
            let entity = match &current_relationship {
                Some((id, entity)) if *id == owner_id => entity.clone(),
                _ => {
                    let entity = Arc::new(relationship_entity(&entry.owner));
                    current_relationship = Some((owner_id, entity.clone()));
                    entity
                }
            };
            let property = self
                .registry
                .property_key_for_db_name(entity.type_name(), &entry.db_name);
            if !property.system {
                with_change_set(&change_set, |cs| cs.set_non_system_property());
            }
            for validator in self.registry.validators(entity.type_name(), &entry.db_name) {
                valid &= validator.is_valid(ctx, &entity, &property, entry.value.as_ref(), &mut errors);
            }
            for listener in &listeners {
                valid &= listener.property_modified(
                    ctx,
                    key,
                    &mut errors,
                    &entity,
                    &property,
                    entry.previous.as_ref(),
                    entry.value.as_ref(),
                );
            }
            if let Some(relationship) = entity.as_relationship() {
                budget.run(&mut errors, &mut valid, || {
                    self.indexer.index_relationship_property(relationship, &property)
                });
            }
            with_change_set(&change_set, |cs| cs.modify(entity.clone()));
        }

        // Phase 9: final modified sweep, nodes before relationships, then
        // index every created relationship.
        let (swept_nodes, swept_relationships, created_relationship_entities) = {
            let cs = change_set.lock().unwrap_or_else(|p| p.into_inner());
            (
                cs.modified_nodes().to_vec(),
                cs.modified_relationships().to_vec(),
                cs.created_relationships().to_vec(),
            )
        };
        for entity in swept_nodes {
            if with_change_set(&change_set, |cs| cs.is_new_or_deleted(&entity)) {
                continue;
            }
            if let Some(hook) = self.registry.lifecycle(entity.type_name()) {
                valid &= hook.before_modify(ctx, &entity, &mut errors);
            }
            for listener in &listeners {
                valid &= listener.graph_object_modified(ctx, key, &mut errors, &entity);
            }
        }
        for entity in swept_relationships {
            if with_change_set(&change_set, |cs| cs.is_new_or_deleted(&entity)) {
                continue;
            }
            if let Some(hook) = self.registry.lifecycle(entity.type_name()) {
                valid &= hook.before_modify(ctx, &entity, &mut errors);
            }
            for listener in &listeners {
                valid &= listener.graph_object_modified(ctx, key, &mut errors, &entity);
            }
            if let Some(relationship) = entity.as_relationship() {
                budget.run(&mut errors, &mut valid, || {
                    self.indexer.index_relationship(relationship)
                });
            }
        }
        for entity in created_relationship_entities {
            if let Some(relationship) = entity.as_relationship() {
                budget.run(&mut errors, &mut valid, || {
                    self.indexer.index_relationship(relationship)
                });
            }
        }

        if !valid || !errors.is_empty() {
            for listener in &listeners {
                listener.rollback(ctx, key);
            }
            let failure = CommitFailure::unprocessable(errors);
            self.lock_failures().insert(key, failure.clone());
            tracing::debug!(
                "transaction {} aborted by pipeline with {} error tokens",
                key,
                failure.errors.len()
            );
            return Err(failure);
        }

        for listener in &listeners {
            listener.commit(ctx, key);
        }
        Ok(())
    }

    /// Forget all pipeline state of a committed transaction.
    pub fn after_commit(&self, key: TransactionKey) {
        self.lock_change_sets().remove(&key);
        self.lock_failures().remove(&key);
    }

    /// Forget all pipeline state of a rolled-back transaction and return
    /// its recorded failure, falling back to a generic one.
    pub fn after_rollback(&self, key: TransactionKey) -> CommitFailure {
        self.lock_change_sets().remove(&key);
        self.lock_failures()
            .remove(&key)
            .unwrap_or_else(CommitFailure::rolled_back)
    }

    fn change_set_slot(&self, key: TransactionKey) -> Arc<Mutex<TransactionChangeSet>> {
        self.lock_change_sets()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(TransactionChangeSet::new())))
            .clone()
    }

    fn lock_change_sets(
        &self,
    ) -> MutexGuard<'_, HashMap<TransactionKey, Arc<Mutex<TransactionChangeSet>>>> {
        self.change_sets.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_failures(&self) -> MutexGuard<'_, HashMap<TransactionKey, CommitFailure>> {
        self.failures.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for CommitPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitPipeline")
            .field("ready", &self.is_ready())
            .field("listeners", &self.listeners.len())
            .field("live_transactions", &self.lock_change_sets().len())
            .finish_non_exhaustive()
    }
}

/// Cooperative guard over cumulative indexer time. The first overrun
/// appends an `index_timeout` token and skips every further call.
struct IndexBudget {
    budget: Duration,
    spent: Duration,
    tripped: bool,
}

impl IndexBudget {
    fn new(budget: Duration) -> Self {
        Self {
            budget,
            spent: Duration::ZERO,
            tripped: false,
        }
    }

    fn run(&mut self, errors: &mut ErrorBuffer, valid: &mut bool, call: impl FnOnce()) {
        if self.tripped {
            return;
        }
        let started = Instant::now();
        call();
        self.spent += started.elapsed();
        if self.spent > self.budget {
            self.tripped = true;
            *valid = false;
            errors.add(ErrorToken::new(
                STATUS_UNPROCESSABLE,
                GRAPH_OBJECT_TYPE,
                TOKEN_INDEX_TIMEOUT,
            ));
            tracing::warn!(
                "index calls exceeded their {:?} budget, failing the transaction",
                self.budget
            );
        }
    }
}

fn with_change_set<R>(
    change_set: &Arc<Mutex<TransactionChangeSet>>,
    f: impl FnOnce(&mut TransactionChangeSet) -> R,
) -> R {
    let mut guard = change_set.lock().unwrap_or_else(|p| p.into_inner());
    f(&mut guard)
}

/// Touch both endpoints of a relationship. Deleted endpoints and missing
/// snapshots are skipped.
fn touch_endpoints(
    change_set: &Arc<Mutex<TransactionChangeSet>>,
    data: &TransactionData,
    handle: &RelationshipHandle,
) {
    for endpoint_id in [handle.start, handle.end] {
        if data.is_node_deleted(endpoint_id) {
            continue;
        }
        let Some(snapshot) = data.node(endpoint_id) else {
            continue;
        };
        let endpoint = Arc::new(node_entity(snapshot));
        with_change_set(change_set, |cs| {
            cs.modify_relationship_endpoint(endpoint, handle.rel_kind.clone())
        });
    }
}

fn node_entity(handle: &NodeHandle) -> GraphEntity {
    GraphEntity::from(NodeEntity::from_parts(handle.id, handle.properties.clone()))
}

fn relationship_entity(handle: &RelationshipHandle) -> GraphEntity {
    relationship_entity_with(handle, handle.properties.clone())
}

fn relationship_entity_with(handle: &RelationshipHandle, properties: PropertyMap) -> GraphEntity {
    GraphEntity::from(RelationshipEntity::from_parts(
        handle.id,
        handle.rel_kind.clone(),
        handle.start,
        handle.end,
        properties,
    ))
}

//! Behavioral tests of the commit pipeline: phase order, gating rules,
//! abort paths and the index budget.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::db::indexing::RelationshipIndexer;
use crate::db::tx_data::{NodeHandle, RelationshipHandle, TransactionData};
use crate::models::context::AccessContext;
use crate::models::entity::{GraphEntity, NodeId, RelationshipEntity, RelationshipId};
use crate::models::error::{ErrorBuffer, STATUS_UNPROCESSABLE, TOKEN_INDEX_TIMEOUT, TOKEN_ROLLED_BACK};
use crate::models::property::{PropertyKey, PropertyMap, TYPE_KEY, UUID_KEY};
use crate::models::relation::RelKind;
use crate::models::types::TypeDefinition;
use crate::models::validators::NonEmptyValidator;
use crate::registry::EntityRegistry;

use super::change_set::TransactionChangeSet;
use super::interceptor::{CommitPipeline, PipelineConfig};
use super::listener::TransactionListener;
use super::TransactionKey;

fn entity_tag(entity: &GraphEntity) -> String {
    match entity {
        GraphEntity::Node(node) => format!("node:{}", node.id()),
        GraphEntity::Relationship(relationship) => format!("rel:{}", relationship.id()),
    }
}

fn node_handle(id: u64, type_name: &str) -> NodeHandle {
    let mut properties = PropertyMap::new();
    properties.insert(TYPE_KEY.to_string(), json!(type_name));
    NodeHandle::new(NodeId(id), properties)
}

fn rel_handle(id: u64, kind: &str, start: u64, end: u64) -> RelationshipHandle {
    RelationshipHandle::new(
        RelationshipId(id),
        RelKind::from(kind),
        NodeId(start),
        NodeId(end),
        PropertyMap::new(),
    )
}

fn ready_pipeline(registry: Arc<EntityRegistry>) -> CommitPipeline {
    let pipeline = CommitPipeline::new(registry);
    pipeline.set_ready(true);
    pipeline
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl TransactionListener for RecordingListener {
    fn begin(&self, _ctx: &AccessContext, key: TransactionKey) {
        self.push(format!("begin {key}"));
    }

    fn property_removed(
        &self,
        _ctx: &AccessContext,
        _key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
        property: &PropertyKey,
        _previous: Option<&serde_json::Value>,
    ) -> bool {
        self.push(format!("removed {} {}", entity_tag(entity), property.db_name));
        true
    }

    fn property_modified(
        &self,
        _ctx: &AccessContext,
        _key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
        property: &PropertyKey,
        _previous: Option<&serde_json::Value>,
        _value: Option<&serde_json::Value>,
    ) -> bool {
        self.push(format!("assigned {} {}", entity_tag(entity), property.db_name));
        true
    }

    fn graph_object_created(
        &self,
        _ctx: &AccessContext,
        _key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
    ) -> bool {
        self.push(format!("created {}", entity_tag(entity)));
        true
    }

    fn graph_object_modified(
        &self,
        _ctx: &AccessContext,
        _key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
    ) -> bool {
        self.push(format!("modified {}", entity_tag(entity)));
        true
    }

    fn graph_object_deleted(
        &self,
        _ctx: &AccessContext,
        _key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
        _former_properties: &PropertyMap,
    ) -> bool {
        self.push(format!("deleted {}", entity_tag(entity)));
        true
    }

    fn commit(&self, _ctx: &AccessContext, key: TransactionKey) {
        self.push(format!("commit {key}"));
    }

    fn rollback(&self, _ctx: &AccessContext, key: TransactionKey) {
        self.push(format!("rollback {key}"));
    }
}

#[test]
fn test_not_ready_pipeline_passes_through_untouched() {
    let pipeline = CommitPipeline::new(Arc::new(EntityRegistry::new()));
    let listener = Arc::new(RecordingListener::default());
    pipeline.listeners().register(listener.clone());

    let mut data = TransactionData::new();
    data.add_created_node(node_handle(1, "Page"));
    let ctx = AccessContext::system();

    assert!(pipeline.before_commit(&ctx, TransactionKey(1), &data).is_ok());
    assert!(listener.events().is_empty());
    assert!(pipeline.change_set(TransactionKey(1)).is_none());
}

#[test]
fn test_full_phase_order_is_stable() {
    let registry = Arc::new(EntityRegistry::new());
    registry.register_type(TypeDefinition::node("Page"));
    let pipeline = ready_pipeline(registry);
    let listener = Arc::new(RecordingListener::default());
    pipeline.listeners().register(listener.clone());

    let mut data = TransactionData::new();
    data.record_node(node_handle(10, "Page"));
    data.remove_node_property(node_handle(10, "Page"), "subtitle", Some(json!("x")));
    // Created out of numeric order on purpose.
    data.add_created_node(node_handle(5, "Page"));
    data.add_created_node(node_handle(2, "Page"));
    data.add_created_relationship(rel_handle(7, "LINKS_TO", 2, 5));
    data.add_deleted_relationship(rel_handle(8, "LINKS_TO", 2, 5));
    data.remove_relationship_property(rel_handle(8, "LINKS_TO", 2, 5), "label", Some(json!("old")));
    data.add_deleted_node(NodeId(9));
    data.remove_node_property(
        NodeHandle::new(NodeId(9), PropertyMap::new()),
        TYPE_KEY,
        Some(json!("Page")),
    );
    data.assign_node_property(node_handle(10, "Page"), "title", json!("Welcome"), Some(json!("Old")));
    data.assign_relationship_property(rel_handle(7, "LINKS_TO", 2, 5), "weight", json!(2), None);

    let ctx = AccessContext::system();
    let key = TransactionKey(1);
    pipeline.begin(&ctx, key);
    pipeline.before_commit(&ctx, key, &data).unwrap();

    assert_eq!(
        listener.events(),
        [
            "begin 1",
            // Removal on the deleted relationship 8 is silent.
            "removed node:10 subtitle",
            "created node:2",
            "created node:5",
            "created rel:7",
            "deleted rel:8",
            "deleted node:9",
            "assigned node:10 title",
            "assigned rel:7 weight",
            // Sweep: created relationship 7 is skipped, node 10 is not.
            "modified node:10",
            "commit 1",
        ]
    );

    let change_set = pipeline.change_set(key).unwrap();
    assert_eq!(change_set.created_nodes().len(), 2);
    assert_eq!(change_set.created_relationships().len(), 1);
    assert_eq!(change_set.deleted_nodes().len(), 1);
    assert_eq!(change_set.deleted_relationships().len(), 1);
    assert_eq!(change_set.modified_nodes().len(), 1);
    assert_eq!(change_set.touched_endpoints().len(), 2);
    assert!(change_set.has_non_system_property());
}

#[test]
fn test_validator_failure_aborts_and_failure_is_reraised() {
    let registry = Arc::new(EntityRegistry::new());
    registry.register_type(TypeDefinition::node("Page"));
    let title = registry.register_property_key("Page", PropertyKey::new("Page", "title"));
    registry.register_validator("Page", &title, Arc::new(NonEmptyValidator));
    let pipeline = ready_pipeline(registry);
    let listener = Arc::new(RecordingListener::default());
    pipeline.listeners().register(listener.clone());

    let mut data = TransactionData::new();
    data.record_node(node_handle(1, "Page"));
    data.assign_node_property(node_handle(1, "Page"), "title", json!(""), Some(json!("Old")));

    let ctx = AccessContext::system();
    let key = TransactionKey(9);
    pipeline.begin(&ctx, key);
    let failure = pipeline.before_commit(&ctx, key, &data).unwrap_err();

    assert_eq!(failure.status, STATUS_UNPROCESSABLE);
    assert_eq!(failure.errors.len(), 1);
    assert!(listener.events().contains(&"rollback 9".to_string()));
    assert!(!listener.events().contains(&"commit 9".to_string()));

    // The engine re-raises the recorded failure on rollback.
    assert_eq!(pipeline.after_rollback(key), failure);
    // A second rollback has nothing recorded and falls back.
    let fallback = pipeline.after_rollback(key);
    assert_eq!(fallback.errors.tokens()[0].token, TOKEN_ROLLED_BACK);
    assert!(pipeline.change_set(key).is_none());
}

struct VetoCreations;

impl TransactionListener for VetoCreations {
    fn graph_object_created(
        &self,
        _ctx: &AccessContext,
        _key: TransactionKey,
        _errors: &mut ErrorBuffer,
        _entity: &GraphEntity,
    ) -> bool {
        false
    }
}

#[test]
fn test_listener_veto_aborts_without_tokens() {
    let pipeline = ready_pipeline(Arc::new(EntityRegistry::new()));
    pipeline.listeners().register(Arc::new(VetoCreations));

    let mut data = TransactionData::new();
    data.add_created_node(node_handle(1, "Page"));

    let ctx = AccessContext::system();
    let failure = pipeline
        .before_commit(&ctx, TransactionKey(2), &data)
        .unwrap_err();

    assert_eq!(failure.status, STATUS_UNPROCESSABLE);
    assert!(failure.errors.is_empty());
}

#[test]
fn test_removed_system_property_does_not_flip_flag() {
    let pipeline = ready_pipeline(Arc::new(EntityRegistry::new()));

    let mut data = TransactionData::new();
    data.record_node(node_handle(1, "Page"));
    data.remove_node_property(node_handle(1, "Page"), UUID_KEY, Some(json!("abc")));

    let ctx = AccessContext::system();
    let key = TransactionKey(3);
    pipeline.begin(&ctx, key);
    pipeline.before_commit(&ctx, key, &data).unwrap();

    let change_set = pipeline.change_set(key).unwrap();
    assert_eq!(change_set.modified_nodes().len(), 1);
    assert!(!change_set.has_non_system_property());
}

struct DeletionRecorder {
    seen: Mutex<Vec<(String, PropertyMap)>>,
}

impl TransactionListener for DeletionRecorder {
    fn graph_object_deleted(
        &self,
        _ctx: &AccessContext,
        _key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
        former_properties: &PropertyMap,
    ) -> bool {
        self.seen
            .lock()
            .unwrap()
            .push((entity.type_name().to_string(), former_properties.clone()));
        true
    }
}

#[test]
fn test_deleted_node_type_reconstructed_from_removed_type_property() {
    let pipeline = ready_pipeline(Arc::new(EntityRegistry::new()));
    let recorder = Arc::new(DeletionRecorder {
        seen: Mutex::new(Vec::new()),
    });
    pipeline.listeners().register(recorder.clone());

    let mut data = TransactionData::new();
    data.add_deleted_node(NodeId(4));
    let former_owner = NodeHandle::new(NodeId(4), PropertyMap::new());
    data.remove_node_property(former_owner.clone(), TYPE_KEY, Some(json!("Page")));
    data.remove_node_property(former_owner, "title", Some(json!("Welcome")));

    let ctx = AccessContext::system();
    pipeline.before_commit(&ctx, TransactionKey(4), &data).unwrap();

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (type_name, former) = &seen[0];
    assert_eq!(type_name, "Page");
    assert_eq!(former.get("title"), Some(&json!("Welcome")));
    assert_eq!(former.get(TYPE_KEY), Some(&json!("Page")));
}

#[test]
fn test_endpoint_touch_misses_are_swallowed() {
    let pipeline = ready_pipeline(Arc::new(EntityRegistry::new()));

    let mut data = TransactionData::new();
    data.record_node(node_handle(1, "Page"));
    // Endpoint 2 has no snapshot; the touch for it is skipped silently.
    data.add_created_relationship(rel_handle(6, "LINKS_TO", 1, 2));

    let ctx = AccessContext::system();
    let key = TransactionKey(5);
    pipeline.begin(&ctx, key);
    pipeline.before_commit(&ctx, key, &data).unwrap();

    let change_set = pipeline.change_set(key).unwrap();
    assert_eq!(change_set.touched_endpoints().len(), 1);
    let (endpoint, kind) = &change_set.touched_endpoints()[0];
    assert_eq!(entity_tag(endpoint), "node:1");
    assert_eq!(kind.as_str(), "LINKS_TO");
}

#[test]
fn test_created_node_assignments_do_not_mark_modified() {
    let pipeline = ready_pipeline(Arc::new(EntityRegistry::new()));
    let listener = Arc::new(RecordingListener::default());
    pipeline.listeners().register(listener.clone());

    let mut data = TransactionData::new();
    data.add_created_node(node_handle(1, "Page"));
    data.assign_node_property(node_handle(1, "Page"), "title", json!("Welcome"), None);
    // A created relationship's assignment feeds the modified bucket, but
    // the sweep still skips it as new.
    data.add_created_relationship(rel_handle(2, "LINKS_TO", 1, 1));
    data.assign_relationship_property(rel_handle(2, "LINKS_TO", 1, 1), "weight", json!(1), None);

    let ctx = AccessContext::system();
    let key = TransactionKey(6);
    pipeline.begin(&ctx, key);
    pipeline.before_commit(&ctx, key, &data).unwrap();

    let change_set = pipeline.change_set(key).unwrap();
    assert!(change_set.modified_nodes().is_empty());
    assert_eq!(change_set.modified_relationships().len(), 1);
    assert!(!listener
        .events()
        .iter()
        .any(|event| event.starts_with("modified")));
}

struct SlowIndexer {
    delay: Duration,
}

impl RelationshipIndexer for SlowIndexer {
    fn index_relationship(&self, _relationship: &RelationshipEntity) {
        std::thread::sleep(self.delay);
    }

    fn index_relationship_property(
        &self,
        _relationship: &RelationshipEntity,
        _key: &PropertyKey,
    ) {
        std::thread::sleep(self.delay);
    }
}

#[test]
fn test_index_budget_overrun_fails_the_transaction() {
    let registry = Arc::new(EntityRegistry::new());
    let config = PipelineConfig {
        index_call_budget: Duration::from_millis(1),
    };
    let pipeline = CommitPipeline::with_config(registry, config).with_indexer(Arc::new(SlowIndexer {
        delay: Duration::from_millis(25),
    }));
    pipeline.set_ready(true);

    let mut data = TransactionData::new();
    data.record_node(node_handle(1, "Page"));
    data.add_created_relationship(rel_handle(2, "LINKS_TO", 1, 1));
    data.assign_relationship_property(rel_handle(2, "LINKS_TO", 1, 1), "weight", json!(1), None);

    let ctx = AccessContext::system();
    let failure = pipeline
        .before_commit(&ctx, TransactionKey(7), &data)
        .unwrap_err();

    assert_eq!(failure.status, STATUS_UNPROCESSABLE);
    assert_eq!(failure.errors.len(), 1);
    assert_eq!(failure.errors.tokens()[0].token, TOKEN_INDEX_TIMEOUT);
}

#[derive(Default)]
struct SnapshotOnCommit {
    pipeline: Mutex<Option<Arc<CommitPipeline>>>,
    captured: Mutex<Option<TransactionChangeSet>>,
}

impl TransactionListener for SnapshotOnCommit {
    fn commit(&self, _ctx: &AccessContext, key: TransactionKey) {
        if let Some(pipeline) = self.pipeline.lock().unwrap().as_ref() {
            *self.captured.lock().unwrap() = pipeline.change_set(key);
        }
    }
}

#[test]
fn test_change_set_is_queryable_from_commit_callback() {
    let pipeline = Arc::new(ready_pipeline(Arc::new(EntityRegistry::new())));
    let listener = Arc::new(SnapshotOnCommit::default());
    *listener.pipeline.lock().unwrap() = Some(pipeline.clone());
    pipeline.listeners().register(listener.clone());

    let mut data = TransactionData::new();
    data.add_created_node(node_handle(1, "Folder"));

    let ctx = AccessContext::system();
    let key = TransactionKey(8);
    pipeline.begin(&ctx, key);
    pipeline.before_commit(&ctx, key, &data).unwrap();
    pipeline.after_commit(key);

    let captured = listener.captured.lock().unwrap();
    let change_set = captured.as_ref().expect("captured during commit");
    assert_eq!(change_set.created_nodes().len(), 1);
    // After the commit the pipeline state is gone.
    assert!(pipeline.change_set(key).is_none());
}

#[test]
fn test_begin_opens_an_empty_change_set() {
    let pipeline = ready_pipeline(Arc::new(EntityRegistry::new()));
    let ctx = AccessContext::system();
    let key = TransactionKey(11);

    pipeline.begin(&ctx, key);
    let change_set = pipeline.change_set(key).unwrap();
    assert!(change_set.is_empty());

    pipeline.after_commit(key);
    assert!(pipeline.change_set(key).is_none());
}

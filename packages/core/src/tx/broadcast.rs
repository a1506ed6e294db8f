//! Change stream: committed transactions as broadcast events.
//!
//! [`ChangeStreamListener`] buffers one event per change-set entry while a
//! transaction runs and only flushes the buffer into a broadcast channel
//! once the transaction commits. Rolled-back transactions leave no trace
//! on the stream. Subscribers that lag beyond the channel capacity lose
//! the oldest events; sends without any receiver are ignored.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::context::AccessContext;
use crate::models::entity::{GraphEntity, NodeId, RelationshipId};
use crate::models::error::ErrorBuffer;
use crate::models::property::PropertyMap;
use crate::models::relation::RelKind;
use crate::models::types::TypeName;

use super::listener::TransactionListener;
use super::TransactionKey;

/// Capacity of the change event broadcast channel. Slow subscribers start
/// losing the oldest events beyond this backlog.
pub const CHANGE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// One committed change, shaped for external consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ChangeEvent {
    #[serde(rename_all = "camelCase")]
    NodeCreated {
        id: NodeId,
        node_type: TypeName,
        properties: PropertyMap,
    },
    #[serde(rename_all = "camelCase")]
    NodeModified {
        id: NodeId,
        node_type: TypeName,
        properties: PropertyMap,
    },
    #[serde(rename_all = "camelCase")]
    NodeDeleted {
        id: NodeId,
        node_type: TypeName,
        former_properties: PropertyMap,
    },
    #[serde(rename_all = "camelCase")]
    RelationshipCreated {
        id: RelationshipId,
        rel_kind: RelKind,
        start: NodeId,
        end: NodeId,
    },
    #[serde(rename_all = "camelCase")]
    RelationshipModified {
        id: RelationshipId,
        rel_kind: RelKind,
        properties: PropertyMap,
    },
    #[serde(rename_all = "camelCase")]
    RelationshipDeleted {
        id: RelationshipId,
        rel_kind: RelKind,
        start: NodeId,
        end: NodeId,
    },
}

impl ChangeEvent {
    /// Stable discriminant, matching the serialized `event` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::NodeCreated { .. } => "nodeCreated",
            ChangeEvent::NodeModified { .. } => "nodeModified",
            ChangeEvent::NodeDeleted { .. } => "nodeDeleted",
            ChangeEvent::RelationshipCreated { .. } => "relationshipCreated",
            ChangeEvent::RelationshipModified { .. } => "relationshipModified",
            ChangeEvent::RelationshipDeleted { .. } => "relationshipDeleted",
        }
    }
}

/// Transaction listener that turns committed change sets into
/// [`ChangeEvent`]s on a broadcast channel.
pub struct ChangeStreamListener {
    sender: broadcast::Sender<ChangeEvent>,
    pending: Mutex<HashMap<TransactionKey, Vec<ChangeEvent>>>,
}

impl ChangeStreamListener {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    fn buffer(&self, key: TransactionKey, event: ChangeEvent) {
        self.lock_pending().entry(key).or_default().push(event);
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<TransactionKey, Vec<ChangeEvent>>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn created_event(entity: &GraphEntity) -> ChangeEvent {
        match entity {
            GraphEntity::Node(node) => ChangeEvent::NodeCreated {
                id: node.id(),
                node_type: node.type_name().to_string(),
                properties: node.properties().clone(),
            },
            GraphEntity::Relationship(relationship) => ChangeEvent::RelationshipCreated {
                id: relationship.id(),
                rel_kind: relationship.kind().clone(),
                start: relationship.start(),
                end: relationship.end(),
            },
        }
    }

    fn modified_event(entity: &GraphEntity) -> ChangeEvent {
        match entity {
            GraphEntity::Node(node) => ChangeEvent::NodeModified {
                id: node.id(),
                node_type: node.type_name().to_string(),
                properties: node.properties().clone(),
            },
            GraphEntity::Relationship(relationship) => ChangeEvent::RelationshipModified {
                id: relationship.id(),
                rel_kind: relationship.kind().clone(),
                properties: relationship.properties().clone(),
            },
        }
    }

    fn deleted_event(entity: &GraphEntity, former_properties: &PropertyMap) -> ChangeEvent {
        match entity {
            GraphEntity::Node(node) => ChangeEvent::NodeDeleted {
                id: node.id(),
                node_type: node.type_name().to_string(),
                former_properties: former_properties.clone(),
            },
            GraphEntity::Relationship(relationship) => ChangeEvent::RelationshipDeleted {
                id: relationship.id(),
                rel_kind: relationship.kind().clone(),
                start: relationship.start(),
                end: relationship.end(),
            },
        }
    }
}

impl Default for ChangeStreamListener {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeStreamListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeStreamListener")
            .field("pending_transactions", &self.lock_pending().len())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl TransactionListener for ChangeStreamListener {
    fn graph_object_created(
        &self,
        _ctx: &AccessContext,
        key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
    ) -> bool {
        self.buffer(key, Self::created_event(entity));
        true
    }

    fn graph_object_modified(
        &self,
        _ctx: &AccessContext,
        key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
    ) -> bool {
        self.buffer(key, Self::modified_event(entity));
        true
    }

    fn graph_object_deleted(
        &self,
        _ctx: &AccessContext,
        key: TransactionKey,
        _errors: &mut ErrorBuffer,
        entity: &GraphEntity,
        former_properties: &PropertyMap,
    ) -> bool {
        self.buffer(key, Self::deleted_event(entity, former_properties));
        true
    }

    fn commit(&self, _ctx: &AccessContext, key: TransactionKey) {
        if let Some(events) = self.lock_pending().remove(&key) {
            tracing::debug!("flushing {} change events for transaction {}", events.len(), key);
            for event in events {
                // No receivers is fine; the stream is best-effort.
                let _ = self.sender.send(event);
            }
        }
    }

    fn rollback(&self, _ctx: &AccessContext, key: TransactionKey) {
        self.lock_pending().remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::NodeEntity;
    use serde_json::json;

    fn page_entity(id: u64) -> GraphEntity {
        let mut properties = PropertyMap::new();
        properties.insert("type".to_string(), json!("Page"));
        properties.insert("title".to_string(), json!("Welcome"));
        GraphEntity::from(NodeEntity::from_parts(NodeId(id), properties))
    }

    #[test]
    fn test_commit_flushes_buffered_events_in_order() {
        let stream = ChangeStreamListener::new();
        let mut rx = stream.subscribe();
        let ctx = AccessContext::system();
        let key = TransactionKey(1);
        let mut errors = ErrorBuffer::new();
        let entity = page_entity(1);

        stream.graph_object_created(&ctx, key, &mut errors, &entity);
        stream.graph_object_modified(&ctx, key, &mut errors, &entity);
        // Nothing reaches the channel before the commit.
        assert!(rx.try_recv().is_err());

        stream.commit(&ctx, key);
        assert_eq!(rx.try_recv().unwrap().event_type(), "nodeCreated");
        assert_eq!(rx.try_recv().unwrap().event_type(), "nodeModified");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rollback_discards_buffered_events() {
        let stream = ChangeStreamListener::new();
        let mut rx = stream.subscribe();
        let ctx = AccessContext::system();
        let key = TransactionKey(2);
        let mut errors = ErrorBuffer::new();

        stream.graph_object_created(&ctx, key, &mut errors, &page_entity(1));
        stream.rollback(&ctx, key);
        stream.commit(&ctx, key);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_transactions_buffer_independently() {
        let stream = ChangeStreamListener::new();
        let mut rx = stream.subscribe();
        let ctx = AccessContext::system();
        let mut errors = ErrorBuffer::new();

        stream.graph_object_created(&ctx, TransactionKey(1), &mut errors, &page_entity(1));
        stream.graph_object_created(&ctx, TransactionKey(2), &mut errors, &page_entity(2));
        stream.rollback(&ctx, TransactionKey(1));
        stream.commit(&ctx, TransactionKey(2));

        let event = rx.try_recv().unwrap();
        match event {
            ChangeEvent::NodeCreated { id, .. } => assert_eq!(id, NodeId(2)),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_commit_without_receivers_is_ignored() {
        let stream = ChangeStreamListener::new();
        let ctx = AccessContext::system();
        let mut errors = ErrorBuffer::new();

        stream.graph_object_created(&ctx, TransactionKey(3), &mut errors, &page_entity(1));
        // No subscriber exists; the flush must not fail.
        stream.commit(&ctx, TransactionKey(3));
    }

    #[test]
    fn test_events_serialize_with_tag_and_camel_case() {
        let entity = page_entity(7);
        let event = ChangeStreamListener::created_event(&entity);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "nodeCreated");
        assert_eq!(json["id"], 7);
        assert_eq!(json["nodeType"], "Page");
        assert_eq!(json["properties"]["title"], "Welcome");

        let mut former = PropertyMap::new();
        former.insert("title".to_string(), json!("Old"));
        let deleted = ChangeStreamListener::deleted_event(&entity, &former);
        let json = serde_json::to_value(&deleted).unwrap();
        assert_eq!(json["event"], "nodeDeleted");
        assert_eq!(json["formerProperties"]["title"], "Old");
    }
}

//! Entity Snapshots
//!
//! The commit pipeline never hands raw storage handles to validators, hooks
//! or listeners. It instantiates [`NodeEntity`] / [`RelationshipEntity`]
//! snapshots: immutable views of an entity's id, resolved type name and
//! property map at the moment of processing. [`GraphEntity`] is the unified
//! shape callbacks receive.
//!
//! Type resolution is data-driven: a node's type is its `type` property
//! (falling back to the root type), a relationship's type is its `type`
//! property when present, otherwise the UpperCamelCase form of its
//! relationship kind (`PAGE_LINK` becomes `PageLink`).

use heck::ToUpperCamelCase;
use serde::Serialize;

use crate::models::property::{PropertyMap, TYPE_KEY, UUID_KEY};
use crate::models::relation::RelKind;
use crate::models::types::{TypeName, GRAPH_OBJECT_TYPE};

/// Numeric storage identifier of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric storage identifier of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RelationshipId(pub u64);

impl std::fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of either kind of entity, used for change-set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityId {
    Node(NodeId),
    Relationship(RelationshipId),
}

/// Immutable snapshot of a node at processing time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntity {
    id: NodeId,
    type_name: TypeName,
    properties: PropertyMap,
}

impl NodeEntity {
    /// Build a snapshot from a node's id and current properties. The type is
    /// read from the `type` property; nodes without one are treated as plain
    /// root-type entities.
    pub fn from_parts(id: NodeId, properties: PropertyMap) -> Self {
        let type_name = properties
            .get(TYPE_KEY)
            .and_then(serde_json::Value::as_str)
            .unwrap_or(GRAPH_OBJECT_TYPE)
            .to_string();
        Self {
            id,
            type_name,
            properties,
        }
    }

    /// Placeholder for a node deleted this transaction. Its live data is
    /// gone; only the id and the reconstructed former type remain.
    pub fn deleted_placeholder(id: NodeId, type_name: impl Into<TypeName>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            properties: PropertyMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, db_name: &str) -> Option<&serde_json::Value> {
        self.properties.get(db_name)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.property(UUID_KEY).and_then(serde_json::Value::as_str)
    }
}

/// Immutable snapshot of a relationship at processing time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEntity {
    id: RelationshipId,
    kind: RelKind,
    start: NodeId,
    end: NodeId,
    type_name: TypeName,
    properties: PropertyMap,
}

impl RelationshipEntity {
    pub fn from_parts(
        id: RelationshipId,
        kind: RelKind,
        start: NodeId,
        end: NodeId,
        properties: PropertyMap,
    ) -> Self {
        let type_name = properties
            .get(TYPE_KEY)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| kind.as_str().to_upper_camel_case());
        Self {
            id,
            kind,
            start,
            end,
            type_name,
            properties,
        }
    }

    pub fn id(&self) -> RelationshipId {
        self.id
    }

    pub fn kind(&self) -> &RelKind {
        &self.kind
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn end(&self) -> NodeId {
        self.end
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, db_name: &str) -> Option<&serde_json::Value> {
        self.properties.get(db_name)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.property(UUID_KEY).and_then(serde_json::Value::as_str)
    }
}

/// Either kind of entity snapshot, as passed to hooks and listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "camelCase")]
pub enum GraphEntity {
    Node(NodeEntity),
    Relationship(RelationshipEntity),
}

impl GraphEntity {
    pub fn entity_id(&self) -> EntityId {
        match self {
            GraphEntity::Node(node) => EntityId::Node(node.id()),
            GraphEntity::Relationship(rel) => EntityId::Relationship(rel.id()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            GraphEntity::Node(node) => node.type_name(),
            GraphEntity::Relationship(rel) => rel.type_name(),
        }
    }

    pub fn properties(&self) -> &PropertyMap {
        match self {
            GraphEntity::Node(node) => node.properties(),
            GraphEntity::Relationship(rel) => rel.properties(),
        }
    }

    pub fn property(&self, db_name: &str) -> Option<&serde_json::Value> {
        self.properties().get(db_name)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.property(UUID_KEY).and_then(serde_json::Value::as_str)
    }

    pub fn is_node(&self) -> bool {
        matches!(self, GraphEntity::Node(_))
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, GraphEntity::Relationship(_))
    }

    pub fn as_node(&self) -> Option<&NodeEntity> {
        match self {
            GraphEntity::Node(node) => Some(node),
            GraphEntity::Relationship(_) => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipEntity> {
        match self {
            GraphEntity::Node(_) => None,
            GraphEntity::Relationship(rel) => Some(rel),
        }
    }
}

impl From<NodeEntity> for GraphEntity {
    fn from(node: NodeEntity) -> Self {
        GraphEntity::Node(node)
    }
}

impl From<RelationshipEntity> for GraphEntity {
    fn from(rel: RelationshipEntity) -> Self {
        GraphEntity::Relationship(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, serde_json::Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_node_type_resolved_from_property() {
        let node = NodeEntity::from_parts(
            NodeId(1),
            props(&[(TYPE_KEY, json!("Page")), ("title", json!("Home"))]),
        );

        assert_eq!(node.type_name(), "Page");
        assert_eq!(node.property("title"), Some(&json!("Home")));
    }

    #[test]
    fn test_node_without_type_falls_back_to_root() {
        let node = NodeEntity::from_parts(NodeId(1), PropertyMap::new());

        assert_eq!(node.type_name(), GRAPH_OBJECT_TYPE);
    }

    #[test]
    fn test_deleted_placeholder_has_no_properties() {
        let node = NodeEntity::deleted_placeholder(NodeId(7), "Folder");

        assert_eq!(node.id(), NodeId(7));
        assert_eq!(node.type_name(), "Folder");
        assert!(node.properties().is_empty());
    }

    #[test]
    fn test_relationship_type_from_kind() {
        let rel = RelationshipEntity::from_parts(
            RelationshipId(3),
            RelKind::new("PAGE_LINK"),
            NodeId(1),
            NodeId(2),
            PropertyMap::new(),
        );

        assert_eq!(rel.type_name(), "PageLink");
    }

    #[test]
    fn test_relationship_type_property_wins_over_kind() {
        let rel = RelationshipEntity::from_parts(
            RelationshipId(3),
            RelKind::new("PAGE_LINK"),
            NodeId(1),
            NodeId(2),
            props(&[(TYPE_KEY, json!("NavigationLink"))]),
        );

        assert_eq!(rel.type_name(), "NavigationLink");
    }

    #[test]
    fn test_graph_entity_ids() {
        let node: GraphEntity =
            NodeEntity::from_parts(NodeId(1), props(&[(TYPE_KEY, json!("Page"))])).into();
        let rel: GraphEntity = RelationshipEntity::from_parts(
            RelationshipId(2),
            RelKind::new("CONTAINS"),
            NodeId(1),
            NodeId(3),
            PropertyMap::new(),
        )
        .into();

        assert_eq!(node.entity_id(), EntityId::Node(NodeId(1)));
        assert_eq!(rel.entity_id(), EntityId::Relationship(RelationshipId(2)));
        assert!(node.is_node());
        assert!(rel.is_relationship());
        assert!(node.as_relationship().is_none());
    }

    #[test]
    fn test_uuid_accessor() {
        let node = NodeEntity::from_parts(
            NodeId(1),
            props(&[(UUID_KEY, json!("abc-123")), (TYPE_KEY, json!("Page"))]),
        );

        assert_eq!(node.uuid(), Some("abc-123"));
    }
}

//! Relation Metadata
//!
//! A [`RelationClass`] describes how instances of one type relate to a
//! destination type: the storage-level relationship kind, direction,
//! cardinality, the cascade policy applied on delete, and the [`Notion`]
//! that turns a raw destination node into the value exposed for the
//! relation. [`NamedRelation`] additionally names a relationship entity type
//! for a `(source, kind, dest)` combination.
//!
//! # Examples
//!
//! ```rust
//! use graft_core::models::{Cardinality, CascadePolicy, Direction, RelationClass, RelKind};
//!
//! let contains = RelationClass::new(
//!     "Page",
//!     RelKind::new("CONTAINS"),
//!     Direction::Outgoing,
//!     Cardinality::OneToMany,
//! )
//! .with_cascade(CascadePolicy::SourceDeletesTarget);
//!
//! assert_eq!(contains.dest_type, "Page");
//! assert_eq!(contains.cascade, CascadePolicy::SourceDeletesTarget);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::entity::NodeEntity;
use crate::models::types::TypeName;

/// Storage-level relationship kind, conventionally SCREAMING_SNAKE
/// (`PAGE_LINK`, `CONTAINS`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelKind(String);

impl RelKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RelKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// Direction of a relation as seen from the source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Multiplicity of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// What deleting one endpoint does to the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CascadePolicy {
    /// Deleting either endpoint leaves the other alone.
    #[default]
    None,
    /// Deleting the source also deletes the target.
    SourceDeletesTarget,
    /// Deleting the target also deletes the source.
    TargetDeletesSource,
}

/// Value transform from a raw destination node to the domain value a
/// relation exposes.
pub trait Notion: Send + Sync {
    fn project(&self, endpoint: &NodeEntity) -> serde_json::Value;
}

/// Default notion: the destination entity itself, as a JSON object of its
/// properties plus its numeric id.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectNotion;

impl Notion for ObjectNotion {
    fn project(&self, endpoint: &NodeEntity) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (name, value) in endpoint.properties() {
            object.insert(name.clone(), value.clone());
        }
        object.insert("id".to_string(), json!(endpoint.id().0));
        serde_json::Value::Object(object)
    }
}

/// Notion exposing a single property of the destination node.
#[derive(Debug, Clone)]
pub struct PropertyNotion {
    db_name: String,
}

impl PropertyNotion {
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
        }
    }
}

impl Notion for PropertyNotion {
    fn project(&self, endpoint: &NodeEntity) -> serde_json::Value {
        endpoint
            .property(&self.db_name)
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}

/// How a source type relates to one destination type.
#[derive(Clone)]
pub struct RelationClass {
    /// Destination entity type.
    pub dest_type: TypeName,

    /// Storage-level relationship kind.
    pub rel_kind: RelKind,

    /// Direction as seen from the source.
    pub direction: Direction,

    /// Multiplicity of the relation.
    pub cardinality: Cardinality,

    /// Applied by the engine when an endpoint is deleted.
    pub cascade: CascadePolicy,

    notion: Arc<dyn Notion>,
}

impl RelationClass {
    /// Relation with no cascade and the default object notion.
    pub fn new(
        dest_type: impl Into<TypeName>,
        rel_kind: RelKind,
        direction: Direction,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            dest_type: dest_type.into(),
            rel_kind,
            direction,
            cardinality,
            cascade: CascadePolicy::default(),
            notion: Arc::new(ObjectNotion),
        }
    }

    pub fn with_cascade(mut self, cascade: CascadePolicy) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_notion(mut self, notion: Arc<dyn Notion>) -> Self {
        self.notion = notion;
        self
    }

    pub fn notion(&self) -> &dyn Notion {
        self.notion.as_ref()
    }
}

impl std::fmt::Debug for RelationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationClass")
            .field("dest_type", &self.dest_type)
            .field("rel_kind", &self.rel_kind)
            .field("direction", &self.direction)
            .field("cardinality", &self.cardinality)
            .field("cascade", &self.cascade)
            .finish_non_exhaustive()
    }
}

/// A named `(source, kind, dest)` combination bound to a relationship entity
/// type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedRelation {
    /// External name of the relation (`page_links`).
    pub name: String,

    /// Relationship entity type instances of this relation resolve to.
    pub entity_type: TypeName,

    /// Source entity type.
    pub source_type: TypeName,

    /// Storage-level relationship kind.
    pub rel_kind: RelKind,

    /// Destination entity type.
    pub dest_type: TypeName,
}

impl NamedRelation {
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<TypeName>,
        source_type: impl Into<TypeName>,
        rel_kind: RelKind,
        dest_type: impl Into<TypeName>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            source_type: source_type.into(),
            rel_kind,
            dest_type: dest_type.into(),
        }
    }
}

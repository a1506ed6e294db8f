//! Data Model
//!
//! Core data structures of the entity-context subsystem:
//!
//! - `PropertyKey` / `PropertyMap` - property metadata and untyped values
//! - `TypeDefinition` - explicit entity type and capability declarations
//! - `NodeEntity` / `RelationshipEntity` / `GraphEntity` - processing-time
//!   snapshots handed to validators, hooks and listeners
//! - `RelationClass` / `NamedRelation` - relation metadata
//! - `ErrorToken` / `ErrorBuffer` - structured validation failures
//! - `PropertyValidator` and the built-in validators
//! - `EntityLifecycle` / `CreationTransformation` - per-type behavior

pub mod context;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod property;
pub mod relation;
pub mod types;
pub mod validators;

pub use context::AccessContext;
pub use entity::{EntityId, GraphEntity, NodeEntity, NodeId, RelationshipEntity, RelationshipId};
pub use error::{
    ErrorBuffer, ErrorToken, STATUS_FORBIDDEN, STATUS_INTERNAL, STATUS_UNPROCESSABLE,
    TOKEN_INDEX_TIMEOUT, TOKEN_MUST_NOT_BE_EMPTY, TOKEN_PATTERN_MISMATCH, TOKEN_READ_ONLY,
    TOKEN_ROLLED_BACK, TOKEN_TYPE_MISMATCH,
};
pub use lifecycle::{CreationTransformation, EntityLifecycle};
pub use property::{PropertyGroup, PropertyKey, PropertyMap, CREATED_AT_KEY, TYPE_KEY, UUID_KEY};
pub use relation::{
    Cardinality, CascadePolicy, Direction, NamedRelation, Notion, ObjectNotion, PropertyNotion,
    RelKind, RelationClass,
};
pub use types::{EntityKind, TypeDefinition, TypeName, GRAPH_OBJECT_TYPE};
pub use validators::{
    JsonKind, NonEmptyValidator, PatternValidator, PropertyValidator, ReadOnlyValidator,
    TypeValidator,
};

//! Entity Type Declarations
//!
//! Graft resolves metadata (property keys, views, validators, relations)
//! along a per-type inheritance chain. Types declare themselves explicitly
//! through [`TypeDefinition`]; nothing is discovered by scanning.
//!
//! # Architecture
//!
//! - **Explicit registration**: every entity type, capability and parent link
//!   is declared up front and handed to the registry during bootstrap
//! - **Single root**: every resolution chain terminates in [`GRAPH_OBJECT_TYPE`],
//!   which carries the shared system properties
//! - **Capabilities**: cross-cutting facets (the interface role); a type lists
//!   them directly, the registry closes over transitive ones
//!
//! # Examples
//!
//! ```rust
//! use graft_core::models::{EntityKind, TypeDefinition};
//!
//! let page = TypeDefinition::node("Page")
//!     .with_parent("Content")
//!     .with_capability("Linkable");
//!
//! assert_eq!(page.name, "Page");
//! assert_eq!(page.kind, EntityKind::Node);
//! assert_eq!(page.parent.as_deref(), Some("Content"));
//! ```

use serde::{Deserialize, Serialize};

/// Name of an entity type or capability, always TitleCase (`Page`, `Linkable`).
pub type TypeName = String;

/// Root type every resolution chain ends in. Declares the system properties
/// shared by all nodes and relationships.
pub const GRAPH_OBJECT_TYPE: &str = "GraphObject";

/// Whether a type describes nodes or relationships.
///
/// The distinction matters for searchable-key auto-enrollment: validators on
/// node types enroll their key in the keyword index, validators on
/// relationship types in the relationship keyword index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Node,
    Relationship,
}

/// Explicit declaration of an entity type or capability.
///
/// Registered once during bootstrap; the registry precomputes the resolution
/// chain (self, transitive capabilities, parent, its capabilities, and so on
/// up to the root) from these declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    /// TitleCase type name, unique per registry.
    pub name: TypeName,

    /// Node or relationship type.
    pub kind: EntityKind,

    /// Direct parent type, if any. Absent parents resolve to the root.
    pub parent: Option<TypeName>,

    /// Directly declared capabilities, in declaration order.
    pub capabilities: Vec<TypeName>,
}

impl TypeDefinition {
    /// Declare a node type with no parent and no capabilities.
    pub fn node(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Node,
            parent: None,
            capabilities: Vec::new(),
        }
    }

    /// Declare a relationship type with no parent and no capabilities.
    pub fn relationship(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Relationship,
            parent: None,
            capabilities: Vec::new(),
        }
    }

    /// Declare a capability. Capabilities participate in resolution chains
    /// through the `capabilities` lists of the types that carry them; they can
    /// declare further capabilities of their own, which the registry closes
    /// over transitively.
    pub fn capability(name: impl Into<TypeName>) -> Self {
        Self::node(name)
    }

    /// Set the direct parent type.
    pub fn with_parent(mut self, parent: impl Into<TypeName>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Append a directly declared capability.
    pub fn with_capability(mut self, capability: impl Into<TypeName>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

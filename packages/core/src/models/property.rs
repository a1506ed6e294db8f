//! Property Metadata
//!
//! Properties are stored untyped (`serde_json::Value`) under their storage
//! name; [`PropertyKey`] is the metadata describing one property of one
//! declaring type: how it is stored, how it is exposed externally, and
//! whether it is a system property excluded from business-data accounting.
//!
//! # Architecture
//!
//! - **Storage vs external name**: `db_name` is what the engine persists,
//!   `rest_name` is what external representations use; they usually coincide
//! - **System properties**: bookkeeping fields (`type`, `uuid`, `created_at`)
//!   that never flip the change set's non-system flag
//! - **Generic fallback**: lookups for unregistered names succeed with a
//!   pass-through key, so unknown properties flow untouched
//!
//! # Examples
//!
//! ```rust
//! use graft_core::models::PropertyKey;
//!
//! let title = PropertyKey::new("Page", "title");
//! assert_eq!(title.db_name, "title");
//! assert_eq!(title.rest_name, "title");
//! assert!(!title.system);
//!
//! let internal = PropertyKey::system("Page", "cache_slot");
//! assert!(internal.system);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::types::{TypeName, GRAPH_OBJECT_TYPE};

/// Storage name of the entity type discriminator property.
pub const TYPE_KEY: &str = "type";

/// Storage name of the stable external identifier property.
pub const UUID_KEY: &str = "uuid";

/// Storage name of the creation timestamp property (RFC 3339 string).
pub const CREATED_AT_KEY: &str = "created_at";

/// Property values of one entity, keyed by storage name.
///
/// A `BTreeMap` keeps iteration deterministic, which the commit pipeline and
/// serialized snapshots rely on.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Metadata for one property of one declaring type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyKey {
    /// Name the storage engine persists the value under.
    pub db_name: String,

    /// Name external representations (views, projections) use.
    pub rest_name: String,

    /// Type that declared this key. Subtypes resolve it through the chain.
    pub declaring_type: TypeName,

    /// System properties are bookkeeping; they are excluded from the
    /// "did business data change" accounting of the change set.
    pub system: bool,
}

impl PropertyKey {
    /// Declare a regular property; the external name defaults to the storage
    /// name.
    pub fn new(declaring_type: impl Into<TypeName>, db_name: impl Into<String>) -> Self {
        let db_name = db_name.into();
        Self {
            rest_name: db_name.clone(),
            db_name,
            declaring_type: declaring_type.into(),
            system: false,
        }
    }

    /// Declare a system property.
    pub fn system(declaring_type: impl Into<TypeName>, db_name: impl Into<String>) -> Self {
        Self {
            system: true,
            ..Self::new(declaring_type, db_name)
        }
    }

    /// Pass-through key for a name no type has registered. Declared by the
    /// root type, never a system property.
    pub fn generic(db_name: impl Into<String>) -> Self {
        Self::new(GRAPH_OBJECT_TYPE, db_name)
    }

    /// Override the external name.
    pub fn with_rest_name(mut self, rest_name: impl Into<String>) -> Self {
        self.rest_name = rest_name.into();
        self
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.db_name)
    }
}

/// Named synthetic aggregate over several property keys.
///
/// Groups resolve through the same inheritance chain as single-value lookups
/// and project an entity's member values into one JSON object.
#[derive(Debug, Clone)]
pub struct PropertyGroup {
    name: String,
    keys: Vec<std::sync::Arc<PropertyKey>>,
}

impl PropertyGroup {
    pub fn new(name: impl Into<String>, keys: Vec<std::sync::Arc<PropertyKey>>) -> Self {
        Self {
            name: name.into(),
            keys,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[std::sync::Arc<PropertyKey>] {
        &self.keys
    }

    /// Collect the group's member values from a property map into a JSON
    /// object keyed by external name. Absent members are omitted.
    pub fn project(&self, properties: &PropertyMap) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for key in &self.keys {
            if let Some(value) = properties.get(&key.db_name) {
                object.insert(key.rest_name.clone(), value.clone());
            }
        }
        serde_json::Value::Object(object)
    }
}

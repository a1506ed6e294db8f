//! Property key, view and property group tables of the [`EntityRegistry`].
//!
//! Keys are interned once at registration and handed out as `Arc` clones.
//! Lookups that miss the whole chain fall back to a generic key declared by
//! the root type, so callers never deal with "unknown property" as an error
//! case. Views aggregate along the chain; property groups resolve
//! first-match and are memoized per `(type, name)` pair, negative results
//! included.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::models::entity::GraphEntity;
use crate::models::property::{PropertyGroup, PropertyKey};

use super::EntityRegistry;

/// View containing every key registered for a type. Keys join it
/// automatically at registration.
pub const VIEW_ALL: &str = "all";

/// Default external view; the root type exposes `uuid` and `type` here.
pub const VIEW_PUBLIC: &str = "public";

impl EntityRegistry {
    /// Intern a property key for a type. The key joins the type's `all`
    /// view and its database name becomes a known property.
    pub fn register_property_key(&self, type_name: &str, key: PropertyKey) -> Arc<PropertyKey> {
        let key = Arc::new(key);
        let mut tables = self.write_tables();
        tables.known_properties.insert(key.db_name.clone());
        tables
            .property_keys
            .entry(type_name.to_string())
            .or_default()
            .insert(key.db_name.clone(), key.clone());
        tables
            .property_keys_rest
            .entry(type_name.to_string())
            .or_default()
            .insert(key.rest_name.clone(), key.clone());
        let all_view = tables
            .views
            .entry(type_name.to_string())
            .or_default()
            .entry(VIEW_ALL.to_string())
            .or_default();
        if !all_view.iter().any(|existing| existing.db_name == key.db_name) {
            all_view.push(key.clone());
        }
        key
    }

    /// Resolve a key by database name along the chain. Misses yield a
    /// generic key declared by the root type.
    pub fn property_key_for_db_name(&self, type_name: &str, db_name: &str) -> Arc<PropertyKey> {
        let tables = self.read_tables();
        let chain = Self::chain_within(&tables, type_name);
        for level in chain.iter() {
            if let Some(key) = tables.property_keys.get(level).and_then(|keys| keys.get(db_name)) {
                return key.clone();
            }
        }
        Arc::new(PropertyKey::generic(db_name))
    }

    /// Resolve a key by REST name along the chain, with the same generic
    /// fallback as [`Self::property_key_for_db_name`].
    pub fn property_key_for_rest_name(&self, type_name: &str, rest_name: &str) -> Arc<PropertyKey> {
        let tables = self.read_tables();
        let chain = Self::chain_within(&tables, type_name);
        for level in chain.iter() {
            if let Some(key) = tables
                .property_keys_rest
                .get(level)
                .and_then(|keys| keys.get(rest_name))
            {
                return key.clone();
            }
        }
        Arc::new(PropertyKey::generic(rest_name))
    }

    /// Whether any type registered a key or property relation under this
    /// database name.
    pub fn is_known_property(&self, db_name: &str) -> bool {
        self.read_tables().known_properties.contains(db_name)
    }

    /// Add keys to a named view of a type. Duplicate database names within
    /// one view level are dropped.
    pub fn register_property_set(&self, type_name: &str, view: &str, keys: &[Arc<PropertyKey>]) {
        let mut tables = self.write_tables();
        let slot = tables
            .views
            .entry(type_name.to_string())
            .or_default()
            .entry(view.to_string())
            .or_default();
        for key in keys {
            if !slot.iter().any(|existing| existing.db_name == key.db_name) {
                slot.push(key.clone());
            }
        }
    }

    /// Keys of a view aggregated along the chain, most specific level
    /// first, deduplicated by database name.
    pub fn property_set(&self, type_name: &str, view: &str) -> Vec<Arc<PropertyKey>> {
        let tables = self.read_tables();
        let chain = Self::chain_within(&tables, type_name);
        let mut seen: HashSet<String> = HashSet::new();
        let mut keys = Vec::new();
        for level in chain.iter() {
            if let Some(level_keys) = tables.views.get(level).and_then(|views| views.get(view)) {
                for key in level_keys {
                    if seen.insert(key.db_name.clone()) {
                        keys.push(key.clone());
                    }
                }
            }
        }
        keys
    }

    /// Project an entity through a view. Output is keyed by REST name;
    /// properties absent from the entity are omitted.
    pub fn project(&self, entity: &GraphEntity, view: &str) -> Map<String, Value> {
        let mut projected = Map::new();
        for key in self.property_set(entity.type_name(), view) {
            if let Some(value) = entity.property(&key.db_name) {
                projected.insert(key.rest_name.clone(), value.clone());
            }
        }
        projected
    }

    /// Register a property group under a type and database name. The group
    /// memo is reset because chain resolution may now land differently.
    pub fn register_property_group(&self, type_name: &str, db_name: &str, group: PropertyGroup) {
        {
            let mut tables = self.write_tables();
            tables
                .groups
                .entry(type_name.to_string())
                .or_default()
                .insert(db_name.to_string(), Arc::new(group));
        }
        self.lock_group_cache().clear();
    }

    /// First property group for `(type, db_name)` along the chain. Hits and
    /// misses are both memoized.
    pub fn property_group(&self, type_name: &str, db_name: &str) -> Option<Arc<PropertyGroup>> {
        let memo_key = (type_name.to_string(), db_name.to_string());
        if let Some(memoized) = self.lock_group_cache().get(&memo_key) {
            return memoized.clone();
        }
        let resolved = {
            let tables = self.read_tables();
            let chain = Self::chain_within(&tables, type_name);
            let mut found = None;
            for level in chain.iter() {
                if let Some(group) = tables.groups.get(level).and_then(|groups| groups.get(db_name)) {
                    found = Some(group.clone());
                    break;
                }
            }
            found
        };
        self.lock_group_cache().insert(memo_key, resolved.clone());
        resolved
    }
}

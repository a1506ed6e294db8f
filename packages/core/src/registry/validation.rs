//! Validator and searchable-property tables of the [`EntityRegistry`].
//!
//! Validators aggregate along the chain, so a subtype runs its own
//! validators plus everything inherited. Registering a validator also
//! enrolls the key in the keyword index matching the type's kind, which
//! keeps every validated property findable.

use std::sync::Arc;

use crate::models::property::PropertyKey;
use crate::models::types::EntityKind;
use crate::models::validators::PropertyValidator;

use super::EntityRegistry;

/// Keyword index for node properties.
pub const INDEX_KEYWORD: &str = "keyword";

/// Fulltext index for node properties.
pub const INDEX_FULLTEXT: &str = "fulltext";

/// Keyword index for relationship properties.
pub const INDEX_REL_KEYWORD: &str = "rel_keyword";

impl EntityRegistry {
    /// Attach a validator to `(type, key)`. The same `Arc` is stored at
    /// most once per slot. The key is enrolled in the keyword index of the
    /// type's kind.
    pub fn register_validator(
        &self,
        type_name: &str,
        key: &Arc<PropertyKey>,
        validator: Arc<dyn PropertyValidator>,
    ) {
        {
            let mut tables = self.write_tables();
            let slot = tables
                .validators
                .entry(type_name.to_string())
                .or_default()
                .entry(key.db_name.clone())
                .or_default();
            if !slot.iter().any(|existing| Arc::ptr_eq(existing, &validator)) {
                slot.push(validator);
            }
        }
        let index = match self.type_kind(type_name) {
            EntityKind::Relationship => INDEX_REL_KEYWORD,
            EntityKind::Node => INDEX_KEYWORD,
        };
        self.register_searchable_property(type_name, index, key.clone());
    }

    /// All validators for `(type, db_name)` along the chain, most specific
    /// level first.
    pub fn validators(&self, type_name: &str, db_name: &str) -> Vec<Arc<dyn PropertyValidator>> {
        let tables = self.read_tables();
        let chain = Self::chain_within(&tables, type_name);
        let mut collected: Vec<Arc<dyn PropertyValidator>> = Vec::new();
        for level in chain.iter() {
            if let Some(validators) = tables
                .validators
                .get(level)
                .and_then(|slots| slots.get(db_name))
            {
                for validator in validators {
                    if !collected.iter().any(|known| Arc::ptr_eq(known, validator)) {
                        collected.push(validator.clone());
                    }
                }
            }
        }
        collected
    }

    /// Enroll a key in a named index of a type. Duplicate database names
    /// within one index level are dropped.
    pub fn register_searchable_property(&self, type_name: &str, index: &str, key: Arc<PropertyKey>) {
        let mut tables = self.write_tables();
        let slot = tables
            .searchable
            .entry(type_name.to_string())
            .or_default()
            .entry(index.to_string())
            .or_default();
        if !slot.iter().any(|existing| existing.db_name == key.db_name) {
            slot.push(key);
        }
    }

    /// Keys of an index aggregated along the chain, deduplicated by
    /// database name.
    pub fn searchable_properties(&self, type_name: &str, index: &str) -> Vec<Arc<PropertyKey>> {
        let tables = self.read_tables();
        let chain = Self::chain_within(&tables, type_name);
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut keys = Vec::new();
        for level in chain.iter() {
            if let Some(level_keys) = tables.searchable.get(level).and_then(|slots| slots.get(index)) {
                for key in level_keys {
                    if seen.insert(key.db_name.clone()) {
                        keys.push(key.clone());
                    }
                }
            }
        }
        keys
    }
}

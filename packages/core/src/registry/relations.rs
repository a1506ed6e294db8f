//! Relation tables of the [`EntityRegistry`].
//!
//! Two families live here. Relation classes describe how a source type
//! reaches a destination (kind, direction, cardinality, cascade, notion)
//! and are resolved with a fixed asymmetric order: the source chain is
//! walked against the exact destination first, and only then the
//! destination chain against the exact source. Both sides are never
//! generalized at once.
//!
//! Named relations map a `(source, kind, destination)` triple to the entity
//! type of the relationship itself. Their fallback is asymmetric too: the
//! destination side walks its full chain while the source side only tries
//! its capabilities, never its superclasses.

use std::sync::Arc;

use crate::models::property::PropertyKey;
use crate::models::relation::{NamedRelation, RelKind, RelationClass};
use crate::models::types::TypeName;

use super::EntityRegistry;

impl EntityRegistry {
    /// Register how `source_type` relates to the class's destination type.
    pub fn register_entity_relation(&self, source_type: &str, relation: RelationClass) {
        let mut tables = self.write_tables();
        tables
            .entity_relations
            .entry(source_type.to_string())
            .or_default()
            .insert(relation.dest_type.clone(), Arc::new(relation));
    }

    /// Register a relation exposed as a property of `source_type`. The
    /// database name becomes a known property.
    pub fn register_property_relation(&self, source_type: &str, db_name: &str, relation: RelationClass) {
        let mut tables = self.write_tables();
        tables.known_properties.insert(db_name.to_string());
        tables
            .property_relations
            .entry(source_type.to_string())
            .or_default()
            .insert(db_name.to_string(), Arc::new(relation));
    }

    /// Relation class between two types.
    ///
    /// Phase one walks the source chain against the exact destination,
    /// phase two the destination chain against the exact source. A relation
    /// registered between two ancestors is therefore never found for a pair
    /// of their descendants.
    pub fn relation_class(&self, source_type: &str, dest_type: &str) -> Option<Arc<RelationClass>> {
        let tables = self.read_tables();
        let source_chain = Self::chain_within(&tables, source_type);
        for level in source_chain.iter() {
            if let Some(relation) = tables
                .entity_relations
                .get(level)
                .and_then(|relations| relations.get(dest_type))
            {
                return Some(relation.clone());
            }
        }
        let dest_chain = Self::chain_within(&tables, dest_type);
        for level in dest_chain.iter() {
            if let Some(relation) = tables
                .entity_relations
                .get(source_type)
                .and_then(|relations| relations.get(level))
            {
                return Some(relation.clone());
            }
        }
        None
    }

    /// Relation class behind a property name, resolved along the source
    /// chain.
    pub fn relation_class_for_property(
        &self,
        source_type: &str,
        db_name: &str,
    ) -> Option<Arc<RelationClass>> {
        let tables = self.read_tables();
        let chain = Self::chain_within(&tables, source_type);
        for level in chain.iter() {
            if let Some(relation) = tables
                .property_relations
                .get(level)
                .and_then(|relations| relations.get(db_name))
            {
                return Some(relation.clone());
            }
        }
        None
    }

    /// Relation class behind a property key. When the key's database name
    /// normalizes to a registered type that interpretation wins outright,
    /// even if no relation exists for it; only non-type names fall through
    /// to the property relation table.
    pub fn relation_class_for_key(
        &self,
        source_type: &str,
        key: &PropertyKey,
    ) -> Option<Arc<RelationClass>> {
        if let Some(dest_type) = self.entity_type_for_raw(&key.db_name) {
            return self.relation_class(source_type, &dest_type);
        }
        self.relation_class_for_property(source_type, &key.db_name)
    }

    /// Register a named relation under its name and its combined
    /// `(source, kind, destination)` key.
    pub fn register_named_relation(&self, relation: NamedRelation) {
        let relation = Arc::new(relation);
        let mut tables = self.write_tables();
        tables.combined_relations.insert(
            (
                relation.source_type.clone(),
                relation.rel_kind.clone(),
                relation.dest_type.clone(),
            ),
            relation.clone(),
        );
        tables
            .named_relations
            .insert(relation.name.clone(), relation);
    }

    pub fn named_relation(&self, name: &str) -> Option<Arc<NamedRelation>> {
        self.read_tables().named_relations.get(name).cloned()
    }

    /// All named relations, ordered by name.
    pub fn named_relations(&self) -> Vec<Arc<NamedRelation>> {
        let tables = self.read_tables();
        let mut relations: Vec<Arc<NamedRelation>> =
            tables.named_relations.values().cloned().collect();
        relations.sort_by(|a, b| a.name.cmp(&b.name));
        relations
    }

    /// Entity type of the relationship between `source_type` and
    /// `dest_type` under `rel_kind`.
    ///
    /// After the exact triple, the destination chain is walked with the
    /// source held fixed. The source side then tries its capabilities
    /// against the exact destination; source superclasses are never
    /// consulted.
    pub fn relationship_entity_type(
        &self,
        source_type: &str,
        rel_kind: &RelKind,
        dest_type: &str,
    ) -> Option<TypeName> {
        let tables = self.read_tables();
        let exact = (
            source_type.to_string(),
            rel_kind.clone(),
            dest_type.to_string(),
        );
        if let Some(relation) = tables.combined_relations.get(&exact) {
            return Some(relation.entity_type.clone());
        }
        let dest_chain = Self::chain_within(&tables, dest_type);
        for level in dest_chain.iter() {
            let probe = (source_type.to_string(), rel_kind.clone(), level.clone());
            if let Some(relation) = tables.combined_relations.get(&probe) {
                return Some(relation.entity_type.clone());
            }
        }
        for capability in Self::transitive_capabilities(&tables, source_type) {
            let probe = (capability, rel_kind.clone(), dest_type.to_string());
            if let Some(relation) = tables.combined_relations.get(&probe) {
                return Some(relation.entity_type.clone());
            }
        }
        None
    }
}

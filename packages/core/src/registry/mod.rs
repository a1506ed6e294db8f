//! Entity Registry
//!
//! Process-wide metadata spine of the core. For every entity type the
//! registry tracks property keys, views, property groups, validators,
//! searchable keys, relation classes, named relations, lifecycle hooks and
//! creation transformations, and resolves all of them along a precomputed
//! per-type inheritance chain.
//!
//! # Architecture
//!
//! - **One lock**: all tables live behind a single `RwLock`; registration is
//!   a bootstrap activity, lookups are concurrent reads afterwards
//! - **Precomputed chains**: `register_type` recomputes every resolution
//!   chain (self, transitive capabilities, parent, its capabilities, up to
//!   the root), so lookups never traverse declarations
//! - **Arc out, never references**: lookups return `Arc` clones; no guard
//!   ever escapes the registry
//! - **Implicit types**: unregistered names resolve with the chain
//!   `[name, GraphObject]`, so unknown domain types work out of the box
//!
//! # Examples
//!
//! ```rust
//! use graft_core::models::{PropertyKey, TypeDefinition};
//! use graft_core::registry::EntityRegistry;
//!
//! let registry = EntityRegistry::new();
//! registry.register_type(TypeDefinition::node("Page").with_parent("Content"));
//! registry.register_type(TypeDefinition::node("Content"));
//! registry.register_property_key("Content", PropertyKey::new("Content", "title"));
//!
//! // Resolved through the chain: Page -> Content -> GraphObject.
//! let key = registry.property_key_for_db_name("Page", "title");
//! assert_eq!(key.declaring_type, "Content");
//! ```

pub mod naming;
pub mod properties;
pub mod relations;
pub mod validation;

pub use naming::denormalize_entity_name;
pub use properties::{VIEW_ALL, VIEW_PUBLIC};
pub use validation::{INDEX_FULLTEXT, INDEX_KEYWORD, INDEX_REL_KEYWORD};

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lru::LruCache;

use crate::models::lifecycle::{CreationTransformation, EntityLifecycle};
use crate::models::property::{PropertyGroup, PropertyKey, CREATED_AT_KEY, TYPE_KEY, UUID_KEY};
use crate::models::relation::{NamedRelation, RelKind, RelationClass};
use crate::models::types::{EntityKind, TypeDefinition, TypeName, GRAPH_OBJECT_TYPE};
use crate::models::validators::PropertyValidator;

/// Default bound of the entity-name normalization cache. Entries are
/// per-segment; 1024 covers realistic type vocabularies many times over
/// while keeping hostile or generated names from growing the cache without
/// limit.
pub const DEFAULT_NAME_CACHE_CAPACITY: usize = 1024;

#[derive(Default)]
struct RegistryTables {
    types: HashMap<TypeName, Arc<TypeDefinition>>,
    chains: HashMap<TypeName, Arc<Vec<TypeName>>>,
    property_keys: HashMap<TypeName, HashMap<String, Arc<PropertyKey>>>,
    property_keys_rest: HashMap<TypeName, HashMap<String, Arc<PropertyKey>>>,
    known_properties: HashSet<String>,
    views: HashMap<TypeName, HashMap<String, Vec<Arc<PropertyKey>>>>,
    groups: HashMap<TypeName, HashMap<String, Arc<PropertyGroup>>>,
    validators: HashMap<TypeName, HashMap<String, Vec<Arc<dyn PropertyValidator>>>>,
    searchable: HashMap<TypeName, HashMap<String, Vec<Arc<PropertyKey>>>>,
    entity_relations: HashMap<TypeName, HashMap<TypeName, Arc<RelationClass>>>,
    property_relations: HashMap<TypeName, HashMap<String, Arc<RelationClass>>>,
    named_relations: HashMap<String, Arc<NamedRelation>>,
    combined_relations: HashMap<(TypeName, RelKind, TypeName), Arc<NamedRelation>>,
    lifecycles: HashMap<TypeName, Arc<dyn EntityLifecycle>>,
    transformations: HashMap<TypeName, Vec<Arc<dyn CreationTransformation>>>,
}

/// Process-wide entity metadata registry.
pub struct EntityRegistry {
    tables: RwLock<RegistryTables>,
    group_cache: Mutex<HashMap<(TypeName, String), Option<Arc<PropertyGroup>>>>,
    name_cache: Mutex<LruCache<String, String>>,
}

impl EntityRegistry {
    /// Registry with the default normalization-cache bound. The root type
    /// and its system properties are registered immediately.
    pub fn new() -> Self {
        Self::with_name_cache_capacity(DEFAULT_NAME_CACHE_CAPACITY)
    }

    /// Registry with an explicit normalization-cache bound (minimum 1).
    pub fn with_name_cache_capacity(capacity: usize) -> Self {
        let registry = Self {
            tables: RwLock::new(RegistryTables::default()),
            group_cache: Mutex::new(HashMap::new()),
            name_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN),
            )),
        };
        registry.register_root_type();
        registry
    }

    /// The root type carries the system properties shared by every entity
    /// and the default public view.
    fn register_root_type(&self) {
        self.register_type(TypeDefinition::node(GRAPH_OBJECT_TYPE));
        let type_key =
            self.register_property_key(GRAPH_OBJECT_TYPE, PropertyKey::system(GRAPH_OBJECT_TYPE, TYPE_KEY));
        let uuid_key =
            self.register_property_key(GRAPH_OBJECT_TYPE, PropertyKey::system(GRAPH_OBJECT_TYPE, UUID_KEY));
        self.register_property_key(
            GRAPH_OBJECT_TYPE,
            PropertyKey::system(GRAPH_OBJECT_TYPE, CREATED_AT_KEY),
        );
        self.register_property_set(GRAPH_OBJECT_TYPE, VIEW_PUBLIC, &[uuid_key, type_key]);
    }

    /// Register an entity type or capability declaration. Re-registering a
    /// name replaces its declaration. All resolution chains are recomputed,
    /// so registration order does not matter.
    pub fn register_type(&self, definition: TypeDefinition) {
        tracing::debug!("registering entity type {}", definition.name);
        let mut tables = self.write_tables();
        tables
            .types
            .insert(definition.name.clone(), Arc::new(definition));
        Self::recompute_chains(&mut tables);
    }

    pub fn type_definition(&self, type_name: &str) -> Option<Arc<TypeDefinition>> {
        self.read_tables().types.get(type_name).cloned()
    }

    pub fn type_count(&self) -> usize {
        self.read_tables().types.len()
    }

    /// Kind of a registered type; unregistered names default to node.
    pub fn type_kind(&self, type_name: &str) -> EntityKind {
        self.read_tables()
            .types
            .get(type_name)
            .map(|def| def.kind)
            .unwrap_or(EntityKind::Node)
    }

    /// Resolution chain of a type: itself, its transitive capabilities, its
    /// parent with that parent's capabilities, and so on, terminated by the
    /// root type. Unregistered names yield `[name, GraphObject]`.
    pub fn resolution_chain(&self, type_name: &str) -> Arc<Vec<TypeName>> {
        let tables = self.read_tables();
        Self::chain_within(&tables, type_name)
    }

    /// Map a raw external segment (`pages`, `menu_items`) to a registered
    /// type or capability name, if normalization lands on one.
    pub fn entity_type_for_raw(&self, raw: &str) -> Option<TypeName> {
        let normalized = self.normalize_entity_name(raw);
        let tables = self.read_tables();
        tables.types.contains_key(&normalized).then_some(normalized)
    }

    /// Register the lifecycle hooks for a type. One hook per type; resolved
    /// first-match along the chain.
    pub fn register_lifecycle(&self, type_name: &str, lifecycle: Arc<dyn EntityLifecycle>) {
        let mut tables = self.write_tables();
        tables.lifecycles.insert(type_name.to_string(), lifecycle);
    }

    pub fn lifecycle(&self, type_name: &str) -> Option<Arc<dyn EntityLifecycle>> {
        let tables = self.read_tables();
        let chain = Self::chain_within(&tables, type_name);
        for level in chain.iter() {
            if let Some(hook) = tables.lifecycles.get(level) {
                return Some(hook.clone());
            }
        }
        None
    }

    /// Register a creation transformation for a type. Transformations
    /// aggregate along the chain.
    pub fn register_creation_transformation(
        &self,
        type_name: &str,
        transformation: Arc<dyn CreationTransformation>,
    ) {
        let mut tables = self.write_tables();
        tables
            .transformations
            .entry(type_name.to_string())
            .or_default()
            .push(transformation);
    }

    /// All creation transformations applying to a type, in ascending order;
    /// ties keep chain and registration order.
    pub fn creation_transformations(&self, type_name: &str) -> Vec<Arc<dyn CreationTransformation>> {
        let tables = self.read_tables();
        let chain = Self::chain_within(&tables, type_name);
        let mut collected: Vec<Arc<dyn CreationTransformation>> = Vec::new();
        for level in chain.iter() {
            if let Some(transformations) = tables.transformations.get(level) {
                collected.extend(transformations.iter().cloned());
            }
        }
        collected.sort_by_key(|t| t.order());
        collected
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, RegistryTables> {
        self.tables.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, RegistryTables> {
        self.tables.write().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_group_cache(
        &self,
    ) -> MutexGuard<'_, HashMap<(TypeName, String), Option<Arc<PropertyGroup>>>> {
        self.group_cache.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_name_cache(&self) -> MutexGuard<'_, LruCache<String, String>> {
        self.name_cache.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn recompute_chains(tables: &mut RegistryTables) {
        let computed: Vec<(TypeName, Arc<Vec<TypeName>>)> = tables
            .types
            .keys()
            .map(|name| (name.clone(), Arc::new(Self::chain_from(tables, name))))
            .collect();
        tables.chains = computed.into_iter().collect();
    }

    fn chain_within(tables: &RegistryTables, type_name: &str) -> Arc<Vec<TypeName>> {
        tables
            .chains
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| Arc::new(Self::chain_from(tables, type_name)))
    }

    fn chain_from(tables: &RegistryTables, start: &str) -> Vec<TypeName> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        // Tracked separately from `seen`: a parent already in the chain via a
        // capability still gets its ancestry walked, but a declaration cycle
        // must terminate the ascent.
        let mut visited_levels = HashSet::new();
        let mut level = Some(start.to_string());
        while let Some(name) = level {
            if !visited_levels.insert(name.clone()) {
                break;
            }
            if seen.insert(name.clone()) {
                chain.push(name.clone());
            }
            if let Some(definition) = tables.types.get(&name) {
                for capability in &definition.capabilities {
                    Self::push_capability(tables, capability, &mut chain, &mut seen);
                }
                level = definition.parent.clone();
            } else {
                level = None;
            }
        }
        if seen.insert(GRAPH_OBJECT_TYPE.to_string()) {
            chain.push(GRAPH_OBJECT_TYPE.to_string());
        }
        chain
    }

    fn push_capability(
        tables: &RegistryTables,
        capability: &str,
        chain: &mut Vec<TypeName>,
        seen: &mut HashSet<TypeName>,
    ) {
        if !seen.insert(capability.to_string()) {
            return;
        }
        chain.push(capability.to_string());
        if let Some(definition) = tables.types.get(capability) {
            for nested in &definition.capabilities {
                Self::push_capability(tables, nested, chain, seen);
            }
        }
    }

    /// Transitive capabilities of one type, excluding the type itself and
    /// without ascending to its parent.
    fn transitive_capabilities(tables: &RegistryTables, type_name: &str) -> Vec<TypeName> {
        let mut capabilities = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(type_name.to_string());
        if let Some(definition) = tables.types.get(type_name) {
            for capability in &definition.capabilities {
                Self::push_capability(tables, capability, &mut capabilities, &mut seen);
            }
        }
        capabilities
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("types", &self.type_count())
            .finish_non_exhaustive()
    }
}

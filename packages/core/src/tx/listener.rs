//! Transaction listeners.
//!
//! Listeners observe every stage of a commit. The boolean callbacks double
//! as veto points: returning `false` marks the transaction failed while
//! processing continues, and the shared [`ErrorBuffer`] lets a listener
//! say why. Panics are not caught; a panicking listener takes the commit
//! down with it.

use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::models::context::AccessContext;
use crate::models::entity::GraphEntity;
use crate::models::error::ErrorBuffer;
use crate::models::property::{PropertyKey, PropertyMap};

use super::TransactionKey;

#[allow(unused_variables)]
pub trait TransactionListener: Send + Sync {
    /// A transaction started and its change set exists.
    fn begin(&self, ctx: &AccessContext, key: TransactionKey) {}

    /// A property was removed from an entity that survives the
    /// transaction.
    fn property_removed(
        &self,
        ctx: &AccessContext,
        key: TransactionKey,
        errors: &mut ErrorBuffer,
        entity: &GraphEntity,
        property: &PropertyKey,
        previous: Option<&Value>,
    ) -> bool {
        true
    }

    /// A property was assigned.
    fn property_modified(
        &self,
        ctx: &AccessContext,
        key: TransactionKey,
        errors: &mut ErrorBuffer,
        entity: &GraphEntity,
        property: &PropertyKey,
        previous: Option<&Value>,
        value: Option<&Value>,
    ) -> bool {
        true
    }

    fn graph_object_created(
        &self,
        ctx: &AccessContext,
        key: TransactionKey,
        errors: &mut ErrorBuffer,
        entity: &GraphEntity,
    ) -> bool {
        true
    }

    fn graph_object_modified(
        &self,
        ctx: &AccessContext,
        key: TransactionKey,
        errors: &mut ErrorBuffer,
        entity: &GraphEntity,
    ) -> bool {
        true
    }

    /// An entity was deleted; `former_properties` is its last state.
    fn graph_object_deleted(
        &self,
        ctx: &AccessContext,
        key: TransactionKey,
        errors: &mut ErrorBuffer,
        entity: &GraphEntity,
        former_properties: &PropertyMap,
    ) -> bool {
        true
    }

    /// The transaction committed.
    fn commit(&self, ctx: &AccessContext, key: TransactionKey) {}

    /// The transaction rolled back.
    fn rollback(&self, ctx: &AccessContext, key: TransactionKey) {}
}

/// Insertion-ordered set of listeners, deduplicated by `Arc` identity.
///
/// Iteration works on a snapshot, so callbacks may register or unregister
/// listeners without deadlocking.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn TransactionListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener unless this exact instance is already present.
    pub fn register(&self, listener: Arc<dyn TransactionListener>) {
        let mut listeners = self.write();
        if !listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            listeners.push(listener);
        }
    }

    /// Remove this exact instance, if present.
    pub fn unregister(&self, listener: &Arc<dyn TransactionListener>) {
        self.write().retain(|known| !Arc::ptr_eq(known, listener));
    }

    /// Current listeners, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn TransactionListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn TransactionListener>>> {
        self.listeners.write().unwrap_or_else(|p| p.into_inner())
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passive;
    impl TransactionListener for Passive {}

    #[test]
    fn test_register_deduplicates_by_identity() {
        let set = ListenerSet::new();
        let listener: Arc<dyn TransactionListener> = Arc::new(Passive);
        set.register(listener.clone());
        set.register(listener);
        set.register(Arc::new(Passive));

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_unregister_removes_exact_instance() {
        let set = ListenerSet::new();
        let first: Arc<dyn TransactionListener> = Arc::new(Passive);
        let second: Arc<dyn TransactionListener> = Arc::new(Passive);
        set.register(first.clone());
        set.register(second);

        set.unregister(&first);
        assert_eq!(set.len(), 1);
        // Unregistering an unknown instance is a no-op.
        set.unregister(&first);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached_from_the_set() {
        let set = ListenerSet::new();
        set.register(Arc::new(Passive));
        let snapshot = set.snapshot();
        set.register(Arc::new(Passive));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_default_callbacks_pass() {
        let listener = Passive;
        let ctx = AccessContext::system();
        let key = TransactionKey(1);
        let mut errors = ErrorBuffer::new();
        let entity = GraphEntity::from(crate::models::entity::NodeEntity::from_parts(
            crate::models::entity::NodeId(1),
            PropertyMap::new(),
        ));

        assert!(listener.graph_object_created(&ctx, key, &mut errors, &entity));
        assert!(listener.graph_object_modified(&ctx, key, &mut errors, &entity));
        assert!(listener.graph_object_deleted(&ctx, key, &mut errors, &entity, &PropertyMap::new()));
        assert!(errors.is_empty());
    }
}

//! Entity Lifecycle Hooks
//!
//! Types can register behavior that runs inside the commit pipeline:
//! [`EntityLifecycle`] hooks fire before creation, modification and deletion
//! of matching entities, and [`CreationTransformation`]s seed or derive
//! properties when the engine stages a new node.
//!
//! Hooks resolve like any single-value lookup (first match along the
//! resolution chain); transformations aggregate along the chain and run in
//! ascending `order`.

use crate::models::context::AccessContext;
use crate::models::entity::GraphEntity;
use crate::models::error::ErrorBuffer;
use crate::models::property::PropertyMap;

/// Per-type hooks run by the commit pipeline. All callbacks default to
/// passing; a `false` return marks the transaction failed (processing
/// continues, the commit aborts at the end).
pub trait EntityLifecycle: Send + Sync {
    /// Runs for every entity created this transaction, before notification.
    fn before_create(
        &self,
        ctx: &AccessContext,
        entity: &GraphEntity,
        errors: &mut ErrorBuffer,
    ) -> bool {
        let _ = (ctx, entity, errors);
        true
    }

    /// Runs in the final sweep for every entity whose business data changed.
    fn before_modify(
        &self,
        ctx: &AccessContext,
        entity: &GraphEntity,
        errors: &mut ErrorBuffer,
    ) -> bool {
        let _ = (ctx, entity, errors);
        true
    }

    /// Runs for every entity deleted this transaction. `former` holds the
    /// properties the entity had before deletion.
    fn before_delete(
        &self,
        ctx: &AccessContext,
        entity: &GraphEntity,
        former: &PropertyMap,
        errors: &mut ErrorBuffer,
    ) -> bool {
        let _ = (ctx, entity, former, errors);
        true
    }
}

/// Property transform applied when a node of the registered type is staged
/// for creation. Transformations registered along the chain run in ascending
/// [`order`](CreationTransformation::order).
pub trait CreationTransformation: Send + Sync {
    /// Position in the transformation sequence; lower runs first. Ties keep
    /// registration order.
    fn order(&self) -> i32 {
        0
    }

    fn apply(&self, ctx: &AccessContext, properties: &mut PropertyMap);
}

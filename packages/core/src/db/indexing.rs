//! External relationship indexing boundary.
//!
//! The commit pipeline notifies an indexer about relationship property
//! assignments and about every relationship that survives a commit. Node
//! indexing is intentionally not part of this boundary. Calls are timed by
//! the pipeline against its index budget, so implementations should stay
//! quick or hand off to their own queue.

use crate::models::entity::RelationshipEntity;
use crate::models::property::PropertyKey;

pub trait RelationshipIndexer: Send + Sync {
    /// Reindex a whole relationship after it was created or modified.
    fn index_relationship(&self, relationship: &RelationshipEntity);

    /// Index one property assignment. Called for every assignment,
    /// including those on freshly created relationships.
    fn index_relationship_property(&self, relationship: &RelationshipEntity, key: &PropertyKey);
}

/// Indexer that drops everything. Default wiring for embedded use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexer;

impl RelationshipIndexer for NoopIndexer {
    fn index_relationship(&self, _relationship: &RelationshipEntity) {}

    fn index_relationship_property(&self, _relationship: &RelationshipEntity, _key: &PropertyKey) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::{NodeId, RelationshipId};
    use crate::models::property::PropertyMap;
    use crate::models::relation::RelKind;

    #[test]
    fn test_noop_indexer_accepts_everything() {
        let indexer = NoopIndexer;
        let relationship = RelationshipEntity::from_parts(
            RelationshipId(1),
            RelKind::from("LINKS_TO"),
            NodeId(1),
            NodeId(2),
            PropertyMap::new(),
        );
        indexer.index_relationship(&relationship);
        indexer.index_relationship_property(&relationship, &PropertyKey::generic("weight"));
    }
}

//! Storage Error Types
//!
//! Errors surfaced by the embedded graph engine. Commit rejections carry
//! the full [`CommitFailure`] so callers can read the structured error
//! tokens the pipeline collected.

use thiserror::Error;

use crate::models::entity::{NodeId, RelationshipId};
use crate::tx::CommitFailure;

/// Graph store operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The node does not exist, or was deleted in this transaction
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The relationship does not exist, or was deleted in this transaction
    #[error("unknown relationship {0}")]
    UnknownRelationship(RelationshipId),

    /// A relationship endpoint is missing from the graph
    #[error("relationship endpoint {0} does not exist")]
    EndpointMissing(NodeId),

    /// The commit pipeline rejected the transaction; staged changes were
    /// discarded
    #[error(transparent)]
    TransactionAborted(#[from] CommitFailure),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::ErrorBuffer;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            StoreError::UnknownNode(NodeId(7)).to_string(),
            "unknown node 7"
        );
        assert_eq!(
            StoreError::EndpointMissing(NodeId(3)).to_string(),
            "relationship endpoint 3 does not exist"
        );
    }

    #[test]
    fn test_aborted_carries_the_failure() {
        let failure = CommitFailure::unprocessable(ErrorBuffer::new());
        let error = StoreError::from(failure.clone());
        assert_eq!(error, StoreError::TransactionAborted(failure));
        assert_eq!(error.to_string(), "transaction aborted with status 422");
    }
}

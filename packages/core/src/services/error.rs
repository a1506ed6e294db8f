//! Service Layer Error Types
//!
//! High-level errors for the orchestration layer. Commit rejections keep
//! the structured [`CommitFailure`] so callers can map error tokens onto
//! their own surface.

use thiserror::Error;

use crate::db::StoreError;
use crate::tx::CommitFailure;

/// Graph service operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Storage operation failed before the commit pipeline was involved
    #[error("storage operation failed: {0}")]
    Store(#[from] StoreError),

    /// The commit pipeline rejected the transaction
    #[error(transparent)]
    Commit(#[from] CommitFailure),
}

//! Failure value carried from an aborted commit back to the engine.

use serde::Serialize;
use thiserror::Error;

use crate::models::error::{
    ErrorBuffer, ErrorToken, STATUS_INTERNAL, STATUS_UNPROCESSABLE, TOKEN_ROLLED_BACK,
};
use crate::models::types::GRAPH_OBJECT_TYPE;

/// Why a transaction did not commit: an HTTP-shaped status plus the
/// structured tokens collected while the pipeline ran.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("transaction aborted with status {status}")]
pub struct CommitFailure {
    pub status: u16,
    pub errors: ErrorBuffer,
}

impl CommitFailure {
    /// Commit rejected by validation or a callback; carries the collected
    /// tokens under status 422.
    pub fn unprocessable(errors: ErrorBuffer) -> Self {
        Self {
            status: STATUS_UNPROCESSABLE,
            errors,
        }
    }

    /// Generic failure reported when a rollback has no recorded cause.
    pub fn rolled_back() -> Self {
        let mut errors = ErrorBuffer::new();
        errors.add(ErrorToken::new(
            STATUS_INTERNAL,
            GRAPH_OBJECT_TYPE,
            TOKEN_ROLLED_BACK,
        ));
        Self {
            status: STATUS_INTERNAL,
            errors,
        }
    }
}

//! Transaction pipeline
//!
//! Everything that happens between "the engine wants to commit" and "the
//! commit is final" lives here: the change set accumulated per
//! transaction, the listener registry, the nine-phase commit pipeline and
//! the broadcast bridge that turns committed change sets into events.
//!
//! # Architecture
//!
//! - **Explicit context**: every callback receives the `AccessContext` and
//!   the `TransactionKey`; no thread-local state anywhere
//! - **Result-based abort**: `before_commit` returns
//!   `Result<(), CommitFailure>`; the engine rolls back on `Err` instead of
//!   unwinding
//! - **Continue-then-decide**: validators, hooks and listeners all run even
//!   after the first failure, so one failed commit reports every problem

pub mod broadcast;
pub mod change_set;
pub mod error;
pub mod interceptor;
pub mod listener;

#[cfg(test)]
mod interceptor_test;

pub use broadcast::{ChangeEvent, ChangeStreamListener, CHANGE_EVENT_CHANNEL_CAPACITY};
pub use change_set::TransactionChangeSet;
pub use error::CommitFailure;
pub use interceptor::{CommitPipeline, PipelineConfig, DEFAULT_INDEX_CALL_BUDGET};
pub use listener::{ListenerSet, TransactionListener};

use serde::Serialize;

/// Identifier of one engine transaction, allocated by the engine and used
/// to key pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TransactionKey(pub u64);

impl std::fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

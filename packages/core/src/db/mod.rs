//! Storage Layer
//!
//! This module holds the boundary between the transaction pipeline and
//! whatever engine persists the graph:
//!
//! - Pre-commit transaction descriptions ([`TransactionData`])
//! - The relationship indexing seam ([`RelationshipIndexer`])
//! - An embedded in-memory engine ([`MemoryGraphStore`]) used as the
//!   reference implementation and for tests
//!
//! # Architecture
//!
//! The pipeline never talks to an engine directly. Engines describe their
//! staged work as plain data and hand it over; everything type-aware
//! (validation, listeners, cascades via registered relation classes)
//! happens above this boundary. Node indexing is deliberately absent from
//! the indexer seam.

mod error;
pub mod indexing;
mod memory_store;
pub mod tx_data;

pub use error::StoreError;
pub use indexing::{NoopIndexer, RelationshipIndexer};
pub use memory_store::{GraphTransaction, MemoryGraphStore};
pub use tx_data::{NodeHandle, PropertyEntry, RelationshipHandle, TransactionData};

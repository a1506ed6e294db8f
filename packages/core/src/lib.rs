//! Graft Core Entity Layer
//!
//! This crate provides the type registry, transaction interception and
//! change notification machinery for the Graft graph system.
//!
//! # Architecture
//!
//! - **Explicit registration**: types, property keys, views, relations and
//!   validators are registered at startup; nothing is scanned or discovered
//! - **One registry, one lock**: registrations and lookups share a single
//!   read-write-locked table set, so readers never block each other
//! - **Interception over storage**: the commit pipeline validates and
//!   notifies on a plain data description of each transaction; storage
//!   engines stay behind a narrow boundary
//! - **Committed changes only**: the broadcast change stream flushes on
//!   commit and stays silent for rolled-back transactions
//!
//! # Modules
//!
//! - [`models`] - Entities, property keys, contexts, validators, errors
//! - [`registry`] - The entity registry: types, properties, relations,
//!   views, validators, name normalization
//! - [`tx`] - Transaction change sets, the commit pipeline, listeners and
//!   the change stream
//! - [`db`] - Storage boundary types and the embedded in-memory engine
//! - [`services`] - `GraphService` orchestration

pub mod db;
pub mod models;
pub mod registry;
pub mod services;
pub mod tx;

// Re-export commonly used types
pub use models::*;
pub use registry::EntityRegistry;
pub use services::*;

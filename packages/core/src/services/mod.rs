//! Orchestration Services
//!
//! This module assembles the subsystems into an embeddable unit:
//!
//! - `GraphService` - registry, commit pipeline, change stream and the
//!   embedded store, bootstrapped and ready
//! - `ServiceError` - high-level error surface keeping structured commit
//!   failures intact
//!
//! Hosts embed `GraphService` directly; everything it exposes is also
//! reachable piecemeal for callers that wire their own engine.

pub mod error;
pub mod graph_service;

pub use error::ServiceError;
pub use graph_service::{GraphService, GraphServiceConfig};

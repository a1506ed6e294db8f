//! Graph Service
//!
//! [`GraphService`] wires the registry, the commit pipeline, the change
//! stream and the embedded store into one ready-to-use unit. Construction
//! cannot fail: the registry bootstraps the root type and system property
//! keys, the change-stream listener is registered with the pipeline, and
//! only then is the pipeline marked ready.
//!
//! # Examples
//!
//! ```
//! use graft_core::models::AccessContext;
//! use graft_core::services::GraphService;
//! use serde_json::json;
//!
//! let service = GraphService::new();
//! let mut events = service.subscribe_to_events();
//!
//! let ctx = AccessContext::system();
//! let id = service.create_node(
//!     &ctx,
//!     "Folder",
//!     [("name".to_string(), json!("inbox"))].into(),
//! )?;
//!
//! assert_eq!(service.store().node(id).unwrap().type_name(), "Folder");
//! assert_eq!(events.try_recv().unwrap().event_type(), "nodeCreated");
//! # Ok::<(), graft_core::services::ServiceError>(())
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::db::{GraphTransaction, MemoryGraphStore, StoreError};
use crate::models::context::AccessContext;
use crate::models::entity::{NodeId, RelationshipId};
use crate::models::property::PropertyMap;
use crate::models::relation::RelKind;
use crate::models::types::TypeName;
use crate::registry::{EntityRegistry, DEFAULT_NAME_CACHE_CAPACITY};
use crate::tx::{
    ChangeEvent, ChangeStreamListener, CommitPipeline, PipelineConfig, DEFAULT_INDEX_CALL_BUDGET,
};

use super::error::ServiceError;

/// Tuning knobs for [`GraphService`]. The defaults match the standalone
/// registry and pipeline constants.
#[derive(Debug, Clone)]
pub struct GraphServiceConfig {
    /// Bound of the entity-name normalization cache.
    pub name_cache_capacity: usize,

    /// Cumulative time budget for relationship-indexer calls per commit.
    pub index_call_budget: Duration,
}

impl Default for GraphServiceConfig {
    fn default() -> Self {
        Self {
            name_cache_capacity: DEFAULT_NAME_CACHE_CAPACITY,
            index_call_budget: DEFAULT_INDEX_CALL_BUDGET,
        }
    }
}

/// Registry, pipeline, change stream and store assembled for embedding.
#[derive(Debug)]
pub struct GraphService {
    registry: Arc<EntityRegistry>,
    pipeline: Arc<CommitPipeline>,
    store: Arc<MemoryGraphStore>,
    change_stream: Arc<ChangeStreamListener>,
}

impl GraphService {
    pub fn new() -> Self {
        Self::with_config(GraphServiceConfig::default())
    }

    pub fn with_config(config: GraphServiceConfig) -> Self {
        let registry = Arc::new(EntityRegistry::with_name_cache_capacity(
            config.name_cache_capacity,
        ));
        let pipeline = Arc::new(CommitPipeline::with_config(
            registry.clone(),
            PipelineConfig {
                index_call_budget: config.index_call_budget,
            },
        ));
        let change_stream = Arc::new(ChangeStreamListener::new());
        pipeline.listeners().register(change_stream.clone());
        let store = Arc::new(MemoryGraphStore::new(registry.clone(), pipeline.clone()));
        // Bootstrap is complete; commits are validated from here on.
        pipeline.set_ready(true);
        tracing::info!(
            "graph service ready with {} registered types",
            registry.type_count()
        );
        Self {
            registry,
            pipeline,
            store,
            change_stream,
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &Arc<CommitPipeline> {
        &self.pipeline
    }

    pub fn store(&self) -> &Arc<MemoryGraphStore> {
        &self.store
    }

    /// Opens a transaction against the embedded store.
    pub fn begin(&self, ctx: &AccessContext) -> GraphTransaction<'_> {
        self.store.begin(ctx)
    }

    /// New receiver on the committed-change broadcast channel.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<ChangeEvent> {
        self.change_stream.subscribe()
    }

    /// Creates one node in its own transaction.
    pub fn create_node(
        &self,
        ctx: &AccessContext,
        type_name: impl Into<TypeName>,
        properties: PropertyMap,
    ) -> Result<NodeId, ServiceError> {
        let mut tx = self.store.begin(ctx);
        let id = tx.create_node(type_name, properties);
        commit_single(tx)?;
        Ok(id)
    }

    /// Creates one relationship in its own transaction.
    pub fn connect(
        &self,
        ctx: &AccessContext,
        kind: impl Into<RelKind>,
        start: NodeId,
        end: NodeId,
        properties: PropertyMap,
    ) -> Result<RelationshipId, ServiceError> {
        let mut tx = self.store.begin(ctx);
        let id = tx.create_relationship(kind, start, end, properties)?;
        commit_single(tx)?;
        Ok(id)
    }
}

impl Default for GraphService {
    fn default() -> Self {
        Self::new()
    }
}

fn commit_single(tx: GraphTransaction<'_>) -> Result<(), ServiceError> {
    match tx.commit() {
        Ok(()) => Ok(()),
        Err(StoreError::TransactionAborted(failure)) => Err(ServiceError::Commit(failure)),
        Err(other) => Err(ServiceError::Store(other)),
    }
}

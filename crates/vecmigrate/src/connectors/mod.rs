//! Backend connectors.
//!
//! Each backend implements [`SourceReader`] and [`DestinationWriter`]. The
//! pipeline only ever talks to these two traits, so adding a backend means
//! implementing them and extending the factories at the bottom of this file.

pub mod chromadb;
pub mod common;
pub mod pinecone;
pub mod qdrant;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::schema::{Backend, DistanceMetric};

/// Metadata attached to an item.
pub type Payload = HashMap<String, serde_json::Value>;

/// The unit of transfer between backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationItem {
    /// Source identifier, verbatim (numeric ids as their decimal string).
    pub id: String,
    /// Vector embedding.
    pub vector: Vec<f32>,
    /// Metadata/payload. Never null; empty when the source has none.
    #[serde(default)]
    pub payload: Payload,
}

/// Collection and optional namespace a connector operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionScope {
    /// Collection (Pinecone: index) name.
    pub collection: String,
    /// Optional namespace/partition within the collection.
    pub namespace: Option<String>,
}

impl CollectionScope {
    /// Creates a scope without namespace.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            namespace: None,
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

/// Configuration of a destination collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    /// Collection name.
    pub name: String,
    /// Vector dimension, fixed at creation.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
}

/// What a source reports about a collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDescription {
    /// Source backend name.
    pub source_type: String,
    /// Collection name.
    pub collection: String,
    /// Vector dimension, if the backend reports it.
    pub dimension: Option<usize>,
    /// Distance metric in the backend's own vocabulary.
    pub metric: Option<String>,
    /// Total number of items (if known).
    pub total_count: Option<u64>,
}

/// One page of a source's identifier listing.
#[derive(Debug, Clone, Default)]
pub struct IdPage {
    /// Identifiers on this page.
    pub ids: Vec<String>,
    /// Cursor for the next page, `None` once pagination is exhausted.
    pub next_cursor: Option<String>,
}

/// Reading side of a backend.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Backend this reader talks to.
    fn backend(&self) -> Backend;

    /// Reports dimension, metric and item count of the collection.
    async fn describe(&self, scope: &CollectionScope) -> Result<SourceDescription>;

    /// Lists one page of identifiers starting at `cursor` (`None` = first page).
    async fn list_ids(&self, scope: &CollectionScope, cursor: Option<String>) -> Result<IdPage>;

    /// Fetches items by id. Ids unknown to the source are omitted from the map.
    async fn fetch(
        &self,
        scope: &CollectionScope,
        ids: &[String],
    ) -> Result<HashMap<String, MigrationItem>>;
}

/// Writing side of a backend.
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    /// Backend this writer talks to.
    fn backend(&self) -> Backend;

    /// Returns the collection's configuration, or `None` if it does not exist.
    async fn get_collection(&self, scope: &CollectionScope)
        -> Result<Option<CollectionDescriptor>>;

    /// Creates the collection with the given configuration.
    async fn create_collection(
        &self,
        scope: &CollectionScope,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionDescriptor>;

    /// Upserts a batch, returning once the backend acknowledged persistence.
    async fn write_batch(&self, scope: &CollectionScope, items: &[MigrationItem]) -> Result<usize>;

    /// Number of items the backend reports for the collection (or namespace).
    async fn count(&self, scope: &CollectionScope) -> Result<u64>;

    /// Returns the existing collection as-is, or creates it.
    ///
    /// An existing collection is never validated against the requested
    /// configuration; a mismatch is only logged.
    async fn ensure_collection(
        &self,
        scope: &CollectionScope,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionDescriptor> {
        match self.get_collection(scope).await? {
            Some(existing) => {
                if existing.dimension != dimension || existing.metric != metric {
                    warn!(
                        "Reusing collection '{}' ({}D, {}) although source is {}D, {}",
                        existing.name, existing.dimension, existing.metric, dimension, metric
                    );
                }
                Ok(existing)
            }
            None => self.create_collection(scope, dimension, metric).await,
        }
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily walks a source's identifier listing until pagination is exhausted.
pub fn id_pages<'a>(
    reader: &'a dyn SourceReader,
    scope: &'a CollectionScope,
) -> BoxStream<'a, Result<Vec<String>>> {
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let cursor = match cursor {
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
            Cursor::Done => return Ok(None),
        };
        let page = reader.list_ids(scope, cursor).await?;
        let next = page.next_cursor.map_or(Cursor::Done, Cursor::Next);
        Ok(Some((page.ids, next)))
    })
    .boxed()
}

/// Creates a source reader from endpoint configuration.
pub fn create_source(endpoint: &EndpointConfig, timeout: Duration) -> Result<Box<dyn SourceReader>> {
    endpoint.validate()?;
    match endpoint {
        EndpointConfig::Pinecone(cfg) => Ok(Box::new(pinecone::PineconeConnector::new(
            cfg.clone(),
            timeout,
        ))),
        EndpointConfig::Qdrant(cfg) => Ok(Box::new(qdrant::QdrantConnector::new(
            cfg.clone(),
            timeout,
        ))),
        EndpointConfig::ChromaDB(cfg) => Ok(Box::new(chromadb::ChromaDBConnector::new(
            cfg.clone(),
            timeout,
        ))),
    }
}

/// Creates a destination writer from endpoint configuration.
pub fn create_destination(
    endpoint: &EndpointConfig,
    timeout: Duration,
) -> Result<Box<dyn DestinationWriter>> {
    endpoint.validate()?;
    match endpoint {
        EndpointConfig::Pinecone(cfg) => Ok(Box::new(pinecone::PineconeConnector::new(
            cfg.clone(),
            timeout,
        ))),
        EndpointConfig::Qdrant(cfg) => Ok(Box::new(qdrant::QdrantConnector::new(
            cfg.clone(),
            timeout,
        ))),
        EndpointConfig::ChromaDB(cfg) => Ok(Box::new(chromadb::ChromaDBConnector::new(
            cfg.clone(),
            timeout,
        ))),
    }
}

//! `ChromaDB` connector (v2 REST API).
//!
//! Chroma addresses collections by id once they are resolved by name, so the
//! connector caches `name -> id`. Listing pages through `get` with an empty
//! `include` and offset/limit. The Chroma document travels in the payload
//! under [`DOCUMENT_FIELD`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ChromaDBConfig;
use crate::connectors::common::{
    check_response, create_http_client, decode_json, normalize_base_url, transport_error, Side,
};
use crate::connectors::{
    CollectionDescriptor, CollectionScope, DestinationWriter, IdPage, MigrationItem, Payload,
    SourceDescription, SourceReader,
};
use crate::error::{Error, Result};
use crate::schema::{document_for, translate_metric, Backend, DistanceMetric, DOCUMENT_FIELD};

/// Metadata key holding the collection's distance function.
const SPACE_KEY: &str = "hnsw:space";

/// Chroma's distance function when none is configured.
const DEFAULT_SPACE: &str = "l2";

/// Page size for identifier listing.
const LIST_LIMIT: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
struct ChromaCollection {
    id: String,
    #[serde(default)]
    metadata: Option<Payload>,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    configuration_json: Option<Value>,
}

impl ChromaCollection {
    /// Distance function name, in Chroma's vocabulary.
    fn space(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(SPACE_KEY))
            .and_then(Value::as_str)
            .or_else(|| {
                self.configuration_json
                    .as_ref()
                    .and_then(|c| c.pointer("/hnsw/space"))
                    .and_then(Value::as_str)
            })
            .unwrap_or(DEFAULT_SPACE)
            .to_string()
    }
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: Payload,
    get_or_create: bool,
}

#[derive(Debug, Default, Serialize)]
struct GetRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<usize>,
    include: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    embeddings: Option<Vec<Option<Vec<f32>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Payload>>>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    metadatas: Vec<Option<&'a Payload>>,
    documents: Vec<String>,
}

/// `ChromaDB` connector.
pub struct ChromaDBConnector {
    config: ChromaDBConfig,
    client: Client,
    base_url: String,
    collection_ids: Mutex<HashMap<String, String>>,
}

impl ChromaDBConnector {
    /// Creates a new `ChromaDB` connector with configured HTTP client.
    pub fn new(config: ChromaDBConfig, timeout: Duration) -> Self {
        let base_url = normalize_base_url(&config.url);
        Self {
            config,
            client: create_http_client(timeout),
            base_url,
            collection_ids: Mutex::new(HashMap::new()),
        }
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.config.tenant, self.config.database
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) => req.header("x-chroma-token", key),
            None => req,
        }
    }

    fn warn_namespace(scope: &CollectionScope) {
        if let Some(ns) = &scope.namespace {
            warn!("ChromaDB has no namespaces; ignoring namespace '{}'", ns);
        }
    }

    async fn lookup(&self, name: &str, side: Side) -> Result<Option<ChromaCollection>> {
        let url = format!("{}/{}", self.collections_url(), name);
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(e, "ChromaDB", side))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        let response = check_response(response, "ChromaDB", side).await?;
        let collection: ChromaCollection =
            decode_json(response, "ChromaDB collection", side).await?;
        self.remember(name, &collection).await;
        Ok(Some(collection))
    }

    async fn remember(&self, name: &str, collection: &ChromaCollection) {
        self.collection_ids
            .lock()
            .await
            .insert(name.to_string(), collection.id.clone());
    }

    /// Resolves a collection name to its id.
    async fn collection_id(&self, name: &str, side: Side) -> Result<String> {
        if let Some(id) = self.collection_ids.lock().await.get(name) {
            return Ok(id.clone());
        }
        let collection = self.lookup(name, side).await?.ok_or_else(|| {
            let message = format!("ChromaDB collection '{}' not found", name);
            match side {
                Side::Source => Error::SourceConnection(message),
                Side::Destination => Error::DestinationConnection(message),
            }
        })?;
        Ok(collection.id)
    }

    async fn get(
        &self,
        name: &str,
        request: &GetRequest<'_>,
        side: Side,
    ) -> Result<GetResponse> {
        let id = self.collection_id(name, side).await?;
        let url = format!("{}/{}/get", self.collections_url(), id);
        let response = self
            .request(Method::POST, &url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(e, "ChromaDB", side))?;
        let response = check_response(response, "ChromaDB", side).await?;
        decode_json(response, "ChromaDB get", side).await
    }

    /// Dimension the collection reports, or the length of its first embedding.
    async fn dimension(
        &self,
        name: &str,
        collection: &ChromaCollection,
        side: Side,
    ) -> Result<Option<usize>> {
        if collection.dimension.is_some() {
            return Ok(collection.dimension);
        }
        let peek = GetRequest {
            limit: Some(1),
            include: vec!["embeddings"],
            ..Default::default()
        };
        let sample = self.get(name, &peek, side).await?;
        Ok(sample
            .embeddings
            .and_then(|e| e.into_iter().flatten().next())
            .map(|v| v.len()))
    }
}

#[async_trait]
impl SourceReader for ChromaDBConnector {
    fn backend(&self) -> Backend {
        Backend::ChromaDB
    }

    async fn describe(&self, scope: &CollectionScope) -> Result<SourceDescription> {
        Self::warn_namespace(scope);
        let collection = self
            .lookup(&scope.collection, Side::Source)
            .await?
            .ok_or_else(|| {
                Error::SourceConnection(format!(
                    "ChromaDB collection '{}' not found",
                    scope.collection
                ))
            })?;

        let dimension = self
            .dimension(&scope.collection, &collection, Side::Source)
            .await?;

        Ok(SourceDescription {
            source_type: "chromadb".to_string(),
            collection: scope.collection.clone(),
            dimension,
            metric: Some(collection.space()),
            total_count: None,
        })
    }

    async fn list_ids(&self, scope: &CollectionScope, cursor: Option<String>) -> Result<IdPage> {
        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|e| Error::Extraction(format!("Invalid ChromaDB offset '{}': {}", c, e)))?,
            None => 0,
        };
        let request = GetRequest {
            limit: Some(LIST_LIMIT),
            offset: Some(offset),
            include: Vec::new(),
            ..Default::default()
        };
        let page = self.get(&scope.collection, &request, Side::Source).await?;

        debug!("ChromaDB get returned {} ids at offset {}", page.ids.len(), offset);

        let next_cursor = (page.ids.len() == LIST_LIMIT).then(|| (offset + LIST_LIMIT).to_string());
        Ok(IdPage {
            ids: page.ids,
            next_cursor,
        })
    }

    async fn fetch(
        &self,
        scope: &CollectionScope,
        ids: &[String],
    ) -> Result<HashMap<String, MigrationItem>> {
        let request = GetRequest {
            ids: Some(ids),
            include: vec!["embeddings", "metadatas", "documents"],
            ..Default::default()
        };
        let fetched = self.get(&scope.collection, &request, Side::Source).await?;

        let count = fetched.ids.len();
        let mut embeddings = fetched.embeddings.unwrap_or_default().into_iter();
        let mut metadatas = fetched.metadatas.unwrap_or_default().into_iter();
        let mut documents = fetched.documents.unwrap_or_default().into_iter();

        let mut items = HashMap::with_capacity(count);
        for id in fetched.ids {
            // Kept with an empty vector so the dimension filter skips it.
            let vector = embeddings.next().flatten().unwrap_or_else(|| {
                warn!("ChromaDB item '{}' has no embedding", id);
                Vec::new()
            });
            let mut payload = metadatas.next().flatten().unwrap_or_default();
            if let Some(document) = documents.next().flatten() {
                payload.insert(DOCUMENT_FIELD.to_string(), Value::String(document));
            }
            items.insert(
                id.clone(),
                MigrationItem {
                    id,
                    vector,
                    payload,
                },
            );
        }
        Ok(items)
    }
}

#[async_trait]
impl DestinationWriter for ChromaDBConnector {
    fn backend(&self) -> Backend {
        Backend::ChromaDB
    }

    /// Returns `None` for an empty collection that has no dimension yet; such
    /// a collection is adopted by [`DestinationWriter::create_collection`].
    async fn get_collection(
        &self,
        scope: &CollectionScope,
    ) -> Result<Option<CollectionDescriptor>> {
        Self::warn_namespace(scope);
        let Some(collection) = self.lookup(&scope.collection, Side::Destination).await? else {
            return Ok(None);
        };
        let Some(dimension) = self
            .dimension(&scope.collection, &collection, Side::Destination)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(CollectionDescriptor {
            name: scope.collection.clone(),
            dimension,
            metric: translate_metric(Backend::ChromaDB, &collection.space())?,
        }))
    }

    async fn create_collection(
        &self,
        scope: &CollectionScope,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionDescriptor> {
        let body = CreateCollectionRequest {
            name: &scope.collection,
            metadata: Payload::from([(
                SPACE_KEY.to_string(),
                Value::String(metric.vocabulary(Backend::ChromaDB).to_string()),
            )]),
            get_or_create: true,
        };

        let response = self
            .request(Method::POST, &self.collections_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, "ChromaDB", Side::Destination))?;
        let response = check_response(response, "ChromaDB", Side::Destination).await?;
        let collection: ChromaCollection =
            decode_json(response, "ChromaDB collection", Side::Destination).await?;
        self.remember(&scope.collection, &collection).await;

        // get_or_create keeps the metadata of a collection that already existed.
        let metric = translate_metric(Backend::ChromaDB, &collection.space())?;
        info!(
            "Using ChromaDB collection '{}' ({}D, {})",
            scope.collection, dimension, metric
        );

        Ok(CollectionDescriptor {
            name: scope.collection.clone(),
            dimension: collection.dimension.unwrap_or(dimension),
            metric,
        })
    }

    async fn write_batch(&self, scope: &CollectionScope, items: &[MigrationItem]) -> Result<usize> {
        let id = self
            .collection_id(&scope.collection, Side::Destination)
            .await?;
        let url = format!("{}/{}/upsert", self.collections_url(), id);
        let body = UpsertRequest {
            ids: items.iter().map(|i| i.id.as_str()).collect(),
            embeddings: items.iter().map(|i| i.vector.as_slice()).collect(),
            metadatas: items
                .iter()
                .map(|i| (!i.payload.is_empty()).then_some(&i.payload))
                .collect(),
            documents: items.iter().map(|i| document_for(&i.payload)).collect(),
        };

        let response = self
            .request(Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, "ChromaDB", Side::Destination))?;
        check_response(response, "ChromaDB", Side::Destination).await?;

        Ok(items.len())
    }

    async fn count(&self, scope: &CollectionScope) -> Result<u64> {
        let id = self
            .collection_id(&scope.collection, Side::Destination)
            .await?;
        let url = format!("{}/{}/count", self.collections_url(), id);
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(e, "ChromaDB", Side::Destination))?;
        let response = check_response(response, "ChromaDB", Side::Destination).await?;
        decode_json(response, "ChromaDB count", Side::Destination).await
    }
}

#[cfg(test)]
#[path = "chromadb_tests.rs"]
mod tests;

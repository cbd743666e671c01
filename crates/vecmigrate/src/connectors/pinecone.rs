//! Pinecone connector.
//!
//! Pinecone splits its API in two: the control plane (index metadata and
//! creation) and a per-index data plane whose host is reported by the control
//! plane. The data-plane host is resolved once per connector and cached.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::PineconeConfig;
use crate::connectors::common::{
    check_response, create_http_client, decode_json, normalize_base_url, transport_error, Side,
};
use crate::connectors::{
    CollectionDescriptor, CollectionScope, DestinationWriter, IdPage, MigrationItem, Payload,
    SourceDescription, SourceReader,
};
use crate::error::{Error, Result};
use crate::schema::{translate_metric, Backend, DistanceMetric};

/// API version sent with every request.
pub const API_VERSION: &str = "2024-07";

/// Page size for `vectors/list`.
const LIST_LIMIT: usize = 100;

/// Ids per `vectors/fetch` request; they travel in the query string.
const FETCH_CHUNK: usize = 100;

/// How often a freshly created index is polled for readiness.
const READY_POLL_ATTEMPTS: u32 = 60;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct IndexModel {
    #[serde(default)]
    dimension: Option<usize>,
    metric: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'static str,
    spec: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Debug, Deserialize)]
struct FetchedVector {
    id: String,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Payload>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Payload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
    #[serde(default)]
    total_vector_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: u64,
}

/// Pinecone connector.
pub struct PineconeConnector {
    config: PineconeConfig,
    client: Client,
    controller_url: String,
    host: OnceCell<String>,
}

impl PineconeConnector {
    /// Creates a new Pinecone connector with configured HTTP client.
    pub fn new(config: PineconeConfig, timeout: Duration) -> Self {
        let controller_url = normalize_base_url(&config.controller_url);
        let host = match &config.host {
            Some(h) => OnceCell::new_with(Some(normalize_base_url(h))),
            None => OnceCell::new(),
        };
        Self {
            config,
            client: create_http_client(timeout),
            controller_url,
            host,
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn describe_index(&self, index: &str, side: Side) -> Result<Option<IndexModel>> {
        let url = format!("{}/indexes/{}", self.controller_url, index);
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(e, "Pinecone", side))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        let response = check_response(response, "Pinecone", side).await?;
        let model = decode_json(response, "Pinecone index", side).await?;
        Ok(Some(model))
    }

    /// Data-plane base URL of the index.
    async fn host(&self, index: &str, side: Side) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let model = self
                    .describe_index(index, side)
                    .await?
                    .ok_or_else(|| not_found(index, side))?;
                model
                    .host
                    .map(|h| normalize_base_url(&h))
                    .ok_or_else(|| not_found(index, side))
            })
            .await?;
        Ok(host.as_str())
    }

    async fn stats(&self, scope: &CollectionScope, side: Side) -> Result<IndexStats> {
        let url = format!("{}/describe_index_stats", self.host(&scope.collection, side).await?);
        let response = self
            .request(Method::POST, &url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| transport_error(e, "Pinecone", side))?;
        let response = check_response(response, "Pinecone", side).await?;
        decode_json(response, "Pinecone stats", side).await
    }

    async fn wait_until_ready(&self, index: &str) -> Result<IndexModel> {
        for attempt in 0..READY_POLL_ATTEMPTS {
            if let Some(model) = self.describe_index(index, Side::Destination).await? {
                if model.status.as_ref().is_some_and(|s| s.ready) {
                    return Ok(model);
                }
                debug!(
                    "Pinecone index '{}' not ready (state {:?}), attempt {}",
                    index,
                    model.status.as_ref().and_then(|s| s.state.as_deref()),
                    attempt + 1
                );
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        Err(Error::DestinationConnection(format!(
            "Pinecone index '{}' did not become ready",
            index
        )))
    }
}

fn not_found(index: &str, side: Side) -> Error {
    let message = format!("Pinecone index '{}' not found", index);
    match side {
        Side::Source => Error::SourceConnection(message),
        Side::Destination => Error::DestinationConnection(message),
    }
}

fn namespace_count(stats: &IndexStats, namespace: Option<&str>) -> u64 {
    match namespace {
        Some(ns) => stats.namespaces.get(ns).map_or(0, |n| n.vector_count),
        None => stats.total_vector_count,
    }
}

#[async_trait]
impl SourceReader for PineconeConnector {
    fn backend(&self) -> Backend {
        Backend::Pinecone
    }

    async fn describe(&self, scope: &CollectionScope) -> Result<SourceDescription> {
        let model = self
            .describe_index(&scope.collection, Side::Source)
            .await?
            .ok_or_else(|| not_found(&scope.collection, Side::Source))?;
        if let Some(host) = &model.host {
            // Ignored when a host was configured explicitly.
            let _ = self.host.set(normalize_base_url(host));
        }

        let stats = self.stats(scope, Side::Source).await?;

        Ok(SourceDescription {
            source_type: "pinecone".to_string(),
            collection: scope.collection.clone(),
            dimension: model.dimension,
            metric: Some(model.metric),
            total_count: Some(namespace_count(&stats, scope.namespace.as_deref())),
        })
    }

    async fn list_ids(&self, scope: &CollectionScope, cursor: Option<String>) -> Result<IdPage> {
        let url = format!("{}/vectors/list", self.host(&scope.collection, Side::Source).await?);

        let mut query: Vec<(&str, String)> = vec![("limit", LIST_LIMIT.to_string())];
        if let Some(ns) = &scope.namespace {
            query.push(("namespace", ns.clone()));
        }
        if let Some(token) = cursor {
            query.push(("paginationToken", token));
        }

        let response = self
            .request(Method::GET, &url)
            .query(&query)
            .send()
            .await
            .map_err(|e| transport_error(e, "Pinecone", Side::Source))?;
        let response = check_response(response, "Pinecone", Side::Source).await?;
        let listed: ListResponse = decode_json(response, "Pinecone list", Side::Source).await?;

        debug!("Pinecone list returned {} ids", listed.vectors.len());

        Ok(IdPage {
            ids: listed.vectors.into_iter().map(|v| v.id).collect(),
            next_cursor: listed
                .pagination
                .and_then(|p| p.next)
                .filter(|t| !t.is_empty()),
        })
    }

    async fn fetch(
        &self,
        scope: &CollectionScope,
        ids: &[String],
    ) -> Result<HashMap<String, MigrationItem>> {
        let url = format!("{}/vectors/fetch", self.host(&scope.collection, Side::Source).await?);

        let mut items = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(FETCH_CHUNK) {
            let mut query: Vec<(&str, &str)> =
                chunk.iter().map(|id| ("ids", id.as_str())).collect();
            if let Some(ns) = &scope.namespace {
                query.push(("namespace", ns.as_str()));
            }

            let response = self
                .request(Method::GET, &url)
                .query(&query)
                .send()
                .await
                .map_err(|e| transport_error(e, "Pinecone", Side::Source))?;
            let response = check_response(response, "Pinecone", Side::Source).await?;
            let fetched: FetchResponse =
                decode_json(response, "Pinecone fetch", Side::Source).await?;

            items.extend(fetched.vectors.into_values().map(|v| {
                (
                    v.id.clone(),
                    MigrationItem {
                        id: v.id,
                        vector: v.values,
                        payload: v.metadata.unwrap_or_default(),
                    },
                )
            }));
        }
        Ok(items)
    }
}

#[async_trait]
impl DestinationWriter for PineconeConnector {
    fn backend(&self) -> Backend {
        Backend::Pinecone
    }

    async fn get_collection(
        &self,
        scope: &CollectionScope,
    ) -> Result<Option<CollectionDescriptor>> {
        let Some(model) = self
            .describe_index(&scope.collection, Side::Destination)
            .await?
        else {
            return Ok(None);
        };

        let dimension = model.dimension.ok_or_else(|| {
            Error::DestinationConnection(format!(
                "Pinecone index '{}' reports no dimension",
                scope.collection
            ))
        })?;

        Ok(Some(CollectionDescriptor {
            name: scope.collection.clone(),
            dimension,
            metric: translate_metric(Backend::Pinecone, &model.metric)?,
        }))
    }

    async fn create_collection(
        &self,
        scope: &CollectionScope,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionDescriptor> {
        let url = format!("{}/indexes", self.controller_url);
        let body = CreateIndexRequest {
            name: &scope.collection,
            dimension,
            metric: metric.vocabulary(Backend::Pinecone),
            spec: serde_json::json!({
                "serverless": {"cloud": self.config.cloud, "region": self.config.region}
            }),
        };

        let response = self
            .request(Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, "Pinecone", Side::Destination))?;
        check_response(response, "Pinecone", Side::Destination).await?;

        let model = self.wait_until_ready(&scope.collection).await?;
        if let Some(host) = &model.host {
            let _ = self.host.set(normalize_base_url(host));
        }

        info!(
            "Created Pinecone index '{}' ({}D, {})",
            scope.collection, dimension, metric
        );

        Ok(CollectionDescriptor {
            name: scope.collection.clone(),
            dimension,
            metric,
        })
    }

    async fn write_batch(&self, scope: &CollectionScope, items: &[MigrationItem]) -> Result<usize> {
        let url = format!(
            "{}/vectors/upsert",
            self.host(&scope.collection, Side::Destination).await?
        );
        let body = UpsertRequest {
            vectors: items
                .iter()
                .map(|item| UpsertVector {
                    id: &item.id,
                    values: &item.vector,
                    metadata: (!item.payload.is_empty()).then_some(&item.payload),
                })
                .collect(),
            namespace: scope.namespace.as_deref(),
        };

        let response = self
            .request(Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, "Pinecone", Side::Destination))?;
        let response = check_response(response, "Pinecone", Side::Destination).await?;
        let upserted: UpsertResponse =
            decode_json(response, "Pinecone upsert", Side::Destination).await?;

        Ok(upserted.upserted_count)
    }

    async fn count(&self, scope: &CollectionScope) -> Result<u64> {
        let stats = self.stats(scope, Side::Destination).await?;
        Ok(namespace_count(&stats, scope.namespace.as_deref()))
    }
}

#[cfg(test)]
#[path = "pinecone_tests.rs"]
mod tests;

//! Qdrant connector (REST API).
//!
//! Listing walks `points/scroll` with payload and vectors disabled, following
//! `next_page_offset` until Qdrant stops returning one. Fetch and upsert go
//! through the `points` endpoints; upserts use `wait=true`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QdrantConfig;
use crate::connectors::common::{
    check_response, create_http_client, decode_json, normalize_base_url, transport_error, Side,
};
use crate::connectors::{
    CollectionDescriptor, CollectionScope, DestinationWriter, IdPage, MigrationItem, Payload,
    SourceDescription, SourceReader,
};
use crate::error::{Error, Result};
use crate::schema::{translate_metric, Backend, DistanceMetric};

/// Payload key keeping the original id of points whose id Qdrant cannot store.
pub const SOURCE_ID_FIELD: &str = "_source_id";

/// Page size for identifier listing.
const SCROLL_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: Option<u64>,
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    #[serde(default)]
    vectors: Option<VectorsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(HashMap<String, VectorParams>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorParams {
    size: usize,
    distance: String,
}

#[derive(Debug, Serialize)]
struct ScrollRequest {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<Value>,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrolledPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ScrolledPoint {
    id: Value,
}

#[derive(Debug, Serialize)]
struct RetrieveRequest {
    ids: Vec<Value>,
    with_payload: bool,
    with_vector: Value,
}

#[derive(Debug, Deserialize)]
struct RetrievedPoint {
    id: Value,
    #[serde(default)]
    payload: Option<Payload>,
    #[serde(default)]
    vector: Option<Value>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    points: Vec<UpsertPoint>,
}

#[derive(Debug, Serialize)]
struct UpsertPoint {
    id: Value,
    vector: Value,
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

/// Converts a Qdrant point id (integer or UUID) to its string form.
fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a listed id back into the JSON form Qdrant expects.
fn id_to_json(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) if n.to_string() == id => Value::from(n),
        _ => Value::String(id.to_string()),
    }
}

/// Qdrant point id for an arbitrary source id.
///
/// Unsigned integers and UUIDs are kept; anything else maps to a stable
/// UUID v5, returned together with `true` to signal the remap.
pub fn destination_point_id(id: &str) -> (Value, bool) {
    if let Ok(n) = id.parse::<u64>() {
        if n.to_string() == id {
            return (Value::from(n), false);
        }
    }
    if Uuid::parse_str(id).is_ok() {
        return (Value::String(id.to_string()), false);
    }
    let derived = Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes());
    (Value::String(derived.to_string()), true)
}

/// Qdrant connector.
pub struct QdrantConnector {
    config: QdrantConfig,
    client: Client,
    base_url: String,
    /// Name of the only named vector, when the collection has one and none is configured.
    detected_name: OnceCell<String>,
}

impl QdrantConnector {
    /// Creates a new Qdrant connector with configured HTTP client.
    pub fn new(config: QdrantConfig, timeout: Duration) -> Self {
        let base_url = normalize_base_url(&config.url);
        Self {
            config,
            client: create_http_client(timeout),
            base_url,
            detected_name: OnceCell::new(),
        }
    }

    fn collection_url(&self, collection: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, collection, suffix)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.config.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    fn warn_namespace(scope: &CollectionScope) {
        if let Some(ns) = &scope.namespace {
            warn!("Qdrant has no namespaces; ignoring namespace '{}'", ns);
        }
    }

    async fn collection_info(
        &self,
        collection: &str,
        side: Side,
    ) -> Result<Option<CollectionInfo>> {
        let url = self.collection_url(collection, "");
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| transport_error(e, "Qdrant", side))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        let response = check_response(response, "Qdrant", side).await?;
        let info: QdrantResponse<CollectionInfo> =
            decode_json(response, "Qdrant collection", side).await?;
        Ok(Some(info.result))
    }

    /// Picks the vector parameters matching the configured vector name.
    fn vector_params(&self, vectors: Option<&VectorsConfig>) -> Result<VectorParams> {
        match (vectors, &self.config.vector_name) {
            (Some(VectorsConfig::Single(params)), None) => Ok(params.clone()),
            (Some(VectorsConfig::Named(named)), Some(name)) => {
                named.get(name).cloned().ok_or_else(|| {
                    Error::Config(format!("Qdrant collection has no vector named '{}'", name))
                })
            }
            (Some(VectorsConfig::Named(named)), None) if named.len() == 1 => {
                let (name, params) = named
                    .iter()
                    .next()
                    .ok_or_else(|| Error::Config("Qdrant collection has no vectors".to_string()))?;
                if self.detected_name.set(name.clone()).is_ok() {
                    debug!("Using Qdrant named vector '{}'", name);
                }
                Ok(params.clone())
            }
            (Some(VectorsConfig::Named(_)), None) => Err(Error::Config(
                "Qdrant collection has several named vectors; set vector_name".to_string(),
            )),
            (Some(VectorsConfig::Single(_)), Some(name)) => Err(Error::Config(format!(
                "Qdrant collection has an unnamed vector, not '{}'",
                name
            ))),
            (None, _) => Err(Error::Config(
                "Qdrant collection has no dense vector configuration".to_string(),
            )),
        }
    }

    /// Vector name used on write: the configured one, else the detected one.
    fn vector_name(&self) -> Option<&str> {
        self.config
            .vector_name
            .as_deref()
            .or_else(|| self.detected_name.get().map(String::as_str))
    }

    /// Extracts the configured vector from a retrieved point.
    ///
    /// A point without that vector yields an empty one, which never matches
    /// the collection dimension and is skipped downstream.
    fn parse_vector(&self, id: &str, vector: Option<Value>) -> Result<Vec<f32>> {
        let vector = match (vector, &self.config.vector_name) {
            (Some(Value::Object(mut named)), Some(name)) => named.remove(name),
            (Some(Value::Object(named)), None) if named.len() == 1 => {
                named.into_iter().next().map(|(_, v)| v)
            }
            (Some(v @ Value::Array(_)), _) => Some(v),
            _ => None,
        };

        let Some(vector) = vector else {
            warn!("Qdrant point '{}' has no usable vector", id);
            return Ok(Vec::new());
        };
        serde_json::from_value(vector)
            .map_err(|e| Error::Extraction(format!("Invalid Qdrant vector for '{}': {}", id, e)))
    }

    fn vector_value(&self, vector: &[f32]) -> Value {
        let values = Value::from(vector.to_vec());
        match self.vector_name() {
            Some(name) => Value::Object(serde_json::Map::from_iter([(name.to_string(), values)])),
            None => values,
        }
    }
}

#[async_trait]
impl SourceReader for QdrantConnector {
    fn backend(&self) -> Backend {
        Backend::Qdrant
    }

    async fn describe(&self, scope: &CollectionScope) -> Result<SourceDescription> {
        Self::warn_namespace(scope);
        let info = self
            .collection_info(&scope.collection, Side::Source)
            .await?
            .ok_or_else(|| {
                Error::SourceConnection(format!(
                    "Qdrant collection '{}' not found",
                    scope.collection
                ))
            })?;
        let params = self.vector_params(info.config.params.vectors.as_ref())?;

        Ok(SourceDescription {
            source_type: "qdrant".to_string(),
            collection: scope.collection.clone(),
            dimension: Some(params.size),
            metric: Some(params.distance),
            total_count: info.points_count,
        })
    }

    async fn list_ids(&self, scope: &CollectionScope, cursor: Option<String>) -> Result<IdPage> {
        let offset = cursor
            .map(|c| serde_json::from_str::<Value>(&c))
            .transpose()
            .map_err(|e| Error::Extraction(format!("Invalid Qdrant scroll offset: {}", e)))?;

        let url = self.collection_url(&scope.collection, "/points/scroll");
        let body = ScrollRequest {
            limit: SCROLL_LIMIT,
            offset,
            with_payload: false,
            with_vector: false,
        };

        let response = self
            .request(Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, "Qdrant", Side::Source))?;
        let response = check_response(response, "Qdrant", Side::Source).await?;
        let scrolled: QdrantResponse<ScrollResult> =
            decode_json(response, "Qdrant scroll", Side::Source).await?;

        let ids: Vec<String> = scrolled.result.points.iter().map(|p| id_to_string(&p.id)).collect();
        debug!("Qdrant scroll returned {} ids", ids.len());

        Ok(IdPage {
            ids,
            next_cursor: scrolled
                .result
                .next_page_offset
                .filter(|v| !v.is_null())
                .map(|v| v.to_string()),
        })
    }

    async fn fetch(
        &self,
        scope: &CollectionScope,
        ids: &[String],
    ) -> Result<HashMap<String, MigrationItem>> {
        let url = self.collection_url(&scope.collection, "/points");
        let with_vector = match &self.config.vector_name {
            Some(name) => serde_json::json!([name]),
            None => Value::Bool(true),
        };
        let body = RetrieveRequest {
            ids: ids.iter().map(|id| id_to_json(id)).collect(),
            with_payload: true,
            with_vector,
        };

        let response = self
            .request(Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, "Qdrant", Side::Source))?;
        let response = check_response(response, "Qdrant", Side::Source).await?;
        let retrieved: QdrantResponse<Vec<RetrievedPoint>> =
            decode_json(response, "Qdrant retrieve", Side::Source).await?;

        let mut items = HashMap::with_capacity(retrieved.result.len());
        for point in retrieved.result {
            let id = id_to_string(&point.id);
            let vector = self.parse_vector(&id, point.vector)?;
            items.insert(
                id.clone(),
                MigrationItem {
                    id,
                    vector,
                    payload: point.payload.unwrap_or_default(),
                },
            );
        }
        Ok(items)
    }
}

#[async_trait]
impl DestinationWriter for QdrantConnector {
    fn backend(&self) -> Backend {
        Backend::Qdrant
    }

    async fn get_collection(
        &self,
        scope: &CollectionScope,
    ) -> Result<Option<CollectionDescriptor>> {
        Self::warn_namespace(scope);
        let Some(info) = self
            .collection_info(&scope.collection, Side::Destination)
            .await?
        else {
            return Ok(None);
        };
        let params = self.vector_params(info.config.params.vectors.as_ref())?;

        Ok(Some(CollectionDescriptor {
            name: scope.collection.clone(),
            dimension: params.size,
            metric: translate_metric(Backend::Qdrant, &params.distance)?,
        }))
    }

    async fn create_collection(
        &self,
        scope: &CollectionScope,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionDescriptor> {
        let params = VectorParams {
            size: dimension,
            distance: metric.vocabulary(Backend::Qdrant).to_string(),
        };
        let vectors = match &self.config.vector_name {
            Some(name) => VectorsConfig::Named(HashMap::from([(name.clone(), params)])),
            None => VectorsConfig::Single(params),
        };

        let url = self.collection_url(&scope.collection, "");
        let response = self
            .request(Method::PUT, &url)
            .json(&serde_json::json!({ "vectors": vectors }))
            .send()
            .await
            .map_err(|e| transport_error(e, "Qdrant", Side::Destination))?;
        check_response(response, "Qdrant", Side::Destination).await?;

        info!(
            "Created Qdrant collection '{}' ({}D, {})",
            scope.collection, dimension, metric
        );

        Ok(CollectionDescriptor {
            name: scope.collection.clone(),
            dimension,
            metric,
        })
    }

    async fn write_batch(&self, scope: &CollectionScope, items: &[MigrationItem]) -> Result<usize> {
        let points: Vec<UpsertPoint> = items
            .iter()
            .map(|item| {
                let (id, remapped) = destination_point_id(&item.id);
                let mut payload = item.payload.clone();
                if remapped {
                    payload.insert(SOURCE_ID_FIELD.to_string(), Value::String(item.id.clone()));
                }
                UpsertPoint {
                    id,
                    vector: self.vector_value(&item.vector),
                    payload,
                }
            })
            .collect();

        let url = self.collection_url(&scope.collection, "/points?wait=true");
        let response = self
            .request(Method::PUT, &url)
            .json(&UpsertRequest { points })
            .send()
            .await
            .map_err(|e| transport_error(e, "Qdrant", Side::Destination))?;
        check_response(response, "Qdrant", Side::Destination).await?;

        Ok(items.len())
    }

    async fn count(&self, scope: &CollectionScope) -> Result<u64> {
        let url = self.collection_url(&scope.collection, "/points/count");
        let response = self
            .request(Method::POST, &url)
            .json(&serde_json::json!({ "exact": true }))
            .send()
            .await
            .map_err(|e| transport_error(e, "Qdrant", Side::Destination))?;
        let response = check_response(response, "Qdrant", Side::Destination).await?;
        let counted: QdrantResponse<CountResult> =
            decode_json(response, "Qdrant count", Side::Destination).await?;
        Ok(counted.result.count)
    }
}

#[cfg(test)]
#[path = "qdrant_tests.rs"]
mod tests;

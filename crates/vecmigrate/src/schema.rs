//! Schema translation between backends.
//!
//! Everything here is pure: metric vocabularies, payload reshaping and
//! payload field renames. Connectors call into this module but it never
//! calls back out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::connectors::{MigrationItem, Payload};
use crate::error::{Error, Result};

/// Payload key holding the Chroma document text.
pub const DOCUMENT_FIELD: &str = "document";

/// Supported vector database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pinecone (serverless or pod indexes).
    Pinecone,
    /// Qdrant.
    Qdrant,
    /// `ChromaDB` (v2 REST API).
    #[serde(rename = "chromadb")]
    ChromaDB,
}

impl Backend {
    /// Lowercase name used in configuration and messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Pinecone => "pinecone",
            Self::Qdrant => "qdrant",
            Self::ChromaDB => "chromadb",
        }
    }

    /// Parses a backend name, case-insensitively.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "qdrant" => Ok(Self::Qdrant),
            "chroma" | "chromadb" => Ok(Self::ChromaDB),
            other => Err(Error::Config(format!(
                "Unknown backend '{}'. Supported: pinecone, qdrant, chromadb",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Distance metric of a collection, independent of backend vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity.
    Cosine,
    /// Euclidean (L2) distance.
    Euclidean,
    /// Dot product.
    #[serde(rename = "dotproduct")]
    DotProduct,
}

impl DistanceMetric {
    /// Canonical lowercase name, as reported in migration results.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::DotProduct => "dotproduct",
        }
    }

    /// The metric's name in a backend's own vocabulary.
    #[must_use]
    pub fn vocabulary(self, backend: Backend) -> &'static str {
        match (backend, self) {
            (Backend::Pinecone, Self::Cosine) => "cosine",
            (Backend::Pinecone, Self::Euclidean) => "euclidean",
            (Backend::Pinecone, Self::DotProduct) => "dotproduct",
            (Backend::Qdrant, Self::Cosine) => "Cosine",
            (Backend::Qdrant, Self::Euclidean) => "Euclid",
            (Backend::Qdrant, Self::DotProduct) => "Dot",
            (Backend::ChromaDB, Self::Cosine) => "cosine",
            (Backend::ChromaDB, Self::Euclidean) => "l2",
            (Backend::ChromaDB, Self::DotProduct) => "ip",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translates a metric name reported by `backend` into a [`DistanceMetric`].
///
/// Matching is case-insensitive. Unknown names are an
/// [`Error::UnsupportedMetric`]; there is no default.
pub fn translate_metric(backend: Backend, source_metric: &str) -> Result<DistanceMetric> {
    let metric = source_metric.trim().to_lowercase();
    let translated = match (backend, metric.as_str()) {
        (Backend::Pinecone, "cosine") => DistanceMetric::Cosine,
        (Backend::Pinecone, "euclidean") => DistanceMetric::Euclidean,
        (Backend::Pinecone, "dotproduct") => DistanceMetric::DotProduct,
        (Backend::Qdrant, "cosine") => DistanceMetric::Cosine,
        (Backend::Qdrant, "euclid") => DistanceMetric::Euclidean,
        (Backend::Qdrant, "dot") => DistanceMetric::DotProduct,
        (Backend::ChromaDB, "cosine") => DistanceMetric::Cosine,
        (Backend::ChromaDB, "l2") => DistanceMetric::Euclidean,
        (Backend::ChromaDB, "ip") => DistanceMetric::DotProduct,
        _ => return Err(Error::unsupported_metric(backend.name(), source_metric)),
    };
    Ok(translated)
}

/// Reshapes a payload to what the destination backend accepts.
///
/// Qdrant takes arbitrary JSON. Chroma metadata values must be scalars, and
/// Pinecone metadata allows scalars and lists of strings; anything else is
/// stored as its JSON text. Nulls are dropped for both.
#[must_use]
pub fn translate_payload(destination: Backend, payload: Payload) -> Payload {
    match destination {
        Backend::Qdrant => payload,
        Backend::ChromaDB => payload
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                Value::Array(_) | Value::Object(_) => (k, Value::String(v.to_string())),
                scalar => (k, scalar),
            })
            .collect(),
        Backend::Pinecone => payload
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                Value::Array(ref items) if items.iter().all(Value::is_string) => (k, v),
                Value::Array(_) | Value::Object(_) => (k, Value::String(v.to_string())),
                scalar => (k, scalar),
            })
            .collect(),
    }
}

/// Document text for backends with a distinguished text field.
///
/// Returns an empty string when the payload has no textual document.
#[must_use]
pub fn document_for(payload: &Payload) -> String {
    match payload.get(DOCUMENT_FIELD) {
        Some(Value::String(text)) => text.clone(),
        _ => String::new(),
    }
}

/// Applies payload field renames and destination reshaping to items.
#[derive(Debug, Clone)]
pub struct Translator {
    destination: Backend,
    field_mappings: HashMap<String, String>,
}

impl Translator {
    /// Creates a translator for `destination` with `source_field -> dest_field` renames.
    #[must_use]
    pub fn new(destination: Backend, field_mappings: HashMap<String, String>) -> Self {
        Self {
            destination,
            field_mappings,
        }
    }

    /// Translates one item. The id and vector pass through untouched.
    #[must_use]
    pub fn translate_item(&self, item: MigrationItem) -> MigrationItem {
        let payload = self.rename_fields(item.payload);
        MigrationItem {
            id: item.id,
            vector: item.vector,
            payload: translate_payload(self.destination, payload),
        }
    }

    /// Translates a batch of items.
    #[must_use]
    pub fn translate_batch(&self, items: Vec<MigrationItem>) -> Vec<MigrationItem> {
        items
            .into_iter()
            .map(|item| self.translate_item(item))
            .collect()
    }

    fn rename_fields(&self, payload: Payload) -> Payload {
        if self.field_mappings.is_empty() {
            return payload;
        }

        let mut renamed = Payload::with_capacity(payload.len());
        let mut mapped = Vec::new();
        for (key, value) in payload {
            match self.field_mappings.get(&key) {
                Some(target) => mapped.push((target.clone(), value)),
                None => {
                    renamed.insert(key, value);
                }
            }
        }
        // Renamed fields win over an existing field of the same name.
        renamed.extend(mapped);
        renamed
    }
}

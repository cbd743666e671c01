//! Configuration types for vecmigrate.
//!
//! A configuration file describes one migration: a source endpoint, a
//! destination endpoint and the options that drive the batch loop.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::connectors::CollectionScope;
use crate::error::{Error, Result};
use crate::schema::Backend;

/// Ceiling applied to any requested batch size.
pub const MAX_BATCH_SIZE: usize = 500;

/// Pinecone control plane.
pub const PINECONE_CONTROLLER_URL: &str = "https://api.pinecone.io";

/// Chroma Cloud API.
pub const CHROMA_CLOUD_URL: &str = "https://api.trychroma.com";

/// Main migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source backend.
    pub source: EndpointConfig,
    /// Destination backend.
    pub destination: EndpointConfig,
    /// Migration options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Backend endpoint configuration, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EndpointConfig {
    /// Pinecone index.
    #[serde(rename = "pinecone")]
    Pinecone(PineconeConfig),
    /// Qdrant collection.
    #[serde(rename = "qdrant")]
    Qdrant(QdrantConfig),
    /// `ChromaDB` collection.
    #[serde(rename = "chromadb", alias = "chroma")]
    ChromaDB(ChromaDBConfig),
}

/// Pinecone configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    /// Pinecone API key.
    pub api_key: String,
    /// Index name.
    pub index: String,
    /// Optional namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Data-plane host of the index. Resolved from the control plane when absent.
    #[serde(default)]
    pub host: Option<String>,
    /// Control-plane URL.
    #[serde(default = "default_pinecone_controller")]
    pub controller_url: String,
    /// Cloud for indexes created by a migration.
    #[serde(default = "default_pinecone_cloud")]
    pub cloud: String,
    /// Region for indexes created by a migration.
    #[serde(default = "default_pinecone_region")]
    pub region: String,
}

/// Qdrant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// Qdrant server URL.
    pub url: String,
    /// Collection name.
    pub collection: String,
    /// Optional API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Named vector to read/write (unnamed vector when absent).
    #[serde(default)]
    pub vector_name: Option<String>,
}

/// `ChromaDB` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaDBConfig {
    /// `ChromaDB` server URL.
    #[serde(default = "default_chroma_url")]
    pub url: String,
    /// Collection name.
    pub collection: String,
    /// Optional API key (Chroma Cloud token).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Tenant.
    #[serde(default = "default_chroma_tenant")]
    pub tenant: String,
    /// Database.
    #[serde(default = "default_chroma_database")]
    pub database: String,
}

/// Migration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Requested batch size for fetch and write, capped at [`MAX_BATCH_SIZE`].
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Timeout for every backend request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Dry run mode (read and translate, never write).
    #[serde(default)]
    pub dry_run: bool,
    /// Field mappings (`source_field` -> `dest_field`).
    #[serde(default)]
    pub field_mappings: HashMap<String, String>,
    /// Draw a progress bar.
    #[serde(default = "default_true")]
    pub progress: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            dry_run: false,
            field_mappings: HashMap::new(),
            progress: true,
        }
    }
}

impl MigrationOptions {
    /// Batch size actually used: `min(batch_size, 500)`.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.min(MAX_BATCH_SIZE)
    }

    /// Request timeout for backend clients.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_pinecone_controller() -> String {
    PINECONE_CONTROLLER_URL.to_string()
}

fn default_pinecone_cloud() -> String {
    "aws".to_string()
}

fn default_pinecone_region() -> String {
    "us-east-1".to_string()
}

fn default_chroma_url() -> String {
    CHROMA_CLOUD_URL.to_string()
}

fn default_chroma_tenant() -> String {
    "default_tenant".to_string()
}

fn default_chroma_database() -> String {
    "default_database".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    crate::connectors::common::DEFAULT_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

impl EndpointConfig {
    /// Backend of this endpoint.
    #[must_use]
    pub fn backend(&self) -> Backend {
        match self {
            Self::Pinecone(_) => Backend::Pinecone,
            Self::Qdrant(_) => Backend::Qdrant,
            Self::ChromaDB(_) => Backend::ChromaDB,
        }
    }

    /// Collection and namespace addressed by this endpoint.
    #[must_use]
    pub fn scope(&self) -> CollectionScope {
        match self {
            Self::Pinecone(cfg) => {
                CollectionScope::new(&cfg.index).with_namespace(cfg.namespace.clone())
            }
            Self::Qdrant(cfg) => CollectionScope::new(&cfg.collection),
            Self::ChromaDB(cfg) => CollectionScope::new(&cfg.collection),
        }
    }

    /// Validates credentials and endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required value is missing or malformed.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Pinecone(cfg) => {
                require("pinecone api_key", &cfg.api_key)?;
                require("pinecone index", &cfg.index)?;
                crate::connectors::common::validate_url(&cfg.controller_url)?;
            }
            Self::Qdrant(cfg) => {
                require("qdrant collection", &cfg.collection)?;
                crate::connectors::common::validate_url(&cfg.url)?;
            }
            Self::ChromaDB(cfg) => {
                require("chromadb collection", &cfg.collection)?;
                require("chromadb tenant", &cfg.tenant)?;
                require("chromadb database", &cfg.database)?;
                crate::connectors::common::validate_url(&cfg.url)?;
            }
        }
        Ok(())
    }

    fn resolve_env(&mut self) -> Result<()> {
        match self {
            Self::Pinecone(cfg) => cfg.api_key = expand_env(&cfg.api_key)?,
            Self::Qdrant(cfg) => {
                if let Some(key) = &cfg.api_key {
                    cfg.api_key = Some(expand_env(key)?);
                }
            }
            Self::ChromaDB(cfg) => {
                if let Some(key) = &cfg.api_key {
                    cfg.api_key = Some(expand_env(key)?);
                }
            }
        }
        Ok(())
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", name)));
    }
    Ok(())
}

/// Resolves a `${VAR}` value from the environment. Other values pass through.
///
/// # Errors
///
/// Returns [`Error::Config`] when the referenced variable is not set.
pub fn expand_env(value: &str) -> Result<String> {
    let trimmed = value.trim();
    match trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(var) => std::env::var(var).map_err(|_| {
            Error::Config(format!("Environment variable '{}' is not set", var))
        }),
        None => Ok(value.to_string()),
    }
}

impl MigrationConfig {
    /// Load configuration from a YAML file, resolving `${VAR}` API keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, resolving `${VAR}` API keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or a variable is unset.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.source.resolve_env()?;
        config.destination.resolve_env()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.options.batch_size == 0 {
            return Err(Error::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.options.timeout_secs == 0 {
            return Err(Error::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        self.source.validate()?;
        self.destination.validate()?;
        Ok(())
    }
}

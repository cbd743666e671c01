// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # Vector Collection Migration
//!
//! `vecmigrate` is a CLI tool and library for copying a vector collection
//! (identifiers, embeddings and metadata) from one vector database into
//! another.
//!
//! ## Supported Backends
//!
//! | Backend | Source | Destination | Notes |
//! |---------|--------|-------------|-------|
//! | Pinecone | ✅ | ✅ | Serverless indexes, namespaces |
//! | Qdrant | ✅ | ✅ | Optional named vector |
//! | `ChromaDB` | ✅ | ✅ | v2 REST API, documents kept |
//!
//! ## Quick Start
//!
//! ```bash
//! vecmigrate run --config migration.yaml
//!
//! # Dry run (read and translate only)
//! vecmigrate run --config migration.yaml --dry-run
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   type: pinecone
//!   api_key: ${PINECONE_API_KEY}
//!   index: documents
//!
//! destination:
//!   type: qdrant
//!   url: http://localhost:6333
//!   collection: documents
//!
//! options:
//!   batch_size: 100
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connectors;
pub mod error;
pub mod pipeline;
pub mod schema;

pub use config::{EndpointConfig, MigrationConfig, MigrationOptions};
pub use connectors::{
    CollectionDescriptor, CollectionScope, DestinationWriter, MigrationItem, SourceReader,
};
pub use error::{Error, Result};
pub use pipeline::{MigrationResult, MigrationStats, Pipeline};
pub use schema::{translate_metric, Backend, DistanceMetric, Translator};

//! Error types for vecmigrate.
//!
//! Every failure is fatal to the migration that raised it. The pipeline
//! converts errors into a [`crate::pipeline::MigrationResult::Error`] at the
//! top, so only the `Display` text ever leaves the library.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating a collection.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration, credentials or endpoint.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source reports a distance metric outside the supported set.
    #[error("Unsupported {backend} metric: {metric}")]
    UnsupportedMetric {
        /// Backend that reported the metric.
        backend: String,
        /// The offending metric name, as reported.
        metric: String,
    },

    /// The source collection has no identifiers.
    #[error("No data found in {0}")]
    EmptySource(String),

    /// Transport failure talking to the source.
    #[error("Source connection error: {0}")]
    SourceConnection(String),

    /// Transport failure talking to the destination.
    #[error("Destination connection error: {0}")]
    DestinationConnection(String),

    /// Rejected credentials on either side.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limited by a backend (suggested wait in seconds).
    #[error("Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// A source response could not be interpreted.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A destination write was rejected.
    #[error("Loading error: {0}")]
    Loading(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Builds an [`Error::UnsupportedMetric`].
    pub fn unsupported_metric(backend: impl Into<String>, metric: impl Into<String>) -> Self {
        Self::UnsupportedMetric {
            backend: backend.into(),
            metric: metric.into(),
        }
    }
}

//! Migration pipeline orchestration.
//!
//! A migration runs Discovering, then Fetching/Writing one batch at a time,
//! then Verifying. Every fatal error ends the run; [`Pipeline::execute`] turns
//! the outcome into a [`MigrationResult`].

use futures::TryStreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

use crate::config::{MigrationConfig, MigrationOptions};
use crate::connectors::{
    create_destination, create_source, id_pages, CollectionDescriptor, CollectionScope,
    DestinationWriter, MigrationItem, SourceReader,
};
use crate::error::{Error, Result};
use crate::schema::{translate_metric, DistanceMetric, Translator};

/// Migration statistics.
#[derive(Debug, Default, Clone)]
pub struct MigrationStats {
    /// Items returned by the source.
    pub fetched: u64,
    /// Items written to the destination (or that would be, in a dry run).
    pub migrated: u64,
    /// Listed ids the source omitted on fetch.
    pub skipped_missing: u64,
    /// Items dropped because their length differs from the collection dimension.
    pub skipped_dimension: u64,
    /// Batches processed.
    pub batches: u64,
    /// Destination count after the last batch.
    pub collection_count: u64,
    /// Destination collection used.
    pub collection: Option<CollectionDescriptor>,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationStats {
    /// Calculate throughput (items per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.migrated as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Outcome of one migration, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MigrationResult {
    /// All batches were written and the destination verified.
    Success {
        /// Items written to the destination.
        migrated_vectors: u64,
        /// Item count the destination reports afterwards.
        collection_count: u64,
        /// Dimension of the destination collection.
        vector_dimension: usize,
        /// Canonical name of the destination metric.
        distance_metric: String,
    },
    /// The migration failed; nothing about partial progress is reported.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl MigrationResult {
    /// Returns `true` for [`MigrationResult::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<&MigrationStats> for MigrationResult {
    fn from(stats: &MigrationStats) -> Self {
        match &stats.collection {
            Some(collection) => Self::Success {
                migrated_vectors: stats.migrated,
                collection_count: stats.collection_count,
                vector_dimension: collection.dimension,
                distance_metric: collection.metric.as_str().to_string(),
            },
            None => Self::Error {
                message: "Migration finished without a destination collection".to_string(),
            },
        }
    }
}

/// Migration pipeline.
pub struct Pipeline {
    source: Box<dyn SourceReader>,
    destination: Box<dyn DestinationWriter>,
    source_scope: CollectionScope,
    destination_scope: CollectionScope,
    options: MigrationOptions,
    translator: Translator,
}

impl Pipeline {
    /// Create a new migration pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.options.timeout();
        let source = create_source(&config.source, timeout)?;
        let destination = create_destination(&config.destination, timeout)?;

        Ok(Self::with_backends(
            source,
            destination,
            config.source.scope(),
            config.destination.scope(),
            config.options,
        ))
    }

    /// Builds a pipeline around already constructed backends.
    #[must_use]
    pub fn with_backends(
        source: Box<dyn SourceReader>,
        destination: Box<dyn DestinationWriter>,
        source_scope: CollectionScope,
        destination_scope: CollectionScope,
        options: MigrationOptions,
    ) -> Self {
        let translator = Translator::new(destination.backend(), options.field_mappings.clone());
        Self {
            source,
            destination,
            source_scope,
            destination_scope,
            options,
            translator,
        }
    }

    /// Runs the migration and reports the outcome, never failing itself.
    pub async fn execute(&self) -> MigrationResult {
        match self.run().await {
            Ok(stats) => MigrationResult::from(&stats),
            Err(e) => {
                error!("Migration failed: {}", e);
                MigrationResult::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Run the migration pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; batches already written stay written.
    pub async fn run(&self) -> Result<MigrationStats> {
        let start = std::time::Instant::now();
        let mut stats = MigrationStats::default();
        let source_backend = self.source.backend();
        let batch_size = self.options.effective_batch_size();
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".to_string()));
        }

        info!(
            "Discovering {} collection '{}'",
            source_backend, self.source_scope.collection
        );
        let description = self.source.describe(&self.source_scope).await?;
        let source_metric = description.metric.as_deref().ok_or_else(|| {
            Error::Extraction(format!(
                "{} did not report a distance metric for '{}'",
                source_backend, self.source_scope.collection
            ))
        })?;
        let metric = translate_metric(source_backend, source_metric)?;

        let ids = self.list_all_ids().await?;
        if ids.is_empty() {
            return Err(Error::EmptySource(format!(
                "{} collection '{}'",
                source_backend, self.source_scope.collection
            )));
        }

        let chunks: Vec<&[String]> = ids.chunks(batch_size).collect();

        // First batch is fetched early when only the data can tell the dimension.
        let mut prefetched = None;
        let dimension = match description.dimension {
            Some(d) => d,
            None => {
                let first = self.source.fetch(&self.source_scope, chunks[0]).await?;
                let d = chunks[0]
                    .iter()
                    .filter_map(|id| first.get(id))
                    .map(|item| item.vector.len())
                    .find(|&len| len > 0)
                    .ok_or_else(|| {
                        Error::Extraction(format!(
                            "Cannot determine vector dimension of '{}'",
                            self.source_scope.collection
                        ))
                    })?;
                prefetched = Some(first);
                d
            }
        };

        info!(
            "Source: {} ids, {}D, {} ({})",
            ids.len(),
            dimension,
            source_metric,
            metric
        );

        let collection = self.prepare_destination(dimension, metric).await?;

        info!(
            "Transferring to {} collection '{}' in batches of {}",
            self.destination.backend(),
            collection.name,
            batch_size
        );
        let progress = create_progress_bar(ids.len() as u64, self.options.progress);

        for chunk in &chunks {
            let mut fetched = match prefetched.take() {
                Some(items) => items,
                None => self.source.fetch(&self.source_scope, chunk).await?,
            };
            let items = self.order_batch(chunk, &mut fetched, &mut stats);
            let survivors = self.filter_dimension(items, collection.dimension, &mut stats);

            let written = if survivors.is_empty() {
                0
            } else if self.options.dry_run {
                survivors.len()
            } else {
                self.destination
                    .write_batch(&self.destination_scope, &survivors)
                    .await?
            };

            stats.migrated += written as u64;
            stats.batches += 1;
            debug!(
                "Batch {}: {} requested, {} written",
                stats.batches,
                chunk.len(),
                written
            );
            progress.inc(chunk.len() as u64);
        }

        progress.finish_with_message("Migration complete");

        info!("Verifying destination count");
        stats.collection_count = self.verify(&collection).await?;
        stats.collection = Some(collection);
        stats.duration_secs = start.elapsed().as_secs_f64();

        info!(
            "Migration complete: {} fetched, {} migrated, {} missing, {} wrong dimension in {:.2}s ({:.0} items/sec)",
            stats.fetched,
            stats.migrated,
            stats.skipped_missing,
            stats.skipped_dimension,
            stats.duration_secs,
            stats.throughput()
        );

        Ok(stats)
    }

    async fn list_all_ids(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut pages = id_pages(self.source.as_ref(), &self.source_scope);
        while let Some(page) = pages.try_next().await? {
            ids.extend(page.into_iter().filter(|id| seen.insert(id.clone())));
        }
        Ok(ids)
    }

    async fn prepare_destination(
        &self,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionDescriptor> {
        if !self.options.dry_run {
            return self
                .destination
                .ensure_collection(&self.destination_scope, dimension, metric)
                .await;
        }

        info!("Dry run mode - not writing to destination");
        let existing = self
            .destination
            .get_collection(&self.destination_scope)
            .await?;
        Ok(existing.unwrap_or_else(|| CollectionDescriptor {
            name: self.destination_scope.collection.clone(),
            dimension,
            metric,
        }))
    }

    /// Looks up each requested id in the fetched map, in request order.
    fn order_batch(
        &self,
        chunk: &[String],
        fetched: &mut HashMap<String, MigrationItem>,
        stats: &mut MigrationStats,
    ) -> Vec<MigrationItem> {
        let mut items = Vec::with_capacity(chunk.len());
        for id in chunk {
            match fetched.remove(id) {
                Some(item) => items.push(item),
                None => {
                    stats.skipped_missing += 1;
                    warn!("Source omitted id '{}'", id);
                }
            }
        }
        stats.fetched += items.len() as u64;
        self.translator.translate_batch(items)
    }

    fn filter_dimension(
        &self,
        items: Vec<MigrationItem>,
        dimension: usize,
        stats: &mut MigrationStats,
    ) -> Vec<MigrationItem> {
        items
            .into_iter()
            .filter(|item| {
                let keep = item.vector.len() == dimension;
                if !keep {
                    stats.skipped_dimension += 1;
                    warn!(
                        "Skipping '{}': dimension {} != {}",
                        item.id,
                        item.vector.len(),
                        dimension
                    );
                }
                keep
            })
            .collect()
    }

    async fn verify(&self, collection: &CollectionDescriptor) -> Result<u64> {
        if self.options.dry_run
            && self
                .destination
                .get_collection(&self.destination_scope)
                .await?
                .is_none()
        {
            debug!("Dry run: '{}' does not exist yet", collection.name);
            return Ok(0);
        }
        self.destination.count(&self.destination_scope).await
    }
}

fn create_progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    pb
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

//! Export pipelines: discover record ids from a parent query, then query,
//! index and download each batch.

use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{create_progress_bar, TransferStats};
use crate::batch::{batch_count, batches};
use crate::config::MigrationSettings;
use crate::error::Result;
use crate::manifest::ManifestWriter;
use crate::query::{QueryDriver, QueryTemplate, IDS_PLACEHOLDER};
use crate::store::{RecordStore, SourceRecord};
use crate::transfer::{download_payload, run_bounded, DownloadJob, DownloadOutcome};

/// Distinct non-empty values of `field`, in first-seen order.
fn distinct_values(records: &[SourceRecord], field: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| record.get(field).and_then(Value::as_str))
        .filter(|value| !value.is_empty() && seen.insert(value.to_string()))
        .map(String::from)
        .collect()
}

/// Shared per-batch loop of both exports.
struct BatchExport<'a> {
    store: Arc<dyn RecordStore>,
    template: QueryTemplate,
    manifest: PathBuf,
    payload_dir: PathBuf,
    url_field: &'a str,
    batch_size: usize,
    workers: usize,
}

impl BatchExport<'_> {
    async fn run(&self, ids: Vec<String>, stats: &mut TransferStats) -> Result<()> {
        let driver = QueryDriver::new(Arc::clone(&self.store));
        let mut writer = ManifestWriter::create(&self.manifest)?;
        let total = batch_count(ids.len(), self.batch_size);
        let progress = create_progress_bar(ids.len() as u64);

        for batch in batches(ids, self.batch_size) {
            info!("Processing batch {}/{}", batch.number, total);
            let batch_len = batch.len() as u64;
            let records = driver.fetch_batch(&self.template, &batch).await?.into_records();
            stats.batches += 1;
            stats.queried += records.len() as u64;

            writer.append_batch(&records)?;
            debug!("Batch {} matched {} records", batch.number, records.len());

            let jobs = records
                .iter()
                .map(|record| DownloadJob::from_record(record, self.url_field))
                .collect::<Result<Vec<_>>>()?;
            let store = &self.store;
            let payload_dir = &self.payload_dir;
            run_bounded(
                jobs,
                self.workers,
                |job| download_payload(Arc::clone(store), job, payload_dir.clone()),
                |outcome| {
                    match outcome {
                        DownloadOutcome::Saved { id, path, bytes } => {
                            debug!("Saved {} ({} bytes) to {}", id, bytes, path.display());
                            stats.transferred += 1;
                        }
                        DownloadOutcome::Failed { id, error } => {
                            warn!("Download of {} failed: {}", id, error);
                            stats.failed += 1;
                        }
                    }
                    Ok(())
                },
            )
            .await?;

            debug!("All files in batch {} downloaded", batch.number);
            progress.inc(batch_len);
        }

        progress.finish_with_message("Export complete");
        Ok(())
    }
}

fn field_list(fields: &[String]) -> String {
    fields.join(", ")
}

fn finish(mut stats: TransferStats, start: std::time::Instant, what: &str) -> TransferStats {
    stats.duration_secs = start.elapsed().as_secs_f64();
    info!(
        "{} export complete: {} queried, {} downloaded, {} failed in {:.2}s ({:.0} files/sec)",
        what,
        stats.queried,
        stats.transferred,
        stats.failed,
        stats.duration_secs,
        stats.throughput()
    );
    stats
}

/// Exports Attachment records and payloads attached to a parent query.
pub struct AttachmentExport {
    store: Arc<dyn RecordStore>,
    settings: MigrationSettings,
    output: PathBuf,
}

impl AttachmentExport {
    /// Creates the export writing under `output`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        settings: MigrationSettings,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            settings,
            output: output.into(),
        }
    }

    /// Manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.output.join(&self.settings.attachment.output_file)
    }

    /// Payload directory.
    #[must_use]
    pub fn payload_dir(&self) -> PathBuf {
        self.output.join(&self.settings.attachment.output_dir)
    }

    /// Runs the export for the parents selected by `parent_query`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or a local write fails. Individual
    /// download failures are counted, not returned.
    pub async fn run(&self, parent_query: &str) -> Result<TransferStats> {
        let start = std::time::Instant::now();
        let mut stats = TransferStats::default();
        info!("Exporting Attachments from {}", self.store.store_type());

        let driver = QueryDriver::new(Arc::clone(&self.store));
        let discovery = format!("SELECT Id FROM Attachment WHERE ParentId IN ({parent_query})");
        let found = driver.query_all(&discovery).await?.into_records();
        let ids = distinct_values(&found, "Id");
        info!("Found {} total files", ids.len());
        if ids.is_empty() {
            return Ok(finish(stats, start, "Attachment"));
        }

        std::fs::create_dir_all(&self.output)?;
        let options = &self.settings.options;
        let export = BatchExport {
            store: Arc::clone(&self.store),
            template: QueryTemplate::new(format!(
                "SELECT {} FROM Attachment WHERE Id IN ({IDS_PLACEHOLDER})",
                field_list(&self.settings.attachment.query_fields)
            ))?,
            manifest: self.manifest_path(),
            payload_dir: self.payload_dir(),
            url_field: "Body",
            batch_size: options.batch_size,
            workers: options.workers,
        };
        export.run(ids, &mut stats).await?;

        Ok(finish(stats, start, "Attachment"))
    }
}

/// Exports the latest ContentVersions of documents linked to a parent query.
pub struct ContentVersionExport {
    store: Arc<dyn RecordStore>,
    settings: MigrationSettings,
    output: PathBuf,
    include_notes: bool,
}

impl ContentVersionExport {
    /// Creates the export writing under `output`. Notes are excluded.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        settings: MigrationSettings,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            settings,
            output: output.into(),
            include_notes: false,
        }
    }

    /// Also export notes (`snote` files).
    #[must_use]
    pub fn include_notes(mut self, include: bool) -> Self {
        self.include_notes = include;
        self
    }

    /// ContentDocumentLink manifest path.
    #[must_use]
    pub fn link_manifest_path(&self) -> PathBuf {
        self.output
            .join(&self.settings.content_version.link_output_file)
    }

    /// ContentVersion manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.output.join(&self.settings.content_version.output_file)
    }

    /// Payload directory.
    #[must_use]
    pub fn payload_dir(&self) -> PathBuf {
        self.output.join(&self.settings.content_version.output_dir)
    }

    /// Batch query template for ContentVersions.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured field introduces another placeholder.
    pub fn version_template(&self) -> Result<QueryTemplate> {
        let mut soql = format!(
            "SELECT {} FROM ContentVersion WHERE IsLatest = true",
            field_list(&self.settings.content_version.query_fields)
        );
        if !self.include_notes {
            soql.push_str(" AND FileExtension != 'snote'");
        }
        soql.push_str(&format!(" AND ContentDocumentId IN ({IDS_PLACEHOLDER})"));
        QueryTemplate::new(soql)
    }

    /// Runs the export for the parents selected by `parent_query`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails or a local write fails. Individual
    /// download failures are counted, not returned.
    pub async fn run(&self, parent_query: &str) -> Result<TransferStats> {
        let start = std::time::Instant::now();
        let mut stats = TransferStats::default();
        info!("Exporting ContentVersions from {}", self.store.store_type());

        let driver = QueryDriver::new(Arc::clone(&self.store));
        let discovery = format!(
            "SELECT {} FROM ContentDocumentLink WHERE LinkedEntityId IN ({parent_query})",
            field_list(&self.settings.content_version.link_query_fields)
        );
        let links = driver.query_all(&discovery).await?.into_records();
        let document_ids = distinct_values(&links, "ContentDocumentId");
        info!("Found {} total files", document_ids.len());
        if links.is_empty() {
            return Ok(finish(stats, start, "ContentVersion"));
        }

        std::fs::create_dir_all(&self.output)?;
        write_links(&self.link_manifest_path(), &links)?;

        let options = &self.settings.options;
        let export = BatchExport {
            store: Arc::clone(&self.store),
            template: self.version_template()?,
            manifest: self.manifest_path(),
            payload_dir: self.payload_dir(),
            url_field: "VersionData",
            batch_size: options.batch_size,
            workers: options.workers,
        };
        export.run(document_ids, &mut stats).await?;

        Ok(finish(stats, start, "ContentVersion"))
    }
}

fn write_links(path: &Path, links: &[SourceRecord]) -> Result<()> {
    let mut writer = ManifestWriter::create(path)?;
    writer.append_batch(links)?;
    debug!("Wrote {} links to {}", links.len(), path.display());
    Ok(())
}

//! Import pipelines: read a manifest, rebuild each record's body for the
//! target store and upload its payload.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{create_progress_bar, TransferStats};
use crate::batch::{batch_count, batches};
use crate::config::RunOptions;
use crate::error::{Error, Result};
use crate::manifest::ManifestReader;
use crate::remap::{content_version_body, AttachmentRemapper, RemapOutcome};
use crate::report::ResultReporter;
use crate::store::{RecordStore, SourceRecord};
use crate::transfer::{payload_path, run_bounded, upload_payload, UploadJob, WriteMode};

fn row_id(row: &SourceRecord) -> Result<String> {
    row.get("Id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .ok_or_else(|| Error::Manifest("manifest row has no Id".to_string()))
}

/// Shared per-batch loop of both imports.
struct BatchImport<'a> {
    store: &'a Arc<dyn RecordStore>,
    options: &'a RunOptions,
}

impl BatchImport<'_> {
    async fn run<F>(
        &self,
        manifest: &Path,
        mut prepare: F,
        reporter: &mut ResultReporter,
    ) -> Result<TransferStats>
    where
        F: FnMut(SourceRecord) -> Result<Option<UploadJob>>,
    {
        let start = std::time::Instant::now();
        let mut stats = TransferStats::default();

        let row_count = ManifestReader::open(manifest)?.into_records().count();
        let total = batch_count(row_count, self.options.batch_size);
        let progress = create_progress_bar(row_count as u64);
        info!("Importing {} records from {}", row_count, manifest.display());

        let rows = ManifestReader::open(manifest)?.into_records();
        for batch in batches(rows, self.options.batch_size) {
            info!("Processing batch {}/{}", batch.number, total);
            let batch_len = batch.len() as u64;
            stats.batches += 1;
            stats.queried += batch_len;

            let mut jobs = Vec::with_capacity(batch.len());
            for row in batch.items {
                match prepare(row?)? {
                    Some(job) => jobs.push(job),
                    None => stats.skipped += 1,
                }
            }
            if let Some(missing) = jobs.iter().find(|job| !job.payload_path.is_file()) {
                return Err(Error::MissingPayload(missing.payload_path.clone()));
            }

            run_bounded(
                jobs,
                self.options.workers,
                |job| upload_payload(Arc::clone(self.store), job),
                |outcome| {
                    if outcome.is_success() {
                        stats.transferred += 1;
                    } else {
                        stats.failed += 1;
                    }
                    reporter.report(&outcome)
                },
            )
            .await?;

            debug!("Batch {} uploaded", batch.number);
            progress.inc(batch_len);
        }

        progress.finish_with_message("Import complete");
        stats.duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Import complete: {} read, {} uploaded, {} failed, {} skipped in {:.2}s ({:.0} records/sec)",
            stats.queried,
            stats.transferred,
            stats.failed,
            stats.skipped,
            stats.duration_secs,
            stats.throughput()
        );
        Ok(stats)
    }
}

/// Re-creates Attachments under remapped parents and owners.
pub struct AttachmentImport {
    store: Arc<dyn RecordStore>,
    remapper: AttachmentRemapper,
    options: RunOptions,
}

impl AttachmentImport {
    /// Creates the import.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, remapper: AttachmentRemapper, options: RunOptions) -> Self {
        Self {
            store,
            remapper,
            options,
        }
    }

    /// Uploads every row of `manifest`, reading payloads from `payload_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest or a payload file cannot be read.
    /// Store rejections are reported per record.
    pub async fn run(
        &self,
        manifest: &Path,
        payload_dir: &Path,
        reporter: &mut ResultReporter,
    ) -> Result<TransferStats> {
        let importer = BatchImport {
            store: &self.store,
            options: &self.options,
        };
        importer
            .run(
                manifest,
                |row| {
                    let id = row_id(&row)?;
                    match self.remapper.build(&row)? {
                        RemapOutcome::Skip { .. } => Ok(None),
                        RemapOutcome::Upload(body) => Ok(Some(UploadJob {
                            payload_path: payload_path(payload_dir, &id)?,
                            record_id: id,
                            object_type: "Attachment".to_string(),
                            payload_field: "Body".to_string(),
                            body,
                            mode: WriteMode::Create,
                        })),
                    }
                },
                reporter,
            )
            .await
    }
}

/// Upserts ContentVersions keyed by their original id.
pub struct ContentVersionImport {
    store: Arc<dyn RecordStore>,
    upsert_key: String,
    options: RunOptions,
}

impl ContentVersionImport {
    /// Creates the import; `upsert_key` is the external id field that holds
    /// the original ContentVersion id in the target store.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, upsert_key: impl Into<String>, options: RunOptions) -> Self {
        Self {
            store,
            upsert_key: upsert_key.into(),
            options,
        }
    }

    /// Uploads every row of `manifest`, reading payloads from `payload_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest or a payload file cannot be read.
    /// Store rejections are reported per record.
    pub async fn run(
        &self,
        manifest: &Path,
        payload_dir: &Path,
        reporter: &mut ResultReporter,
    ) -> Result<TransferStats> {
        let importer = BatchImport {
            store: &self.store,
            options: &self.options,
        };
        importer
            .run(
                manifest,
                |row| {
                    let id = row_id(&row)?;
                    let payload_path = payload_path(payload_dir, &id)?;
                    Ok(Some(UploadJob {
                        body: content_version_body(&row)?,
                        record_id: id,
                        object_type: "ContentVersion".to_string(),
                        payload_field: "VersionData".to_string(),
                        payload_path,
                        mode: WriteMode::Upsert {
                            external_id_field: self.upsert_key.clone(),
                        },
                    }))
                },
                reporter,
            )
            .await
    }
}

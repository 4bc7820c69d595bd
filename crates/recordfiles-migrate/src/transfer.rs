//! Parallel payload transfer.
//!
//! Each record's payload moves in its own task. A pool is scoped to one
//! batch: at most `workers` tasks run at once and the pool drains before the
//! batch is done. Remote failures are captured per record; local IO
//! failures stop the pool.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::{RecordStore, SourceRecord};

/// Default number of concurrent transfers per batch.
pub const DEFAULT_WORKERS: usize = 4;

/// Runs `task` over `items` with at most `workers` in flight, handing each
/// result to `sink` as it completes.
///
/// Completion order is unspecified. The first error from a task or from
/// `sink` is returned and the tasks still running are aborted.
///
/// # Errors
///
/// Returns the first task/sink error, or [`Error::Worker`] if a task panics.
pub async fn run_bounded<T, R, F, Fut, S>(
    items: Vec<T>,
    workers: usize,
    mut task: F,
    mut sink: S,
) -> Result<()>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: Send + 'static,
    S: FnMut(R) -> Result<()>,
{
    let mut pending = items.into_iter();
    let mut pool = JoinSet::new();

    for item in pending.by_ref().take(workers.max(1)) {
        pool.spawn(task(item));
    }

    while let Some(joined) = pool.join_next().await {
        let result = joined.map_err(|e| Error::Worker(e.to_string()))??;
        sink(result)?;
        if let Some(item) = pending.next() {
            pool.spawn(task(item));
        }
    }

    Ok(())
}

fn record_id(record: &SourceRecord) -> Result<String> {
    record
        .get("Id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .ok_or_else(|| Error::Query("record without an Id".to_string()))
}

/// Location of a record's payload inside the flat payload directory.
///
/// # Errors
///
/// Returns [`Error::Manifest`] unless `id` is a single plain file name.
pub fn payload_path(dir: &Path, id: &str) -> Result<PathBuf> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.join(id)),
        _ => Err(Error::Manifest(format!(
            "record Id '{id}' is not a plain file name"
        ))),
    }
}

/// One payload to fetch.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Record identifier; also the destination file name.
    pub record_id: String,
    /// Store-relative URL of the payload.
    pub url: Option<String>,
}

impl DownloadJob {
    /// Builds a job from a queried record, reading the URL from `url_field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no `Id`.
    pub fn from_record(record: &SourceRecord, url_field: &str) -> Result<Self> {
        Ok(Self {
            record_id: record_id(record)?,
            url: record
                .get(url_field)
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(String::from),
        })
    }
}

/// Result of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Payload written to `path`.
    Saved {
        /// Record identifier.
        id: String,
        /// File written.
        path: PathBuf,
        /// Payload size.
        bytes: usize,
    },
    /// Payload could not be fetched.
    Failed {
        /// Record identifier.
        id: String,
        /// Reason.
        error: String,
    },
}

impl DownloadOutcome {
    /// Whether the payload was saved.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Fetches one payload and writes it to `output_dir/<Id>`.
///
/// The directory is created on first write. Remote failures and Ids that
/// are not plain file names become [`DownloadOutcome::Failed`].
///
/// # Errors
///
/// Returns an error only if the local write fails.
pub async fn download_payload(
    store: Arc<dyn RecordStore>,
    job: DownloadJob,
    output_dir: PathBuf,
) -> Result<DownloadOutcome> {
    let path = match payload_path(&output_dir, &job.record_id) {
        Ok(path) => path,
        Err(e) => {
            warn!("Skipping download of {}: {}", job.record_id, e);
            return Ok(DownloadOutcome::Failed {
                id: job.record_id,
                error: e.to_string(),
            });
        }
    };
    let Some(url) = job.url else {
        return Ok(DownloadOutcome::Failed {
            id: job.record_id,
            error: "record has no payload URL".to_string(),
        });
    };

    let bytes = match store.download(&url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Ok(DownloadOutcome::Failed {
                id: job.record_id,
                error: e.record_message(),
            })
        }
    };

    tokio::fs::create_dir_all(&output_dir).await?;
    tokio::fs::write(&path, &bytes).await?;

    Ok(DownloadOutcome::Saved {
        id: job.record_id,
        path,
        bytes: bytes.len(),
    })
}

/// How an upload is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Always create a new record.
    Create,
    /// Upsert keyed by the original record id stored in `external_id_field`.
    Upsert {
        /// External id field on the target object.
        external_id_field: String,
    },
}

/// One payload to push.
#[derive(Debug, Clone)]
pub struct UploadJob {
    /// Original record identifier (also the payload file name).
    pub record_id: String,
    /// Target object type.
    pub object_type: String,
    /// Body field that carries the encoded payload.
    pub payload_field: String,
    /// Local payload file.
    pub payload_path: PathBuf,
    /// Request body without the payload.
    pub body: SourceRecord,
    /// Create or upsert.
    pub mode: WriteMode,
}

/// Result of one upload, ready for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// Original record identifier.
    pub record_id: String,
    /// Body as sent, with the payload replaced by its file path.
    pub body: SourceRecord,
    /// Identifier returned by the store on success.
    pub new_id: Option<String>,
    /// Error message on failure.
    pub error: Option<String>,
}

impl UploadOutcome {
    /// Whether the store accepted the record.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Reads, encodes and submits one payload.
///
/// Store errors are captured in the outcome.
///
/// # Errors
///
/// Returns [`Error::MissingPayload`] or an IO error if the local file cannot
/// be read.
pub async fn upload_payload(store: Arc<dyn RecordStore>, job: UploadJob) -> Result<UploadOutcome> {
    let bytes = match tokio::fs::read(&job.payload_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::MissingPayload(job.payload_path));
        }
        Err(e) => return Err(e.into()),
    };

    let mut body = job.body;
    body.insert(job.payload_field.clone(), Value::String(STANDARD.encode(&bytes)));

    let result = match &job.mode {
        WriteMode::Create => store.create(&job.object_type, &body).await,
        WriteMode::Upsert { external_id_field } => {
            store
                .upsert(&job.object_type, external_id_field, &job.record_id, &body)
                .await
        }
    };

    body.insert(
        job.payload_field,
        Value::String(job.payload_path.display().to_string()),
    );

    match result {
        Ok(saved) => {
            debug!("Uploaded {} as {:?}", job.record_id, saved.id);
            Ok(UploadOutcome {
                record_id: job.record_id,
                body,
                new_id: saved.id,
                error: None,
            })
        }
        Err(e) => {
            warn!("Upload of {} failed: {}", job.record_id, e);
            Ok(UploadOutcome {
                record_id: job.record_id,
                body,
                new_id: None,
                error: Some(e.record_message()),
            })
        }
    }
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;

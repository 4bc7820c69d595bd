//! Remote record store capability.
//!
//! The pipelines talk to the store only through [`RecordStore`], so the REST
//! implementation can be swapped for [`MemoryStore`] in tests.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use memory::MemoryStore;
pub use rest::RestRecordStore;

/// Flat, insertion-ordered field map describing one record.
pub type SourceRecord = serde_json::Map<String, serde_json::Value>;

/// Default REST API version.
pub const DEFAULT_API_VERSION: &str = "v59.0";

/// Established session against a remote store.
///
/// Read-only once created and cheap to clone into every transfer worker.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Base URL of the instance (e.g. `https://acme.my.example.com`).
    pub instance_url: String,
    /// Bearer token sent with every request.
    pub access_token: String,
    /// REST API version segment (e.g. `v59.0`).
    pub api_version: String,
}

impl Session {
    /// Creates a session descriptor, trimming a trailing slash from the URL.
    pub fn new(
        instance_url: impl Into<String>,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        let instance_url: String = instance_url.into();
        Self {
            instance_url: instance_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            api_version: api_version.into(),
        }
    }

    /// Base URL for versioned data endpoints.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("{}/services/data/{}", self.instance_url, self.api_version)
    }

    /// Resolves a store-relative path (as found in `Body`/`VersionData`
    /// fields or `nextRecordsUrl`) against the instance URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an absolute URL outside the instance
    /// origin; the bearer token is only sent to the instance.
    pub fn resolve(&self, path: &str) -> Result<String> {
        if path.starts_with("http://") || path.starts_with("https://") {
            if same_origin(&self.instance_url, path) {
                Ok(path.to_string())
            } else {
                Err(Error::Config(format!(
                    "Refusing to send credentials to {path}: not on {}",
                    self.instance_url
                )))
            }
        } else if path.starts_with('/') {
            Ok(format!("{}{}", self.instance_url, path))
        } else {
            Ok(format!("{}/{}", self.instance_url, path))
        }
    }
}

fn same_origin(base: &str, url: &str) -> bool {
    match (Url::parse(base), Url::parse(url)) {
        (Ok(base), Ok(url)) => base.origin() == url.origin(),
        _ => false,
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("instance_url", &self.instance_url)
            .field("access_token", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// One page of a query response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    /// Total rows matching the query across all pages.
    pub total_size: u64,
    /// Whether this is the last page.
    #[serde(default = "default_done")]
    pub done: bool,
    /// Relative URL of the next page, if any.
    #[serde(default)]
    pub next_records_url: Option<String>,
    /// Records on this page.
    #[serde(default)]
    pub records: Vec<SourceRecord>,
}

fn default_done() -> bool {
    true
}

impl QueryPage {
    /// Cursor for the next page when the store says more are available.
    #[must_use]
    pub fn next_page(&self) -> Option<&str> {
        if self.done {
            None
        } else {
            self.next_records_url.as_deref()
        }
    }
}

/// Result of a create or upsert call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveResult {
    /// Id of the created/updated record, when the store returns one.
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the store accepted the record.
    #[serde(default)]
    pub success: bool,
    /// Whether an upsert created a new record.
    #[serde(default)]
    pub created: Option<bool>,
    /// Store error entries, if any.
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

/// Query, fetch and create capability of a remote record store.
///
/// Implementations must be shareable across transfer workers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short name used in logs.
    fn store_type(&self) -> &'static str;

    /// Runs a query and returns its first page.
    async fn query(&self, soql: &str) -> Result<QueryPage>;

    /// Fetches a follow-up page using the cursor from [`QueryPage::next_page`].
    async fn query_more(&self, next_records_url: &str) -> Result<QueryPage>;

    /// Creates a record of `object_type`.
    async fn create(&self, object_type: &str, body: &SourceRecord) -> Result<SaveResult>;

    /// Creates or updates a record of `object_type` keyed by an external id.
    async fn upsert(
        &self,
        object_type: &str,
        external_id_field: &str,
        external_id: &str,
        body: &SourceRecord,
    ) -> Result<SaveResult>;

    /// Downloads the binary behind a store-relative path.
    ///
    /// Non-2xx responses are returned as [`crate::Error::Transfer`].
    async fn download(&self, path: &str) -> Result<Vec<u8>>;
}

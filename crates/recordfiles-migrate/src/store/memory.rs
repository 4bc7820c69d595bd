//! In-memory record store.
//!
//! Serves canned query results and blobs and records every write. Queries
//! are matched by their exact text; unknown queries return zero rows.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{QueryPage, RecordStore, SaveResult, SourceRecord};
use crate::error::{Error, Result};

const PAGE_PREFIX: &str = "/memory/query/";

/// A write received by the store.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    /// Object type written to.
    pub object_type: String,
    /// External id `(field, value)` for upserts, `None` for creates.
    pub external_id: Option<(String, String)>,
    /// Request body as received.
    pub body: SourceRecord,
}

#[derive(Debug, Clone)]
struct Rejection {
    field: String,
    value: String,
    code: String,
    message: String,
}

#[derive(Default)]
struct State {
    results: HashMap<String, Vec<SourceRecord>>,
    blobs: HashMap<String, Vec<u8>>,
    rejections: Vec<Rejection>,
    queries: Vec<String>,
    writes: Vec<RecordedWrite>,
    next_id: u64,
}

/// Record store held entirely in memory.
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store returning up to 2000 rows per page.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(2000)
    }

    /// Creates an empty store that splits query results into pages.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Registers the rows returned for an exact query text.
    pub fn add_query_result(&self, soql: impl Into<String>, records: Vec<SourceRecord>) {
        self.lock().results.insert(soql.into(), records);
    }

    /// Registers a downloadable blob at a store-relative path.
    pub fn add_blob(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.lock().blobs.insert(path.into(), bytes.into());
    }

    /// Makes every write whose `field` equals `value` fail with a store error.
    pub fn reject_when(
        &self,
        field: impl Into<String>,
        value: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.lock().rejections.push(Rejection {
            field: field.into(),
            value: value.into(),
            code: code.into(),
            message: message.into(),
        });
    }

    /// Query texts received so far, in order (follow-up pages excluded).
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    /// Writes accepted so far, in arrival order.
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    fn page(&self, key: &str, offset: usize) -> QueryPage {
        let state = self.lock();
        let Some(rows) = state.results.get(key) else {
            return QueryPage::default();
        };
        let end = (offset + self.page_size).min(rows.len());
        let done = end >= rows.len();
        QueryPage {
            total_size: rows.len() as u64,
            done,
            next_records_url: (!done).then(|| format!("{PAGE_PREFIX}{end}/{key}")),
            records: rows[offset.min(end)..end].to_vec(),
        }
    }

    fn write(
        &self,
        object_type: &str,
        external_id: Option<(String, String)>,
        body: &SourceRecord,
    ) -> Result<SaveResult> {
        let mut state = self.lock();
        let rejected = state.rejections.iter().find(|r| {
            body.get(&r.field).and_then(|v| v.as_str()) == Some(r.value.as_str())
        });
        if let Some(rejection) = rejected {
            return Err(Error::Api {
                status: 400,
                code: Some(rejection.code.clone()),
                message: rejection.message.clone(),
            });
        }

        state.next_id += 1;
        let id = format!("MEM{:012}", state.next_id);
        let created = external_id.is_none();
        state.writes.push(RecordedWrite {
            object_type: object_type.to_string(),
            external_id,
            body: body.clone(),
        });
        Ok(SaveResult {
            id: Some(id),
            success: true,
            created: Some(created),
            errors: Vec::new(),
        })
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn store_type(&self) -> &'static str {
        "memory"
    }

    async fn query(&self, soql: &str) -> Result<QueryPage> {
        self.lock().queries.push(soql.to_string());
        Ok(self.page(soql, 0))
    }

    async fn query_more(&self, next_records_url: &str) -> Result<QueryPage> {
        let cursor = next_records_url
            .strip_prefix(PAGE_PREFIX)
            .ok_or_else(|| Error::Query(format!("Unknown page cursor: {next_records_url}")))?;
        let (offset, key) = cursor
            .split_once('/')
            .ok_or_else(|| Error::Query(format!("Malformed page cursor: {next_records_url}")))?;
        let offset: usize = offset
            .parse()
            .map_err(|_| Error::Query(format!("Malformed page cursor: {next_records_url}")))?;
        Ok(self.page(key, offset))
    }

    async fn create(&self, object_type: &str, body: &SourceRecord) -> Result<SaveResult> {
        self.write(object_type, None, body)
    }

    async fn upsert(
        &self,
        object_type: &str,
        external_id_field: &str,
        external_id: &str,
        body: &SourceRecord,
    ) -> Result<SaveResult> {
        self.write(
            object_type,
            Some((external_id_field.to_string(), external_id.to_string())),
            body,
        )
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        self.lock()
            .blobs
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Transfer(format!("Couldn't download {path}: HTTP 404")))
    }
}

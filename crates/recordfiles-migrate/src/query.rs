//! Query driver: batch query construction, pagination and normalization.

use std::sync::Arc;
use tracing::debug;

use crate::batch::IdentifierBatch;
use crate::error::{Error, Result};
use crate::store::{QueryPage, RecordStore, SourceRecord};

/// Placeholder substituted with a batch's quoted identifier list.
pub const IDS_PLACEHOLDER: &str = "{ids}";

/// Store bookkeeping key removed from every record.
const ATTRIBUTES_KEY: &str = "attributes";

/// Query text with exactly one [`IDS_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    template: String,
}

impl QueryTemplate {
    /// Validates and wraps a template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless the placeholder occurs exactly once.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        match template.matches(IDS_PLACEHOLDER).count() {
            1 => Ok(Self { template }),
            0 => Err(Error::Config(format!(
                "Query template is missing the {IDS_PLACEHOLDER} placeholder: {template}"
            ))),
            _ => Err(Error::Config(format!(
                "Query template has more than one {IDS_PLACEHOLDER} placeholder: {template}"
            ))),
        }
    }

    /// Renders the concrete query for one batch.
    #[must_use]
    pub fn render(&self, ids: &[String]) -> String {
        self.template.replace(IDS_PLACEHOLDER, &quoted_id_list(ids))
    }

    /// Raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// Formats identifiers as a quoted, comma-separated list: `'A','B'`.
#[must_use]
pub fn quoted_id_list(ids: &[String]) -> String {
    ids.iter()
        .map(|id| format!("'{}'", id.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Removes the store's `attributes` envelopes, including those on nested
/// relationship objects.
///
/// Field order is kept: the manifest header follows it.
pub fn strip_attributes(record: &mut SourceRecord) {
    record.shift_remove(ATTRIBUTES_KEY);
    for value in record.values_mut() {
        if let serde_json::Value::Object(nested) = value {
            strip_attributes(nested);
        }
    }
}

/// Outcome of a query: either nothing matched or at least one record did.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The store reported zero matching rows.
    NoRecords,
    /// Normalized records across all pages, in store order.
    Records(Vec<SourceRecord>),
}

impl QueryOutcome {
    /// Records, or an empty list for [`QueryOutcome::NoRecords`].
    #[must_use]
    pub fn into_records(self) -> Vec<SourceRecord> {
        match self {
            Self::NoRecords => Vec::new(),
            Self::Records(records) => records,
        }
    }
}

/// Issues queries against a store and flattens paginated responses.
#[derive(Clone)]
pub struct QueryDriver {
    store: Arc<dyn RecordStore>,
}

impl QueryDriver {
    /// Creates a driver over a shared store.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Runs a query and follows every follow-up page.
    ///
    /// # Errors
    ///
    /// Any store error is returned as-is; a failing query aborts the run.
    pub async fn query_all(&self, soql: &str) -> Result<QueryOutcome> {
        let first = self.store.query(soql).await?;
        if first.total_size == 0 && first.records.is_empty() {
            return Ok(QueryOutcome::NoRecords);
        }

        let mut records = Vec::with_capacity(first.records.len());
        let mut page: QueryPage = first;
        let mut pages = 1usize;
        loop {
            let next = page.next_page().map(String::from);
            records.extend(page.records.into_iter().map(|mut record| {
                strip_attributes(&mut record);
                record
            }));
            let Some(cursor) = next else { break };
            page = self.store.query_more(&cursor).await?;
            pages += 1;
        }

        debug!("Query returned {} records in {} page(s)", records.len(), pages);
        if records.is_empty() {
            Ok(QueryOutcome::NoRecords)
        } else {
            Ok(QueryOutcome::Records(records))
        }
    }

    /// Runs `template` for one identifier batch.
    ///
    /// # Errors
    ///
    /// Same as [`QueryDriver::query_all`].
    pub async fn fetch_batch(
        &self,
        template: &QueryTemplate,
        batch: &IdentifierBatch,
    ) -> Result<QueryOutcome> {
        let soql = template.render(&batch.items);
        self.query_all(&soql).await
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;

//! CSV manifest of exported records.
//!
//! A manifest is written one batch at a time. The header comes from the
//! first record's fields and is written exactly once; later batches append
//! rows only and must not introduce new columns. Every cell is quoted.

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::SourceRecord;

/// Appends record batches to a manifest file.
#[derive(Debug)]
pub struct ManifestWriter {
    path: PathBuf,
    columns: Option<Vec<String>>,
    rows_written: usize,
}

impl ManifestWriter {
    /// Creates (or truncates) a manifest. The header is written with the
    /// first non-empty batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        File::create(&path)?;
        Ok(Self {
            path,
            columns: None,
            rows_written: 0,
        })
    }

    /// Opens a manifest for appending, adopting its header if it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Self::create(path);
        }

        let mut reader = ReaderBuilder::new().from_path(&path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let columns = if headers.is_empty() {
            None
        } else {
            Some(headers)
        };

        Ok(Self {
            path,
            columns,
            rows_written: 0,
        })
    }

    /// Manifest path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header columns, once known.
    #[must_use]
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Data rows appended through this writer.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Appends one batch of records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaDrift`] if a record has a field missing from the
    /// header (nothing is written in that case) and an IO/CSV error if the
    /// write fails.
    pub fn append_batch(&mut self, records: &[SourceRecord]) -> Result<usize> {
        let Some(first) = records.first() else {
            return Ok(0);
        };

        let (columns, write_header) = match &self.columns {
            Some(columns) => (columns.clone(), false),
            None => (first.keys().cloned().collect::<Vec<_>>(), true),
        };

        for record in records {
            if let Some(extra) = record.keys().find(|key| !columns.contains(key)) {
                return Err(Error::SchemaDrift(format!(
                    "column '{}' of record {} is not in the header of {}",
                    extra,
                    record_id(record),
                    self.path.display()
                )));
            }
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(BufWriter::new(file));

        if write_header {
            writer.write_record(&columns)?;
            debug!("Wrote manifest header to {}", self.path.display());
        }
        for record in records {
            writer.write_record(columns.iter().map(|column| cell(record.get(column))))?;
        }
        writer.flush()?;

        self.columns = Some(columns);
        self.rows_written += records.len();
        Ok(records.len())
    }
}

fn record_id(record: &SourceRecord) -> &str {
    record.get("Id").and_then(Value::as_str).unwrap_or("<no Id>")
}

/// Text of one manifest cell.
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => nested.to_string(),
    }
}

/// Reads records back from a manifest.
pub struct ManifestReader {
    reader: csv::Reader<File>,
    headers: Vec<String>,
}

impl ManifestReader {
    /// Opens a manifest and reads its header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or has no header.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new().from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        if headers.is_empty() {
            return Err(Error::Manifest(format!(
                "{} has no header row",
                path.display()
            )));
        }
        Ok(Self { reader, headers })
    }

    /// Header columns in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Streams rows as records whose values are all strings.
    pub fn into_records(self) -> impl Iterator<Item = Result<SourceRecord>> {
        let headers = self.headers;
        self.reader.into_records().map(move |row| {
            let row = row?;
            Ok(headers
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.clone(), Value::String(value.to_string())))
                .collect())
        })
    }
}

/// Reads a whole manifest into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_manifest(path: &Path) -> Result<Vec<SourceRecord>> {
    ManifestReader::open(path)?.into_records().collect()
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;

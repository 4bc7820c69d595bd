//! Identifier remapping and upload body construction.
//!
//! Import rows come from a manifest (all values are strings). Bodies are
//! built field by field; the payload field is added later by the transfer
//! step.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::manifest::ManifestReader;
use crate::store::SourceRecord;

/// Mapping CSV column holding the source identifier.
pub const ORIGINAL_ID_COLUMN: &str = "OriginalId";
/// Mapping CSV column holding the target identifier.
pub const NEW_ID_COLUMN: &str = "NewId";

/// Attachment fields copied verbatim (after boolean normalization).
pub const ATTACHMENT_FIELDS: &[&str] = &[
    "ContentType",
    "Description",
    "CreatedDate",
    "IsPrivate",
    "LastModifiedDate",
    "Name",
];

/// Attachment fields mapped through the user table, each into itself.
pub const ATTACHMENT_USER_FIELDS: &[&str] = &["OwnerId", "CreatedById", "LastModifiedById"];

/// ContentVersion fields copied verbatim (after boolean normalization).
pub const CONTENT_VERSION_FIELDS: &[&str] = &[
    "Title",
    "Description",
    "PathOnClient",
    "CreatedDate",
    "LastModifiedDate",
    "ContentUrl",
    "ReasonForChange",
    "SharingOption",
    "SharingPrivacy",
    "Origin",
    "ContentLocation",
    "ExternalDocumentInfo1",
    "ExternalDocumentInfo2",
    "IsMajorVersion",
];

const BOOLEAN_FIELDS: &[&str] = &["IsPrivate", "IsMajorVersion"];

/// Old-id to new-id lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: HashMap<String, String>,
}

impl MappingTable {
    /// Loads a mapping CSV with `OriginalId` and `NewId` columns.
    ///
    /// Later rows win over earlier rows with the same `OriginalId`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either column is missing and an IO/CSV
    /// error if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = ManifestReader::open(path)?;
        for column in [ORIGINAL_ID_COLUMN, NEW_ID_COLUMN] {
            if !reader.headers().iter().any(|h| h == column) {
                return Err(Error::Config(format!(
                    "Mapping file {} has no '{}' column",
                    path.display(),
                    column
                )));
            }
        }

        let mut entries = HashMap::new();
        for row in reader.into_records() {
            let row = row?;
            if let (Some(old), Some(new)) = (
                row.get(ORIGINAL_ID_COLUMN).and_then(Value::as_str),
                row.get(NEW_ID_COLUMN).and_then(Value::as_str),
            ) {
                entries.insert(old.to_string(), new.to_string());
            }
        }

        debug!("Loaded {} mappings from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// New identifier for `original`, if mapped.
    #[must_use]
    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MappingTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Canonicalizes boolean tokens to `"true"`/`"false"`.
///
/// Only whole tokens are rewritten; anything else is returned unchanged.
#[must_use]
pub fn normalize_bool(value: &str) -> &str {
    match value {
        "1" | "true" | "True" | "TRUE" => "true",
        "0" | "false" | "False" | "FALSE" => "false",
        other => other,
    }
}

fn column<'a>(row: &'a SourceRecord, name: &str) -> Result<&'a str> {
    match row.get(name) {
        Some(Value::String(value)) => Ok(value),
        Some(Value::Null) => Ok(""),
        Some(_) => Err(Error::Manifest(format!("column '{name}' is not text"))),
        None => Err(Error::Manifest(format!(
            "manifest row {} has no '{}' column",
            row.get("Id").and_then(Value::as_str).unwrap_or("<no Id>"),
            name
        ))),
    }
}

fn copy_fields(row: &SourceRecord, fields: &[&str]) -> Result<SourceRecord> {
    let mut body = SourceRecord::new();
    for &field in fields {
        let value = column(row, field)?;
        let value = if BOOLEAN_FIELDS.contains(&field) {
            normalize_bool(value)
        } else {
            value
        };
        body.insert(field.to_string(), Value::String(value.to_string()));
    }
    Ok(body)
}

/// Result of preparing one import row.
#[derive(Debug, Clone, PartialEq)]
pub enum RemapOutcome {
    /// Body ready to upload.
    Upload(SourceRecord),
    /// Parent has no mapping; the record is not uploaded.
    Skip {
        /// Original record identifier.
        id: String,
        /// Unmapped parent identifier.
        parent: String,
    },
}

/// Builds Attachment upload bodies against parent and user mappings.
#[derive(Debug, Clone)]
pub struct AttachmentRemapper {
    parents: MappingTable,
    users: MappingTable,
}

impl AttachmentRemapper {
    /// Creates a remapper over loaded tables.
    #[must_use]
    pub fn new(parents: MappingTable, users: MappingTable) -> Self {
        Self { parents, users }
    }

    /// Builds the body for one manifest row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Manifest`] if the row lacks a required column.
    pub fn build(&self, row: &SourceRecord) -> Result<RemapOutcome> {
        let id = column(row, "Id")?;
        let parent = column(row, "ParentId")?;
        let mut body = copy_fields(row, ATTACHMENT_FIELDS)?;

        let Some(new_parent) = self.parents.get(parent) else {
            info!("Skipping upload of attachment {id} due to missing parent ({parent})");
            return Ok(RemapOutcome::Skip {
                id: id.to_string(),
                parent: parent.to_string(),
            });
        };
        body.insert("ParentId".to_string(), Value::String(new_parent.to_string()));

        for &field in ATTACHMENT_USER_FIELDS {
            if let Some(user) = self.users.get(column(row, field)?) {
                body.insert(field.to_string(), Value::String(user.to_string()));
            }
        }

        Ok(RemapOutcome::Upload(body))
    }
}

/// Builds a ContentVersion upload body for one manifest row.
///
/// # Errors
///
/// Returns [`Error::Manifest`] if the row lacks a required column.
pub fn content_version_body(row: &SourceRecord) -> Result<SourceRecord> {
    copy_fields(row, CONTENT_VERSION_FIELDS)
}

#[cfg(test)]
#[path = "remap_tests.rs"]
mod tests;

// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # RecordFiles Migration Tool
//!
//! `recordfiles-migrate` is a CLI tool and library for moving file records
//! (legacy Attachments and ContentVersions) out of a remote record store into
//! a local staging area, and back into another store under new parents.
//!
//! ## Commands
//!
//! | Command | Reads | Writes |
//! |---------|-------|--------|
//! | `export-attachments` | parent query | `Attachment.csv` + `Attachment/<Id>` |
//! | `export-content-versions` | parent query | `ContentDocumentLink.csv`, `ContentVersion.csv` + `ContentVersion/<Id>` |
//! | `import-attachments` | manifest, payloads, id mappings | JSON result lines |
//! | `import-content-versions` | manifest, payloads | JSON result lines |
//!
//! ## Quick Start
//!
//! ```bash
//! # Export every Attachment below a set of Accounts
//! recordfiles-migrate export-attachments \
//!     -q "SELECT Id FROM Account WHERE Type = 'Customer'" \
//!     -o ./export -s credentials.yaml
//!
//! # Re-create them in another org
//! recordfiles-migrate import-attachments \
//!     -i ./export/Attachment.csv -f ./export/Attachment \
//!     -s target.yaml -u users.csv -p accounts.csv -r results.jsonl
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! attachment:
//!   output_file: Attachment.csv
//!   output_dir: Attachment
//!
//! options:
//!   batch_size: 100
//!   workers: 4
//! ```

#![warn(missing_docs)]

pub mod batch;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod query;
pub mod remap;
pub mod report;
pub mod store;
pub mod transfer;

pub use batch::{batches, Batch, IdentifierBatch};
pub use config::{Credentials, MigrationSettings, RunOptions};
pub use error::{Error, Result};
pub use manifest::{ManifestReader, ManifestWriter};
pub use pipeline::{
    AttachmentExport, AttachmentImport, ContentVersionExport, ContentVersionImport, TransferStats,
};
pub use query::{QueryDriver, QueryOutcome, QueryTemplate};
pub use remap::{AttachmentRemapper, MappingTable, RemapOutcome};
pub use report::ResultReporter;
pub use store::{MemoryStore, RecordStore, RestRecordStore, Session, SourceRecord};

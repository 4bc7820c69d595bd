//! Export and import pipeline orchestration.
//!
//! Batches run one after another. Within a batch the payload transfers run in
//! a bounded pool; the manifest and the reporter are only touched from the
//! sequential part.

pub mod export;
pub mod import;

use indicatif::{ProgressBar, ProgressStyle};

pub use export::{AttachmentExport, ContentVersionExport};
pub use import::{AttachmentImport, ContentVersionImport};

/// Transfer statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransferStats {
    /// Records returned by batch queries or read from the manifest.
    pub queried: u64,
    /// Payloads downloaded or records uploaded.
    pub transferred: u64,
    /// Records whose transfer failed.
    pub failed: u64,
    /// Records skipped for a missing parent mapping.
    pub skipped: u64,
    /// Batches processed.
    pub batches: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl TransferStats {
    /// Calculate throughput (records per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.transferred as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = if total > 0 {
        ProgressBar::new(total)
    } else {
        ProgressBar::new_spinner()
    };

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

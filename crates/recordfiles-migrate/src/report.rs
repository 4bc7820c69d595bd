//! Upload result stream: one JSON object per line.

use serde_json::Value;
use std::io::Write;

use crate::error::Result;
use crate::transfer::UploadOutcome;

/// Writes one line per attempted upload and flushes it immediately.
pub struct ResultReporter {
    sink: Box<dyn Write + Send>,
    lines: usize,
    failures: usize,
}

impl ResultReporter {
    /// Reports to an arbitrary sink.
    #[must_use]
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink,
            lines: 0,
            failures: 0,
        }
    }

    /// Reports to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Appends one outcome as `{...body, "error": ..., "Id": ...}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be written.
    pub fn report(&mut self, outcome: &UploadOutcome) -> Result<()> {
        let mut line = outcome.body.clone();
        line.insert(
            "error".to_string(),
            Value::String(outcome.error.clone().unwrap_or_default()),
        );
        line.insert("Id".to_string(), Value::String(outcome.record_id.clone()));

        serde_json::to_writer(&mut self.sink, &line)?;
        self.sink.write_all(b"\n")?;
        self.sink.flush()?;

        self.lines += 1;
        if !outcome.is_success() {
            self.failures += 1;
        }
        Ok(())
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Lines carrying an error.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures
    }
}

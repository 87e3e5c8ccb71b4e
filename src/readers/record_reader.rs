use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::models::{ParameterModel, TelemetryRecord, TelemetryWire};
use crate::store::BlobStore;
use crate::utils::constants::{DEFAULT_BLOB_SUFFIX, DEFAULT_MAX_BLOBS};
use crate::utils::progress::ProgressReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// Line is not valid JSON.
    Parse,
    /// Valid JSON that does not describe a complete telemetry record.
    Validation,
    /// The whole blob could not be read from the store.
    Unreadable,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Parse => write!(f, "PARSE"),
            DiagnosticKind::Validation => write!(f, "VALIDATION"),
            DiagnosticKind::Unreadable => write!(f, "UNREADABLE"),
        }
    }
}

/// A problem with one line (or one blob) that was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub blob: String,
    /// 1-based line number; `None` for blob-level problems.
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] {}:{}: {}", self.kind, self.blob, line, self.message),
            None => write!(f, "[{}] {}: {}", self.kind, self.blob, self.message),
        }
    }
}

/// Result of reading one batch of blobs.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub records: Vec<TelemetryRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Blobs that matched the suffix filter.
    pub blobs_available: usize,
    /// Blobs actually consumed (readable or not).
    pub blobs_read: usize,
    /// True when the cap left matching blobs unread.
    pub truncated: bool,
    pub lines_seen: usize,
}

impl ReadOutcome {
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    pub fn blobs_skipped(&self) -> usize {
        self.blobs_available - self.blobs_read
    }
}

/// Turns newline-delimited JSON blobs into telemetry records, skipping
/// anything malformed without aborting the batch.
pub struct RawRecordReader {
    parameters: Arc<ParameterModel>,
    max_blobs: Option<usize>,
    suffix: String,
}

impl RawRecordReader {
    pub fn new(parameters: Arc<ParameterModel>) -> Self {
        Self {
            parameters,
            max_blobs: Some(DEFAULT_MAX_BLOBS),
            suffix: DEFAULT_BLOB_SUFFIX.to_string(),
        }
    }

    /// Cap the number of blobs consumed; `None` or `Some(0)` reads all.
    pub fn with_max_blobs(mut self, max_blobs: Option<usize>) -> Self {
        self.max_blobs = max_blobs.filter(|&n| n > 0);
        self
    }

    /// Only blobs whose name ends with `suffix` are considered. Empty accepts all.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn parameters(&self) -> &ParameterModel {
        &self.parameters
    }

    /// Read in-memory payloads, in order, honouring the blob cap.
    pub fn read_payloads<I, N, B>(&self, payloads: I) -> ReadOutcome
    where
        I: IntoIterator<Item = (N, B)>,
        N: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let mut outcome = ReadOutcome::default();
        for (name, bytes) in payloads {
            outcome.blobs_available += 1;
            if self.cap_reached(outcome.blobs_read) {
                outcome.truncated = true;
                continue;
            }
            outcome.blobs_read += 1;
            self.read_blob(name.as_ref(), bytes.as_ref(), &mut outcome);
        }
        outcome
    }

    /// List, filter, cap and read blobs from a store.
    ///
    /// Only a failure to list the store is returned as an error; unreadable
    /// blobs become diagnostics.
    pub fn read_store(
        &self,
        store: &dyn BlobStore,
        progress: Option<&ProgressReporter>,
    ) -> Result<ReadOutcome> {
        let names: Vec<String> = store
            .list()
            .map_err(|e| TelemetryError::Store(format!("{}: {}", store.describe(), e)))?
            .into_iter()
            .filter(|name| self.suffix.is_empty() || name.ends_with(&self.suffix))
            .collect();

        let mut outcome = ReadOutcome {
            blobs_available: names.len(),
            ..Default::default()
        };

        let selected = match self.max_blobs {
            Some(cap) if cap < names.len() => {
                outcome.truncated = true;
                &names[..cap]
            }
            _ => &names[..],
        };

        info!(
            "Found {} blobs in {} ({} selected)",
            names.len(),
            store.describe(),
            selected.len()
        );
        if outcome.truncated {
            warn!(
                "Blob cap reached: reading {} of {} blobs",
                selected.len(),
                names.len()
            );
        }
        if let Some(p) = progress {
            p.set_length(selected.len() as u64);
        }

        for name in selected {
            outcome.blobs_read += 1;
            match store.read(name) {
                Ok(bytes) => self.read_blob(name, &bytes, &mut outcome),
                Err(e) => {
                    warn!("Error reading blob {}: {}", name, e);
                    outcome.diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::Unreadable,
                        blob: name.clone(),
                        line: None,
                        message: e.to_string(),
                    });
                }
            }
            if let Some(p) = progress {
                p.increment(1);
            }
        }

        info!(
            "Read {} records from {} blobs ({} diagnostics)",
            outcome.records.len(),
            outcome.blobs_read,
            outcome.diagnostics.len()
        );
        Ok(outcome)
    }

    fn cap_reached(&self, blobs_read: usize) -> bool {
        self.max_blobs.is_some_and(|cap| blobs_read >= cap)
    }

    fn read_blob(&self, name: &str, bytes: &[u8], outcome: &mut ReadOutcome) {
        let before = outcome.records.len();
        for (index, raw_line) in bytes.split(|&b| b == b'\n').enumerate() {
            if raw_line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            outcome.lines_seen += 1;

            let parsed = std::str::from_utf8(raw_line)
                .map_err(|e| (DiagnosticKind::Parse, format!("invalid UTF-8: {}", e)))
                .and_then(|line| self.parse_line(line));
            match parsed {
                Ok(record) => outcome.records.push(record),
                Err((kind, message)) => {
                    let diagnostic = Diagnostic {
                        kind,
                        blob: name.to_string(),
                        line: Some(index + 1),
                        message,
                    };
                    warn!("Skipping line: {}", diagnostic);
                    outcome.diagnostics.push(diagnostic);
                }
            }
        }
        debug!(
            "Blob {} yielded {} records",
            name,
            outcome.records.len() - before
        );
    }

    /// Parse one non-blank line into a record.
    pub fn parse_line(
        &self,
        line: &str,
    ) -> std::result::Result<TelemetryRecord, (DiagnosticKind, String)> {
        let value: serde_json::Value = serde_json::from_str(line.trim())
            .map_err(|e| (DiagnosticKind::Parse, e.to_string()))?;

        if !value.is_object() {
            return Err((
                DiagnosticKind::Validation,
                "expected a JSON object".to_string(),
            ));
        }

        let wire: TelemetryWire = serde_json::from_value(value)
            .map_err(|e| (DiagnosticKind::Validation, e.to_string()))?;

        wire.into_record(&self.parameters)
            .map_err(|e| (DiagnosticKind::Validation, e.to_string()))
    }
}

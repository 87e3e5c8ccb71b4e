use chrono::Duration;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::models::{AggregateRecord, ParameterModel};
use crate::processors::{IntegrityChecker, IntegrityReport, WindowAggregator};
use crate::readers::{Diagnostic, RawRecordReader, ReadOutcome};
use crate::store::BlobStore;
use crate::utils::constants::{DEFAULT_BLOB_SUFFIX, DEFAULT_MAX_BLOBS, DEFAULT_WINDOW_SECS};
use crate::utils::progress::ProgressReporter;

/// Everything one aggregation run produced.
#[derive(Debug)]
pub struct PipelineOutput {
    pub aggregates: Vec<AggregateRecord>,
    pub report: IntegrityReport,
    pub diagnostics: Vec<Diagnostic>,
    pub records_read: usize,
    pub blobs_read: usize,
}

/// Store -> reader -> aggregator -> integrity check.
pub struct AggregationPipeline {
    parameters: Arc<ParameterModel>,
    window: Duration,
    max_blobs: Option<usize>,
    suffix: String,
    max_workers: usize,
}

impl AggregationPipeline {
    pub fn new(parameters: Arc<ParameterModel>) -> Self {
        Self {
            parameters,
            window: Duration::seconds(DEFAULT_WINDOW_SECS as i64),
            max_blobs: Some(DEFAULT_MAX_BLOBS),
            suffix: DEFAULT_BLOB_SUFFIX.to_string(),
            max_workers: num_cpus::get(),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_max_blobs(mut self, max_blobs: Option<usize>) -> Self {
        self.max_blobs = max_blobs;
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    fn reader(&self) -> RawRecordReader {
        RawRecordReader::new(self.parameters.clone())
            .with_max_blobs(self.max_blobs)
            .with_suffix(self.suffix.clone())
    }

    /// Read and validate raw records without aggregating.
    pub fn read(
        &self,
        store: &dyn BlobStore,
        progress: Option<&ProgressReporter>,
    ) -> Result<ReadOutcome> {
        if let Some(p) = progress {
            p.set_message(&format!("Reading blobs from {}...", store.describe()));
        }
        self.reader().read_store(store, progress)
    }

    pub fn run(
        &self,
        store: &dyn BlobStore,
        progress: Option<&ProgressReporter>,
    ) -> Result<PipelineOutput> {
        let outcome = self.read(store, progress)?;

        if let Some(p) = progress {
            p.set_message("Aggregating windows...");
        }
        let aggregator = WindowAggregator::new(self.parameters.clone(), self.window)?
            .with_max_workers(self.max_workers);
        let aggregates = aggregator.aggregate(&outcome.records)?;

        if let Some(p) = progress {
            p.set_message("Checking data integrity...");
        }
        let checker = IntegrityChecker::new(self.window);
        let mut report = checker.check_integrity(&aggregates, &outcome.diagnostics);
        report.truncated = outcome.truncated;

        if let Some(p) = progress {
            p.finish_with_message(&format!("Aggregated {} windows", aggregates.len()));
        }
        info!(
            "Pipeline produced {} windows from {} records ({} blobs)",
            aggregates.len(),
            outcome.records.len(),
            outcome.blobs_read
        );

        Ok(PipelineOutput {
            aggregates,
            report,
            records_read: outcome.records.len(),
            blobs_read: outcome.blobs_read,
            diagnostics: outcome.diagnostics,
        })
    }
}

impl Default for AggregationPipeline {
    fn default() -> Self {
        Self::new(Arc::new(ParameterModel::default()))
    }
}

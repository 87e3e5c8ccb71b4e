use std::fs;
use std::path::Path;
use tracing::info;

use crate::analyzers::StationSummary;
use crate::error::Result;

/// Writes the per-station summary table as CSV, one row per station.
#[derive(Default)]
pub struct SummaryCsvWriter;

impl SummaryCsvWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_summary(&self, stations: &[StationSummary], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        for station in stations {
            writer.serialize(station)?;
        }
        writer.flush()?;

        info!("Wrote summary for {} stations to {}", stations.len(), path.display());
        Ok(())
    }
}

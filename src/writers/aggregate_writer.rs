use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Result, TelemetryError};
use crate::models::AggregateRecord;
use crate::utils::constants::DEFAULT_BUFFER_SIZE;

/// Writes aggregates as JSON lines in the reporting wire shape.
pub struct AggregateWriter {
    buffer_size: usize,
}

impl AggregateWriter {
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Write aggregates to `path`, creating parent directories as needed.
    pub fn write_records(&self, records: &[AggregateRecord], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        self.write_to(records, &mut writer)?;
        writer.flush()?;

        info!("Wrote {} aggregates to {}", records.len(), path.display());
        Ok(())
    }

    pub fn write_to<W: Write>(&self, records: &[AggregateRecord], writer: &mut W) -> Result<()> {
        for record in records {
            writeln!(writer, "{}", record.to_json_line()?)?;
        }
        Ok(())
    }

    /// Read up to `limit` aggregates back (0 reads all).
    pub fn read_sample_records(&self, path: &Path, limit: usize) -> Result<Vec<AggregateRecord>> {
        let records = read_aggregates(path)?;
        if limit == 0 {
            Ok(records)
        } else {
            Ok(records.into_iter().take(limit).collect())
        }
    }

    pub fn get_file_info(&self, path: &Path) -> Result<AggregateFileInfo> {
        let records = read_aggregates(path)?;
        self.file_info(&records, path)
    }

    /// File info for `records` already read from (or written to) `path`.
    pub fn file_info(&self, records: &[AggregateRecord], path: &Path) -> Result<AggregateFileInfo> {
        let stations: BTreeSet<&str> = records.iter().map(|r| r.station_id.as_str()).collect();

        Ok(AggregateFileInfo {
            total_rows: records.len(),
            stations: stations.len(),
            suspect_rows: records.iter().filter(|r| r.is_suspect()).count(),
            file_size: fs::metadata(path)?.len(),
        })
    }
}

impl Default for AggregateWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a JSON-lines file of aggregates.
///
/// Blank lines are skipped; a malformed line fails the whole read since
/// aggregate files are produced by this tool, not by the field.
pub fn read_aggregates(path: &Path) -> Result<Vec<AggregateRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file);

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = AggregateRecord::from_json_line(&line).map_err(|e| TelemetryError::Parse {
            source_name: path.display().to_string(),
            line: index + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }

    if records.is_empty() {
        warn!("No aggregates found in {}", path.display());
    }
    Ok(records)
}

#[derive(Debug)]
pub struct AggregateFileInfo {
    pub total_rows: usize,
    pub stations: usize,
    pub suspect_rows: usize,
    pub file_size: u64,
}

impl AggregateFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Aggregate File Summary:\n\
            - Total windows: {}\n\
            - Stations: {}\n\
            - Suspect windows: {}\n\
            - File size: {:.2} KB",
            self.total_rows,
            self.stations,
            self.suspect_rows,
            self.file_size as f64 / 1024.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metric, MetricStats};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::{NamedTempFile, TempDir};

    fn aggregate(station: &str, violations: usize) -> AggregateRecord {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let mut stats = BTreeMap::new();
        stats.insert(
            Metric::IceThickness,
            MetricStats {
                avg: 20.0,
                min: 18.5,
                max: 21.5,
            },
        );
        AggregateRecord {
            station_id: station.to_string(),
            window_start: start,
            window_end: start + Duration::minutes(5),
            count: 10,
            stats,
            bounds_violations: violations,
        }
    }

    #[test]
    fn test_write_empty_records() {
        let writer = AggregateWriter::new();
        let temp_file = NamedTempFile::new().unwrap();

        writer.write_records(&[], temp_file.path()).unwrap();
        assert!(read_aggregates(temp_file.path()).unwrap().is_empty());
    }

    #[test]
    fn test_write_and_read_back() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("output").join("aggregates.jsonl");
        let records = vec![aggregate("NAC", 0), aggregate("Fifth Avenue", 2)];

        let writer = AggregateWriter::new();
        writer.write_records(&records, &path)?;

        assert_eq!(read_aggregates(&path)?, records);
        assert_eq!(writer.read_sample_records(&path, 1)?.len(), 1);

        let info = writer.get_file_info(&path)?;
        assert_eq!(info.total_rows, 2);
        assert_eq!(info.stations, 2);
        assert_eq!(info.suspect_rows, 1);

        let from_records = writer.file_info(&records, &path)?;
        assert_eq!(from_records.total_rows, info.total_rows);
        assert_eq!(from_records.suspect_rows, info.suspect_rows);
        assert_eq!(from_records.file_size, info.file_size);
        Ok(())
    }

    #[test]
    fn test_malformed_line_reports_position() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let good = aggregate("NAC", 0).to_json_line()?;
        fs::write(temp_file.path(), format!("{}\n\nnot json\n", good))?;

        match read_aggregates(temp_file.path()) {
            Err(TelemetryError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }
        Ok(())
    }
}

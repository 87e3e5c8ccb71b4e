use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TelemetryError};
use crate::models::parameters::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricStats {
    pub fn is_ordered(&self) -> bool {
        self.min <= self.avg && self.avg <= self.max
    }
}

/// Statistical summary of one (station, window) bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    pub station_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub count: usize,
    pub stats: BTreeMap<Metric, MetricStats>,
    /// Metric values in the bucket that fell outside the model bounds.
    pub bounds_violations: usize,
}

impl AggregateRecord {
    pub fn window_size(&self) -> Duration {
        self.window_end - self.window_start
    }

    pub fn stat(&self, metric: Metric) -> Option<&MetricStats> {
        self.stats.get(&metric)
    }

    pub fn avg(&self, metric: Metric) -> Option<f64> {
        self.stat(metric).map(|s| s.avg)
    }

    pub fn min(&self, metric: Metric) -> Option<f64> {
        self.stat(metric).map(|s| s.min)
    }

    pub fn max(&self, metric: Metric) -> Option<f64> {
        self.stat(metric).map(|s| s.max)
    }

    pub fn is_suspect(&self) -> bool {
        self.bounds_violations > 0
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.window_start <= instant && instant < self.window_end
    }

    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(&AggregateWire::from(self))?)
    }

    pub fn from_json_line(line: &str) -> Result<Self> {
        let wire: AggregateWire = serde_json::from_str(line)?;
        AggregateRecord::try_from(wire)
    }
}

/// Aggregate JSON line consumed by reporting sinks.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateWire {
    pub location: String,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end_time: DateTime<Utc>,
    #[serde(default)]
    pub count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_ice_thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ice_thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ice_thickness: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_surface_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_surface_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surface_temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_snow_accumulation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_snow_accumulation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_snow_accumulation: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_external_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_external_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_external_temperature: Option<f64>,

    #[serde(default)]
    pub bounds_violations: usize,
    #[serde(default)]
    pub suspect: bool,
}

impl AggregateWire {
    fn slots(&mut self, metric: Metric) -> [&mut Option<f64>; 3] {
        match metric {
            Metric::IceThickness => [
                &mut self.avg_ice_thickness,
                &mut self.min_ice_thickness,
                &mut self.max_ice_thickness,
            ],
            Metric::SurfaceTemperature => [
                &mut self.avg_surface_temperature,
                &mut self.min_surface_temperature,
                &mut self.max_surface_temperature,
            ],
            Metric::SnowAccumulation => [
                &mut self.avg_snow_accumulation,
                &mut self.min_snow_accumulation,
                &mut self.max_snow_accumulation,
            ],
            Metric::ExternalTemperature => [
                &mut self.avg_external_temperature,
                &mut self.min_external_temperature,
                &mut self.max_external_temperature,
            ],
        }
    }
}

impl From<&AggregateRecord> for AggregateWire {
    fn from(record: &AggregateRecord) -> Self {
        let mut wire = AggregateWire {
            location: record.station_id.clone(),
            window_start: Some(record.window_start),
            window_end_time: record.window_end,
            count: record.count,
            bounds_violations: record.bounds_violations,
            suspect: record.is_suspect(),
            ..Default::default()
        };
        for (metric, stats) in &record.stats {
            let [avg, min, max] = wire.slots(*metric);
            *avg = Some(stats.avg);
            *min = Some(stats.min);
            *max = Some(stats.max);
        }
        wire
    }
}

impl TryFrom<AggregateWire> for AggregateRecord {
    type Error = TelemetryError;

    /// Aggregates written by other collectors may only carry some of the
    /// statistics; a metric is kept when at least its average is present and
    /// missing extremes fall back to the average.
    fn try_from(mut wire: AggregateWire) -> Result<Self> {
        if wire.location.trim().is_empty() {
            return Err(TelemetryError::MissingData("location".to_string()));
        }

        let mut stats = BTreeMap::new();
        for metric in Metric::ALL {
            let [avg, min, max] = wire.slots(metric);
            if let Some(avg) = *avg {
                stats.insert(
                    metric,
                    MetricStats {
                        avg,
                        min: min.unwrap_or(avg),
                        max: max.unwrap_or(avg),
                    },
                );
            }
        }

        let window_start = wire.window_start.unwrap_or(wire.window_end_time);
        if window_start > wire.window_end_time {
            return Err(TelemetryError::InvalidRecord(format!(
                "window starts at {} after it ends at {}",
                window_start, wire.window_end_time
            )));
        }

        Ok(AggregateRecord {
            station_id: wire.location,
            window_start,
            window_end: wire.window_end_time,
            count: wire.count,
            stats,
            bounds_violations: wire.bounds_violations,
        })
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, TelemetryError};
use crate::models::{AggregateRecord, Metric};
use crate::utils::constants::SUMMARY_DECIMALS;

fn round_summary(value: f64) -> f64 {
    let scale = 10f64.powi(SUMMARY_DECIMALS as i32);
    (value * scale).round() / scale
}

/// Running mean/min/max over one aggregate column.
#[derive(Debug, Default, Clone, Copy)]
struct Column {
    sum: f64,
    count: usize,
    min: Option<f64>,
    max: Option<f64>,
}

impl Column {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| round_summary(self.sum / self.count as f64))
    }

    fn min(&self) -> Option<f64> {
        self.min.map(round_summary)
    }

    fn max(&self) -> Option<f64> {
        self.max.map(round_summary)
    }
}

/// Per-station roll-up of aggregate windows. Values are rounded to two
/// decimals; `None` when no window carried the metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub location: String,
    pub windows: usize,
    pub suspect_windows: usize,
    pub avg_ice_thickness_mean: Option<f64>,
    pub avg_ice_thickness_min: Option<f64>,
    pub avg_ice_thickness_max: Option<f64>,
    pub max_snow_accumulation_mean: Option<f64>,
    pub max_snow_accumulation_max: Option<f64>,
    pub avg_surface_temperature_mean: Option<f64>,
    pub avg_surface_temperature_min: Option<f64>,
    pub avg_surface_temperature_max: Option<f64>,
    pub avg_external_temperature_mean: Option<f64>,
    pub avg_external_temperature_min: Option<f64>,
    pub avg_external_temperature_max: Option<f64>,
}

#[derive(Debug)]
pub struct SummaryStatistics {
    pub total_aggregates: usize,
    pub total_observations: usize,
    pub distinct_windows: usize,
    pub time_range: (DateTime<Utc>, DateTime<Utc>),
    pub stations: Vec<StationSummary>,
}

impl SummaryStatistics {
    /// Station with the highest mean ice thickness.
    pub fn thickest_ice(&self) -> Option<(&str, f64)> {
        self.extreme(|s| s.avg_ice_thickness_mean, true)
    }

    /// Station with the lowest mean ice thickness.
    pub fn thinnest_ice(&self) -> Option<(&str, f64)> {
        self.extreme(|s| s.avg_ice_thickness_mean, false)
    }

    pub fn deepest_snow(&self) -> Option<(&str, f64)> {
        self.extreme(|s| s.max_snow_accumulation_max, true)
    }

    pub fn coldest_surface(&self) -> Option<(&str, f64)> {
        self.extreme(|s| s.avg_surface_temperature_mean, false)
    }

    fn extreme<F>(&self, column: F, highest: bool) -> Option<(&str, f64)>
    where
        F: Fn(&StationSummary) -> Option<f64>,
    {
        self.stations
            .iter()
            .filter_map(|s| column(s).map(|v| (s.location.as_str(), v)))
            .reduce(|best, candidate| {
                let better = if highest {
                    candidate.1 > best.1
                } else {
                    candidate.1 < best.1
                };
                if better {
                    candidate
                } else {
                    best
                }
            })
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Stations: {}\n\
            Windows: {} aggregates over {} distinct windows\n\
            Observations: {}\n\
            Time Range: {} to {}\n",
            self.stations.len(),
            self.total_aggregates,
            self.distinct_windows,
            self.total_observations,
            self.time_range.0.to_rfc3339(),
            self.time_range.1.to_rfc3339(),
        );

        if let Some((station, value)) = self.thickest_ice() {
            summary.push_str(&format!("Thickest Ice: {} ({:.1} cm)\n", station, value));
        }
        if let Some((station, value)) = self.thinnest_ice() {
            summary.push_str(&format!("Thinnest Ice: {} ({:.1} cm)\n", station, value));
        }
        if let Some((station, value)) = self.deepest_snow() {
            summary.push_str(&format!("Deepest Snow: {} ({:.1} cm)\n", station, value));
        }
        if let Some((station, value)) = self.coldest_surface() {
            summary.push_str(&format!("Coldest Surface: {} ({:.1}°C)\n", station, value));
        }
        summary
    }

    pub fn station_table(&self) -> String {
        let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));

        let mut table = format!(
            "{:<16} {:>7} {:>9} {:>9} {:>9} {:>10} {:>10}\n",
            "Location", "Windows", "Ice avg", "Ice min", "Ice max", "Snow max", "Surface"
        );
        for station in &self.stations {
            table.push_str(&format!(
                "{:<16} {:>7} {:>9} {:>9} {:>9} {:>10} {:>10}\n",
                station.location,
                station.windows,
                fmt(station.avg_ice_thickness_mean),
                fmt(station.avg_ice_thickness_min),
                fmt(station.avg_ice_thickness_max),
                fmt(station.max_snow_accumulation_max),
                fmt(station.avg_surface_temperature_mean),
            ));
        }
        table
    }
}

#[derive(Default)]
struct StationColumns {
    windows: usize,
    suspect_windows: usize,
    ice: Column,
    snow_max: Column,
    surface: Column,
    external: Column,
}

pub struct SummaryAnalyzer;

impl SummaryAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, aggregates: &[AggregateRecord]) -> Result<SummaryStatistics> {
        let first = aggregates
            .first()
            .ok_or_else(|| TelemetryError::MissingData("no aggregates to analyze".to_string()))?;

        let mut per_station: BTreeMap<&str, StationColumns> = BTreeMap::new();
        let mut windows = BTreeSet::new();
        let mut earliest = first.window_start;
        let mut latest = first.window_end;
        let mut observations = 0;

        for aggregate in aggregates {
            windows.insert(aggregate.window_start);
            earliest = earliest.min(aggregate.window_start);
            latest = latest.max(aggregate.window_end);
            observations += aggregate.count;

            let columns = per_station
                .entry(aggregate.station_id.as_str())
                .or_default();
            columns.windows += 1;
            if aggregate.is_suspect() {
                columns.suspect_windows += 1;
            }
            columns.ice.push(aggregate.avg(Metric::IceThickness));
            columns.snow_max.push(aggregate.max(Metric::SnowAccumulation));
            columns.surface.push(aggregate.avg(Metric::SurfaceTemperature));
            columns
                .external
                .push(aggregate.avg(Metric::ExternalTemperature));
        }

        let stations = per_station
            .into_iter()
            .map(|(location, c)| StationSummary {
                location: location.to_string(),
                windows: c.windows,
                suspect_windows: c.suspect_windows,
                avg_ice_thickness_mean: c.ice.mean(),
                avg_ice_thickness_min: c.ice.min(),
                avg_ice_thickness_max: c.ice.max(),
                max_snow_accumulation_mean: c.snow_max.mean(),
                max_snow_accumulation_max: c.snow_max.max(),
                avg_surface_temperature_mean: c.surface.mean(),
                avg_surface_temperature_min: c.surface.min(),
                avg_surface_temperature_max: c.surface.max(),
                avg_external_temperature_mean: c.external.mean(),
                avg_external_temperature_min: c.external.min(),
                avg_external_temperature_max: c.external.max(),
            })
            .collect();

        Ok(SummaryStatistics {
            total_aggregates: aggregates.len(),
            total_observations: observations,
            distinct_windows: windows.len(),
            time_range: (earliest, latest),
            stations,
        })
    }
}

impl Default for SummaryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricStats;
    use chrono::{Duration, TimeZone};

    fn aggregate(station: &str, minute: i64, ice: f64, snow_max: f64) -> AggregateRecord {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap() + Duration::minutes(minute);
        let mut stats = BTreeMap::new();
        stats.insert(
            Metric::IceThickness,
            MetricStats {
                avg: ice,
                min: ice - 1.0,
                max: ice + 1.0,
            },
        );
        stats.insert(
            Metric::SnowAccumulation,
            MetricStats {
                avg: snow_max / 2.0,
                min: 0.0,
                max: snow_max,
            },
        );
        AggregateRecord {
            station_id: station.to_string(),
            window_start: start,
            window_end: start + Duration::minutes(5),
            count: 10,
            stats,
            bounds_violations: 0,
        }
    }

    #[test]
    fn test_per_station_summary() {
        let aggregates = vec![
            aggregate("NAC", 0, 20.0, 4.0),
            aggregate("NAC", 5, 30.0, 6.0),
            aggregate("Dow's Lake", 0, 25.556, 2.0),
        ];

        let stats = SummaryAnalyzer::new().analyze(&aggregates).unwrap();
        assert_eq!(stats.total_aggregates, 3);
        assert_eq!(stats.distinct_windows, 2);
        assert_eq!(stats.total_observations, 30);
        assert_eq!(stats.stations.len(), 2);

        let dows = &stats.stations[0];
        assert_eq!(dows.location, "Dow's Lake");
        assert_eq!(dows.avg_ice_thickness_mean, Some(25.56));
        assert_eq!(dows.avg_surface_temperature_mean, None);

        let nac = &stats.stations[1];
        assert_eq!(nac.windows, 2);
        assert_eq!(nac.avg_ice_thickness_mean, Some(25.0));
        assert_eq!(nac.avg_ice_thickness_min, Some(20.0));
        assert_eq!(nac.max_snow_accumulation_mean, Some(5.0));
        assert_eq!(nac.max_snow_accumulation_max, Some(6.0));

        assert_eq!(stats.thickest_ice(), Some(("Dow's Lake", 25.56)));
        assert_eq!(stats.deepest_snow(), Some(("NAC", 6.0)));
        assert!(stats.summary().contains("Stations: 2"));
        assert!(stats.station_table().contains("NAC"));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            SummaryAnalyzer::new().analyze(&[]),
            Err(TelemetryError::MissingData(_))
        ));
    }
}

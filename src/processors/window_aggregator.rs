use chrono::{DateTime, Duration, TimeZone, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, TelemetryError};
use crate::models::{AggregateRecord, MetricStats, ParameterModel, TelemetryRecord};
use crate::utils::constants::DEFAULT_WINDOW_SECS;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Buckets telemetry into fixed-width, half-open windows per station and
/// reduces each bucket to mean/min/max per metric.
///
/// The result depends only on the multiset of input records: values are
/// reduced in a canonical order so shuffled or re-read input produces
/// bit-identical aggregates.
pub struct WindowAggregator {
    parameters: Arc<ParameterModel>,
    window: Duration,
    window_micros: i64,
    max_workers: usize,
}

impl WindowAggregator {
    pub fn new(parameters: Arc<ParameterModel>, window: Duration) -> Result<Self> {
        let window_micros = window
            .num_microseconds()
            .filter(|&us| us > 0)
            .ok_or_else(|| {
                TelemetryError::Config(format!("window size must be positive, got {}", window))
            })?;

        Ok(Self {
            parameters,
            window,
            window_micros,
            max_workers: 1,
        })
    }

    pub fn with_window_secs(parameters: Arc<ParameterModel>, secs: u64) -> Result<Self> {
        let secs = i64::try_from(secs)
            .map_err(|_| TelemetryError::Config(format!("window of {}s is too large", secs)))?;
        Self::new(parameters, Duration::seconds(secs))
    }

    /// Aggregate station partitions on a rayon pool of this many threads.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start of the window containing `timestamp`.
    ///
    /// Uses Euclidean remainder so instants before the epoch floor downwards.
    pub fn window_start(&self, timestamp: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let micros = timestamp.timestamp_micros();
        let floored = micros - micros.rem_euclid(self.window_micros);

        let secs = floored.div_euclid(MICROS_PER_SECOND);
        let nanos = (floored.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;
        Utc.timestamp_opt(secs, nanos).single().ok_or_else(|| {
            TelemetryError::InvalidRecord(format!("timestamp {} cannot be windowed", timestamp))
        })
    }

    pub fn aggregate(&self, records: &[TelemetryRecord]) -> Result<Vec<AggregateRecord>> {
        let mut partitions: BTreeMap<&str, Vec<&TelemetryRecord>> = BTreeMap::new();
        for record in records {
            partitions
                .entry(record.station_id.as_str())
                .or_default()
                .push(record);
        }
        let partitions: Vec<(&str, Vec<&TelemetryRecord>)> = partitions.into_iter().collect();

        let per_station: Vec<Vec<AggregateRecord>> = if self.max_workers > 1 && partitions.len() > 1
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.max_workers)
                .build()
                .map_err(|e| TelemetryError::Config(e.to_string()))?;

            pool.install(|| {
                partitions
                    .par_iter()
                    .map(|(station, records)| self.aggregate_station(station, records))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            partitions
                .iter()
                .map(|(station, records)| self.aggregate_station(station, records))
                .collect::<Result<Vec<_>>>()?
        };

        let mut aggregates: Vec<AggregateRecord> = per_station.into_iter().flatten().collect();
        aggregates.sort_by(|a, b| {
            a.station_id
                .cmp(&b.station_id)
                .then_with(|| a.window_start.cmp(&b.window_start))
        });

        info!(
            "Aggregated {} records into {} windows across {} stations",
            records.len(),
            aggregates.len(),
            partitions.len()
        );
        Ok(aggregates)
    }

    fn aggregate_station(
        &self,
        station: &str,
        records: &[&TelemetryRecord],
    ) -> Result<Vec<AggregateRecord>> {
        let mut buckets: BTreeMap<DateTime<Utc>, Vec<&TelemetryRecord>> = BTreeMap::new();
        for record in records {
            buckets
                .entry(self.window_start(record.timestamp)?)
                .or_default()
                .push(record);
        }

        debug!("Station {} spans {} windows", station, buckets.len());

        Ok(buckets
            .into_iter()
            .map(|(start, bucket)| self.reduce_bucket(station, start, &bucket))
            .collect())
    }

    fn reduce_bucket(
        &self,
        station: &str,
        window_start: DateTime<Utc>,
        bucket: &[&TelemetryRecord],
    ) -> AggregateRecord {
        let mut stats = BTreeMap::new();
        let mut bounds_violations = 0;

        for metric in self.parameters.metrics() {
            let mut values: Vec<f64> = bucket.iter().filter_map(|r| r.metric(metric)).collect();
            bounds_violations += values
                .iter()
                .filter(|&&v| !self.parameters.is_within_bounds(metric, v))
                .count();

            if let Some(metric_stats) = reduce_values(&mut values) {
                stats.insert(metric, metric_stats);
            }
        }

        AggregateRecord {
            station_id: station.to_string(),
            window_start,
            window_end: window_start + self.window,
            count: bucket.len(),
            stats,
            bounds_violations,
        }
    }
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self {
            parameters: Arc::new(ParameterModel::default()),
            window: Duration::seconds(DEFAULT_WINDOW_SECS as i64),
            window_micros: DEFAULT_WINDOW_SECS as i64 * MICROS_PER_SECOND,
            max_workers: num_cpus::get(),
        }
    }
}

/// Mean, min and max of `values`, or `None` when empty. Sorts in place.
fn reduce_values(values: &mut [f64]) -> Option<MetricStats> {
    values.sort_by(|a, b| a.total_cmp(b));
    let min = *values.first()?;
    let max = *values.last()?;
    let n = values.len() as f64;
    let mut avg = neumaier_sum(values.iter().copied()) / n;
    if !avg.is_finite() {
        // The sum overflowed; average the pre-scaled values instead.
        avg = neumaier_sum(values.iter().map(|v| v / n));
    }
    Some(MetricStats {
        avg: avg.clamp(min, max),
        min,
        max,
    })
}

fn neumaier_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut compensation = 0.0;
    for value in values {
        let t = sum + value;
        if f64::abs(sum) >= f64::abs(value) {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
    }
    sum + compensation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metric;
    use pretty_assertions::assert_eq;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn record(station: &str, ice: f64, timestamp: DateTime<Utc>) -> TelemetryRecord {
        TelemetryRecord::builder()
            .station_id(station)
            .ice_thickness(ice)
            .surface_temperature(-5.0)
            .snow_accumulation(2.0)
            .external_temperature(-10.0)
            .timestamp(timestamp)
            .build()
            .unwrap()
    }

    fn aggregator() -> WindowAggregator {
        WindowAggregator::with_window_secs(Arc::new(ParameterModel::default()), 300).unwrap()
    }

    #[test]
    fn test_window_start_floors_to_boundary() {
        let agg = aggregator();
        assert_eq!(
            agg.window_start(at("2025-01-15T12:04:59.999999Z")).unwrap(),
            at("2025-01-15T12:00:00Z")
        );
        assert_eq!(
            agg.window_start(at("2025-01-15T12:05:00Z")).unwrap(),
            at("2025-01-15T12:05:00Z")
        );
    }

    #[test]
    fn test_window_start_before_epoch() {
        let agg = aggregator();
        assert_eq!(
            agg.window_start(at("1969-12-31T23:58:00Z")).unwrap(),
            at("1969-12-31T23:55:00Z")
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = WindowAggregator::with_window_secs(Arc::new(ParameterModel::default()), 0);
        assert!(matches!(result, Err(TelemetryError::Config(_))));
    }

    #[test]
    fn test_boundary_record_opens_next_window() {
        let records = vec![
            record("NAC", 20.0, at("2025-01-15T12:04:59Z")),
            record("NAC", 30.0, at("2025-01-15T12:05:00Z")),
        ];
        let aggregates = aggregator().aggregate(&records).unwrap();

        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates[1].window_start, at("2025-01-15T12:05:00Z"));
        assert_eq!(aggregates[1].window_end, at("2025-01-15T12:10:00Z"));
        assert_eq!(aggregates[1].avg(Metric::IceThickness), Some(30.0));
    }

    #[test]
    fn test_bucket_statistics() {
        let base = at("2025-01-15T12:00:00Z");
        let records: Vec<_> = [18.0, 22.0, 35.0]
            .iter()
            .enumerate()
            .map(|(i, &ice)| record("Fifth Avenue", ice, base + Duration::seconds(10 * i as i64)))
            .collect();

        let aggregates = aggregator().aggregate(&records).unwrap();
        assert_eq!(aggregates.len(), 1);

        let ice = aggregates[0].stat(Metric::IceThickness).unwrap();
        assert_eq!(ice.min, 18.0);
        assert_eq!(ice.max, 35.0);
        assert_eq!(ice.avg, 25.0);
        assert_eq!(aggregates[0].count, 3);
        assert!(!aggregates[0].is_suspect());
    }

    #[test]
    fn test_out_of_bounds_values_kept_and_flagged() {
        let base = at("2025-01-15T12:00:00Z");
        let records = vec![record("NAC", 20.0, base), record("NAC", 60.0, base)];

        let aggregates = aggregator().aggregate(&records).unwrap();
        assert_eq!(aggregates[0].max(Metric::IceThickness), Some(60.0));
        assert_eq!(aggregates[0].bounds_violations, 1);
        assert!(aggregates[0].is_suspect());
    }

    #[test]
    fn test_duplicates_count_separately() {
        let base = at("2025-01-15T12:00:00Z");
        let records = vec![record("NAC", 20.0, base), record("NAC", 20.0, base)];
        let aggregates = aggregator().aggregate(&records).unwrap();
        assert_eq!(aggregates[0].count, 2);
    }

    #[test]
    fn test_order_independent_results() {
        let base = at("2025-01-15T12:00:00Z");
        let values = [0.1, 1e15, 0.2, -1e15, 0.3, 17.7, 33.3];
        let forward: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| record("NAC", v, base + Duration::seconds(i as i64)))
            .collect();
        let mut backward = forward.clone();
        backward.reverse();

        let a = aggregator().aggregate(&forward).unwrap();
        let b = aggregator().aggregate(&backward).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let base = at("2025-01-15T12:00:00Z");
        let mut records = Vec::new();
        for station in ["Dow's Lake", "Fifth Avenue", "NAC"] {
            for i in 0..40 {
                records.push(record(
                    station,
                    15.0 + (i % 25) as f64,
                    base + Duration::seconds(17 * i),
                ));
            }
        }

        let sequential = aggregator().aggregate(&records).unwrap();
        let parallel = aggregator().with_max_workers(4).aggregate(&records).unwrap();
        assert_eq!(sequential, parallel);
        assert!(sequential.iter().all(|a| a
            .stats
            .values()
            .all(|s| s.is_ordered())));
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregator().aggregate(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_neumaier_recovers_small_terms() {
        let mut values = vec![1.0, 1e100, 1.0, -1e100];
        assert_eq!(neumaier_sum(values.iter().copied()), 2.0);
        let stats = reduce_values(&mut values).unwrap();
        assert_eq!(stats.min, -1e100);
        assert!(stats.is_ordered());
    }

    #[test]
    fn test_overflowing_sum_keeps_finite_mean() {
        let base = at("2025-01-15T12:00:00Z");
        let records = vec![record("NAC", 1.7e308, base), record("NAC", 1.7e308, base)];

        let aggregates = aggregator().aggregate(&records).unwrap();
        let ice = aggregates[0].stat(Metric::IceThickness).unwrap();
        assert_eq!(ice.avg, 1.7e308);
        assert!(ice.is_ordered());
        assert!(aggregates[0].is_suspect());

        let line = aggregates[0].to_json_line().unwrap();
        let parsed = AggregateRecord::from_json_line(&line).unwrap();
        assert_eq!(parsed.stat(Metric::IceThickness), Some(ice));

        let mut mixed = vec![f64::MAX, f64::MAX, -1.0];
        let stats = reduce_values(&mut mixed).unwrap();
        assert!(stats.avg.is_finite());
        assert!(stats.is_ordered());
    }
}

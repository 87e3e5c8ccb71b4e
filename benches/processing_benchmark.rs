use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skateway_telemetry::models::{AggregateRecord, ParameterModel, TelemetryRecord};
use skateway_telemetry::processors::{IntegrityChecker, WindowAggregator};
use skateway_telemetry::readers::RawRecordReader;
use std::sync::Arc;

// Readings at a 30 s cadence starting 2025-01-15 00:00 UTC
fn create_test_records(station_count: usize, readings: usize) -> Vec<TelemetryRecord> {
    let base = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
    let mut records = Vec::with_capacity(station_count * readings);

    for station in 0..station_count {
        for i in 0..readings {
            let at = base + Duration::seconds(30 * i as i64);
            let drift = (i % 40) as f64 * 0.1;
            records.push(
                TelemetryRecord::builder()
                    .station_id(format!("Station {}", station))
                    .ice_thickness(25.0 + drift)
                    .surface_temperature(-5.0 - drift)
                    .snow_accumulation(drift)
                    .external_temperature(-12.0 + drift)
                    .timestamp(at)
                    .build()
                    .unwrap(),
            );
        }
    }

    records
}

fn create_test_blobs(station_count: usize, readings: usize) -> Vec<(String, String)> {
    let records = create_test_records(station_count, readings);
    records
        .chunks(readings)
        .enumerate()
        .map(|(station, chunk)| {
            let body: String = chunk
                .iter()
                .map(|r| format!("{}\n", r.to_json_line().unwrap()))
                .collect();
            (format!("station-{}-2025011500.json", station), body)
        })
        .collect()
}

fn benchmark_record_reader(c: &mut Criterion) {
    let blobs = create_test_blobs(10, 1_000);
    let reader = RawRecordReader::new(Arc::new(ParameterModel::default()));

    c.bench_function("record_reader", |b| {
        b.iter(|| {
            let outcome = reader.read_payloads(blobs.iter().map(|(n, body)| (n, body.as_bytes())));
            black_box(outcome.records.len())
        })
    });
}

fn benchmark_window_aggregator(c: &mut Criterion) {
    let records = create_test_records(10, 1_000);
    let aggregator = WindowAggregator::default();

    c.bench_function("window_aggregator", |b| {
        b.iter(|| {
            let aggregates = aggregator.aggregate(black_box(&records)).unwrap();
            black_box(aggregates.len())
        })
    });
}

fn benchmark_integrity_checker(c: &mut Criterion) {
    let records = create_test_records(10, 1_000);
    let aggregator = WindowAggregator::default();
    let aggregates: Vec<AggregateRecord> = aggregator.aggregate(&records).unwrap();

    c.bench_function("integrity_checker", |b| {
        b.iter(|| {
            let checker = IntegrityChecker::new(aggregator.window());
            let report = checker.check_integrity(&aggregates, &[]);
            black_box(report.total_aggregates)
        })
    });
}

fn benchmark_worker_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation_by_workers");
    let records = create_test_records(50, 1_000);

    for &workers in &[1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("workers", workers),
            &workers,
            |b, &max_workers| {
                let aggregator = WindowAggregator::default().with_max_workers(max_workers);
                b.iter(|| {
                    let aggregates = aggregator.aggregate(&records).unwrap();
                    black_box(aggregates.len())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_record_reader,
    benchmark_window_aggregator,
    benchmark_integrity_checker,
    benchmark_worker_counts
);
criterion_main!(benches);

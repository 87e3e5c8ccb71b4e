use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::models::AggregateRecord;
use crate::readers::{Diagnostic, DiagnosticKind};

#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub total_aggregates: usize,
    pub valid_aggregates: usize,
    pub suspect_aggregates: usize,
    pub invalid_aggregates: usize,
    pub violations: Vec<AggregateViolation>,
    pub station_statistics: BTreeMap<String, StationStatistics>,
    pub parse_errors: usize,
    pub validation_errors: usize,
    pub unreadable_blobs: usize,
    pub truncated: bool,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.invalid_aggregates == 0
            && self.suspect_aggregates == 0
            && self.parse_errors == 0
            && self.validation_errors == 0
            && self.unreadable_blobs == 0
    }

    pub fn diagnostic_count(&self) -> usize {
        self.parse_errors + self.validation_errors + self.unreadable_blobs
    }
}

#[derive(Debug, Clone)]
pub struct AggregateViolation {
    pub station_id: String,
    pub window_start: DateTime<Utc>,
    pub violation_type: ViolationType,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationType {
    EmptyWindow,
    StatisticsOutOfOrder,
    WindowSizeMismatch,
    OutOfBounds,
}

#[derive(Debug, Clone, Default)]
pub struct StationStatistics {
    pub windows: usize,
    pub observations: usize,
    pub suspect_windows: usize,
    pub first_window: Option<DateTime<Utc>>,
    pub last_window: Option<DateTime<Utc>>,
}

/// Re-checks aggregate invariants and folds in reader diagnostics.
/// Reports problems; never rejects data.
pub struct IntegrityChecker {
    window: Duration,
}

impl IntegrityChecker {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn check_integrity(
        &self,
        aggregates: &[AggregateRecord],
        diagnostics: &[Diagnostic],
    ) -> IntegrityReport {
        let mut report = IntegrityReport {
            total_aggregates: aggregates.len(),
            ..Default::default()
        };

        for aggregate in aggregates {
            let violations_before = report.violations.len();
            self.check_aggregate(aggregate, &mut report);
            let invalid = report.violations.len() > violations_before;

            if invalid {
                report.invalid_aggregates += 1;
            } else if aggregate.is_suspect() {
                report.suspect_aggregates += 1;
                report.violations.push(AggregateViolation {
                    station_id: aggregate.station_id.clone(),
                    window_start: aggregate.window_start,
                    violation_type: ViolationType::OutOfBounds,
                    details: format!(
                        "{} values outside configured bounds",
                        aggregate.bounds_violations
                    ),
                });
            } else {
                report.valid_aggregates += 1;
            }

            let stats = report
                .station_statistics
                .entry(aggregate.station_id.clone())
                .or_default();
            stats.windows += 1;
            stats.observations += aggregate.count;
            if aggregate.is_suspect() {
                stats.suspect_windows += 1;
            }
            stats.first_window = Some(
                stats
                    .first_window
                    .map_or(aggregate.window_start, |t| t.min(aggregate.window_start)),
            );
            stats.last_window = Some(
                stats
                    .last_window
                    .map_or(aggregate.window_start, |t| t.max(aggregate.window_start)),
            );
        }

        for diagnostic in diagnostics {
            match diagnostic.kind {
                DiagnosticKind::Parse => report.parse_errors += 1,
                DiagnosticKind::Validation => report.validation_errors += 1,
                DiagnosticKind::Unreadable => report.unreadable_blobs += 1,
            }
        }

        report
    }

    fn check_aggregate(&self, aggregate: &AggregateRecord, report: &mut IntegrityReport) {
        let mut flag = |violation_type, details: String| {
            report.violations.push(AggregateViolation {
                station_id: aggregate.station_id.clone(),
                window_start: aggregate.window_start,
                violation_type,
                details,
            });
        };

        if aggregate.count == 0 {
            flag(ViolationType::EmptyWindow, "window has no observations".to_string());
        }

        if aggregate.window_size() != self.window {
            flag(
                ViolationType::WindowSizeMismatch,
                format!(
                    "window spans {}s, expected {}s",
                    aggregate.window_size().num_seconds(),
                    self.window.num_seconds()
                ),
            );
        }

        for (metric, stats) in &aggregate.stats {
            if !stats.is_ordered() {
                flag(
                    ViolationType::StatisticsOutOfOrder,
                    format!(
                        "{}: min {} avg {} max {} out of order",
                        metric, stats.min, stats.avg, stats.max
                    ),
                );
            }
        }
    }

    /// Generate a summary report
    pub fn generate_summary(&self, report: &IntegrityReport) -> String {
        let percent = |n: usize| {
            if report.total_aggregates == 0 {
                0.0
            } else {
                100.0 * n as f64 / report.total_aggregates as f64
            }
        };

        let mut summary = String::new();

        summary.push_str("=== Integrity Check Report ===\n");
        summary.push_str(&format!("Total Windows: {}\n", report.total_aggregates));
        summary.push_str(&format!(
            "Valid Windows: {} ({:.1}%)\n",
            report.valid_aggregates,
            percent(report.valid_aggregates)
        ));
        summary.push_str(&format!(
            "Suspect Windows: {} ({:.1}%)\n",
            report.suspect_aggregates,
            percent(report.suspect_aggregates)
        ));
        summary.push_str(&format!(
            "Invalid Windows: {} ({:.1}%)\n",
            report.invalid_aggregates,
            percent(report.invalid_aggregates)
        ));
        summary.push_str(&format!(
            "\nSkipped Input: {} parse errors, {} validation errors, {} unreadable blobs\n",
            report.parse_errors, report.validation_errors, report.unreadable_blobs
        ));
        if report.truncated {
            summary.push_str("Input truncated at the blob limit\n");
        }

        if !report.station_statistics.is_empty() {
            summary.push_str("\nStations:\n");
            for (station, stats) in &report.station_statistics {
                summary.push_str(&format!(
                    "  {}: {} windows, {} observations, {} suspect\n",
                    station, stats.windows, stats.observations, stats.suspect_windows
                ));
            }
        }

        if !report.violations.is_empty() {
            summary.push_str("\nTop 10 Violations:\n");
            for (i, violation) in report.violations.iter().take(10).enumerate() {
                summary.push_str(&format!(
                    "  {}. Station {} at {}: {}\n",
                    i + 1,
                    violation.station_id,
                    violation.window_start.to_rfc3339(),
                    violation.details
                ));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metric, MetricStats};
    use chrono::TimeZone;

    fn aggregate(avg: f64, violations: usize) -> AggregateRecord {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let mut stats = BTreeMap::new();
        stats.insert(
            Metric::IceThickness,
            MetricStats {
                avg,
                min: 20.0,
                max: 30.0,
            },
        );
        AggregateRecord {
            station_id: "NAC".to_string(),
            window_start: start,
            window_end: start + Duration::minutes(5),
            count: 4,
            stats,
            bounds_violations: violations,
        }
    }

    #[test]
    fn test_classifies_windows() {
        let checker = IntegrityChecker::new(Duration::minutes(5));
        let diagnostics = vec![Diagnostic {
            kind: DiagnosticKind::Parse,
            blob: "nac.json".to_string(),
            line: Some(3),
            message: "EOF while parsing".to_string(),
        }];

        let report = checker.check_integrity(
            &[aggregate(25.0, 0), aggregate(25.0, 2), aggregate(35.0, 0)],
            &diagnostics,
        );

        assert_eq!(report.valid_aggregates, 1);
        assert_eq!(report.suspect_aggregates, 1);
        assert_eq!(report.invalid_aggregates, 1);
        assert_eq!(report.parse_errors, 1);
        assert_eq!(report.station_statistics["NAC"].observations, 12);
        assert!(!report.is_clean());

        let text = checker.generate_summary(&report);
        assert!(text.contains("Total Windows: 3"));
        assert!(text.contains("out of order"));
    }

    #[test]
    fn test_window_size_mismatch() {
        let checker = IntegrityChecker::new(Duration::minutes(1));
        let report = checker.check_integrity(&[aggregate(25.0, 0)], &[]);
        assert_eq!(report.invalid_aggregates, 1);
        assert_eq!(
            report.violations[0].violation_type,
            ViolationType::WindowSizeMismatch
        );
    }

    #[test]
    fn test_empty_report_summary() {
        let checker = IntegrityChecker::new(Duration::minutes(5));
        let report = checker.check_integrity(&[], &[]);
        assert!(report.is_clean());
        assert!(checker.generate_summary(&report).contains("Valid Windows: 0 (0.0%)"));
    }
}

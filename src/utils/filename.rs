use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use std::path::PathBuf;

/// Generate default aggregate output filename: skateway-aggregates-{YYMMDD}.jsonl
pub fn generate_default_aggregate_filename() -> PathBuf {
    let now = Local::now();
    let filename = format!("skateway-aggregates-{}.jsonl", yymmdd(&now));
    PathBuf::from("output").join(filename)
}

/// Generate default summary filename: skateway-summary-{YYMMDD}.csv
pub fn generate_default_summary_filename() -> PathBuf {
    let now = Local::now();
    let filename = format!("skateway-summary-{}.csv", yymmdd(&now));
    PathBuf::from("output").join(filename)
}

/// Hourly raw blob name for a station: {slug}-{YYYYMMDDHH}.json
pub fn hourly_blob_name(slug: &str, at: &DateTime<Utc>) -> String {
    format!(
        "{}-{:04}{:02}{:02}{:02}.json",
        slug,
        at.year(),
        at.month(),
        at.day(),
        at.hour()
    )
}

fn yymmdd<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    let year = now.year() % 100; // Get last 2 digits of year
    format!("{:02}{:02}{:02}", year, now.month(), now.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_default_aggregate_filename() {
        let filename = generate_default_aggregate_filename();
        let filename_str = filename.to_string_lossy();

        assert!(filename_str.starts_with("output/"));
        assert!(filename_str.contains("skateway-aggregates-"));
        assert!(filename_str.ends_with(".jsonl"));
    }

    #[test]
    fn test_generate_default_summary_filename() {
        let filename = generate_default_summary_filename();
        let filename_str = filename.to_string_lossy();

        assert!(filename_str.contains("skateway-summary-"));
        assert!(filename_str.ends_with(".csv"));
    }

    #[test]
    fn test_hourly_blob_name() {
        let at = Utc.with_ymd_and_hms(2025, 2, 3, 7, 59, 59).unwrap();
        assert_eq!(hourly_blob_name("dows-lake", &at), "dows-lake-2025020307.json");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, TelemetryError};
use crate::models::parameters::{Metric, ParameterModel};

/// One reading from one station at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub station_id: String,
    pub metrics: BTreeMap<Metric, f64>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    pub fn new(
        station_id: impl Into<String>,
        metrics: BTreeMap<Metric, f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let station_id = station_id.into();
        if station_id.trim().is_empty() {
            return Err(TelemetryError::MissingData("location".to_string()));
        }
        if let Some((metric, value)) = metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TelemetryError::InvalidRecord(format!(
                "{} is not a finite number: {}",
                metric.wire_name(),
                value
            )));
        }
        Ok(Self {
            station_id,
            metrics,
            timestamp,
        })
    }

    pub fn builder() -> TelemetryRecordBuilder {
        TelemetryRecordBuilder::new()
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    /// True when every declared metric is present.
    pub fn covers(&self, model: &ParameterModel) -> bool {
        model.metrics().all(|m| self.metrics.contains_key(&m))
    }

    /// Metrics whose value lies outside the model bounds.
    pub fn out_of_bounds(&self, model: &ParameterModel) -> Vec<Metric> {
        self.metrics
            .iter()
            .filter(|(m, v)| !model.is_within_bounds(**m, **v))
            .map(|(m, _)| *m)
            .collect()
    }

    /// Serialize as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(&TelemetryWire::from(self))?)
    }
}

/// Telemetry JSON line as published to the collector.
///
/// Every field is optional so a line with missing data still deserializes
/// and can be reported field by field. Unknown keys added by the collector
/// are ignored.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ice_thickness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snow_accumulation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TelemetryWire {
    fn slot(&mut self, metric: Metric) -> &mut Option<f64> {
        match metric {
            Metric::IceThickness => &mut self.ice_thickness,
            Metric::SurfaceTemperature => &mut self.surface_temperature,
            Metric::SnowAccumulation => &mut self.snow_accumulation,
            Metric::ExternalTemperature => &mut self.external_temperature,
        }
    }

    /// Convert into a record carrying exactly the metrics the model declares.
    pub fn into_record(mut self, model: &ParameterModel) -> Result<TelemetryRecord> {
        let mut builder = TelemetryRecord::builder();
        for metric in model.metrics() {
            let value = self
                .slot(metric)
                .take()
                .ok_or_else(|| TelemetryError::MissingData(metric.wire_name().to_string()))?;
            builder = builder.metric(metric, value);
        }
        if let Some(location) = self.location {
            builder = builder.station_id(location);
        }
        if let Some(timestamp) = self.timestamp {
            builder = builder.timestamp(timestamp);
        }
        builder.build()
    }
}

impl From<&TelemetryRecord> for TelemetryWire {
    fn from(record: &TelemetryRecord) -> Self {
        let mut wire = TelemetryWire {
            location: Some(record.station_id.clone()),
            timestamp: Some(record.timestamp),
            ..Default::default()
        };
        for (metric, value) in &record.metrics {
            *wire.slot(*metric) = Some(*value);
        }
        wire
    }
}

#[derive(Debug, Default)]
pub struct TelemetryRecordBuilder {
    station_id: Option<String>,
    metrics: BTreeMap<Metric, f64>,
    timestamp: Option<DateTime<Utc>>,
}

impl TelemetryRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn station_id(mut self, id: impl Into<String>) -> Self {
        self.station_id = Some(id.into());
        self
    }

    pub fn metric(mut self, metric: Metric, value: f64) -> Self {
        self.metrics.insert(metric, value);
        self
    }

    pub fn ice_thickness(self, value: f64) -> Self {
        self.metric(Metric::IceThickness, value)
    }

    pub fn surface_temperature(self, value: f64) -> Self {
        self.metric(Metric::SurfaceTemperature, value)
    }

    pub fn snow_accumulation(self, value: f64) -> Self {
        self.metric(Metric::SnowAccumulation, value)
    }

    pub fn external_temperature(self, value: f64) -> Self {
        self.metric(Metric::ExternalTemperature, value)
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> Result<TelemetryRecord> {
        TelemetryRecord::new(
            self.station_id
                .ok_or_else(|| TelemetryError::MissingData("location".to_string()))?,
            self.metrics,
            self.timestamp
                .ok_or_else(|| TelemetryError::MissingData("timestamp".to_string()))?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_builder_pattern() {
        let record = TelemetryRecord::builder()
            .station_id("Dow's Lake")
            .ice_thickness(27.3)
            .surface_temperature(-4.2)
            .snow_accumulation(3.0)
            .external_temperature(-8.9)
            .timestamp(sample_time())
            .build()
            .unwrap();

        assert_eq!(record.station_id, "Dow's Lake");
        assert_eq!(record.metric(Metric::IceThickness), Some(27.3));
        assert!(record.covers(&ParameterModel::default()));
        assert!(record.out_of_bounds(&ParameterModel::default()).is_empty());
    }

    #[test]
    fn test_missing_station_rejected() {
        let result = TelemetryRecord::builder()
            .ice_thickness(20.0)
            .timestamp(sample_time())
            .build();
        assert!(matches!(result, Err(TelemetryError::MissingData(_))));

        let blank = TelemetryRecord::builder()
            .station_id("  ")
            .timestamp(sample_time())
            .build();
        assert!(blank.is_err());
    }

    #[test]
    fn test_out_of_bounds_metrics_reported() {
        let record = TelemetryRecord::builder()
            .station_id("NAC")
            .ice_thickness(55.0)
            .surface_temperature(-4.0)
            .timestamp(sample_time())
            .build()
            .unwrap();
        assert_eq!(
            record.out_of_bounds(&ParameterModel::default()),
            vec![Metric::IceThickness]
        );
        assert!(!record.covers(&ParameterModel::default()));
    }

    #[test]
    fn test_wire_shape() {
        let record = TelemetryRecord::builder()
            .station_id("NAC")
            .ice_thickness(20.0)
            .snow_accumulation(1.5)
            .timestamp(sample_time())
            .build()
            .unwrap();

        let line = record.to_json_line().unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["location"], "NAC");
        assert_eq!(value["iceThickness"], 20.0);
        assert_eq!(value["snowAccumulation"], 1.5);
        assert!(value.get("surfaceTemperature").is_none());

        let stamp: DateTime<Utc> = value["timestamp"].as_str().unwrap().parse().unwrap();
        assert_eq!(stamp, sample_time());
    }

    #[test]
    fn test_wire_into_record_requires_declared_metrics() {
        let line = r#"{"location":"NAC","iceThickness":21.0,"surfaceTemperature":-3.0,
            "snowAccumulation":2.0,"timestamp":"2025-01-15T12:00:00.123456+00:00"}"#;
        let wire: TelemetryWire = serde_json::from_str(line).unwrap();
        let err = wire.into_record(&ParameterModel::default()).unwrap_err();
        assert!(err.to_string().contains("externalTemperature"));
    }

    #[test]
    fn test_wire_ignores_unknown_fields() {
        let line = r#"{"location":"NAC","iceThickness":21.0,"surfaceTemperature":-3.0,
            "snowAccumulation":2.0,"externalTemperature":-9.5,
            "timestamp":"2025-01-15T12:00:00Z","EventProcessedUtcTime":"x"}"#;
        let wire: TelemetryWire = serde_json::from_str(line).unwrap();
        let record = wire.into_record(&ParameterModel::default()).unwrap();
        assert_eq!(record.timestamp, sample_time());
        assert_eq!(record.metrics.len(), 4);
    }
}

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::error::{Result, TelemetryError};

/// The environmental metrics reported by every skateway station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    // Lowercase aliases: the `config` crate folds keys to lowercase.
    #[serde(alias = "icethickness")]
    IceThickness,
    #[serde(alias = "surfacetemperature")]
    SurfaceTemperature,
    #[serde(alias = "snowaccumulation")]
    SnowAccumulation,
    #[serde(alias = "externaltemperature")]
    ExternalTemperature,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::IceThickness,
        Metric::SurfaceTemperature,
        Metric::SnowAccumulation,
        Metric::ExternalTemperature,
    ];

    /// Key used for this metric in telemetry JSON lines.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Metric::IceThickness => "iceThickness",
            Metric::SurfaceTemperature => "surfaceTemperature",
            Metric::SnowAccumulation => "snowAccumulation",
            Metric::ExternalTemperature => "externalTemperature",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Metric::ALL.into_iter().find(|m| m.wire_name() == name)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Metric::IceThickness => "Ice Thickness",
            Metric::SurfaceTemperature => "Surface Temperature",
            Metric::SnowAccumulation => "Snow Accumulation",
            Metric::ExternalTemperature => "External Temperature",
        }
    }

    pub fn units(&self) -> &'static str {
        match self {
            Metric::IceThickness | Metric::SnowAccumulation => "cm",
            Metric::SurfaceTemperature | Metric::ExternalTemperature => "°C",
        }
    }

    /// Reference sampling range and precision.
    pub fn default_range(&self) -> MetricRange {
        match self {
            Metric::IceThickness => MetricRange::new(15.0, 40.0, 1),
            Metric::SurfaceTemperature => MetricRange::new(-15.0, 0.0, 1),
            Metric::SnowAccumulation => MetricRange::new(0.0, 15.0, 1),
            Metric::ExternalTemperature => MetricRange::new(-20.0, 5.0, 1),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,

    #[validate(range(max = 9))]
    #[serde(default = "default_precision")]
    pub precision: u32,
}

fn default_precision() -> u32 {
    1
}

impl MetricRange {
    pub fn new(min: f64, max: f64, precision: u32) -> Self {
        Self {
            min,
            max,
            precision,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Round half away from zero to the configured number of decimals.
    pub fn round(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.precision as i32);
        (value * scale).round() / scale
    }

    /// Draw a uniform sample in `[min, max]` rounded to precision.
    ///
    /// Rounding can push a sample past an endpoint that is not itself a
    /// multiple of the precision step, so the result is clamped back.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let raw = if self.min == self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        };
        let rounded = self.round(raw);
        if rounded < self.min {
            self.round_up(self.min)
        } else if rounded > self.max {
            self.round_down(self.max)
        } else {
            rounded
        }
    }

    fn round_up(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.precision as i32);
        (value * scale).ceil() / scale
    }

    fn round_down(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.precision as i32);
        (value * scale).floor() / scale
    }

    fn check(&self, metric: Metric) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(TelemetryError::InvalidParameter {
                metric: metric.wire_name().to_string(),
                message: "bounds must be finite".to_string(),
            });
        }
        if self.min > self.max {
            return Err(TelemetryError::InvalidParameter {
                metric: metric.wire_name().to_string(),
                message: format!("minimum {} exceeds maximum {}", self.min, self.max),
            });
        }
        self.validate()?;
        Ok(())
    }
}

/// Sampling range and precision per metric. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Metric, MetricRange>",
    into = "BTreeMap<Metric, MetricRange>"
)]
pub struct ParameterModel {
    ranges: BTreeMap<Metric, MetricRange>,
}

impl ParameterModel {
    pub fn new(ranges: BTreeMap<Metric, MetricRange>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(TelemetryError::Config(
                "parameter model must declare at least one metric".to_string(),
            ));
        }
        for (metric, range) in &ranges {
            range.check(*metric)?;
        }
        Ok(Self { ranges })
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricRange> {
        self.ranges.get(&metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        self.ranges.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &MetricRange)> {
        self.ranges.iter().map(|(m, r)| (*m, r))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_within_bounds(&self, metric: Metric, value: f64) -> bool {
        self.ranges.get(&metric).map_or(true, |r| r.contains(value))
    }
}

impl Default for ParameterModel {
    fn default() -> Self {
        Self {
            ranges: Metric::ALL
                .into_iter()
                .map(|m| (m, m.default_range()))
                .collect(),
        }
    }
}

impl TryFrom<BTreeMap<Metric, MetricRange>> for ParameterModel {
    type Error = TelemetryError;

    fn try_from(ranges: BTreeMap<Metric, MetricRange>) -> Result<Self> {
        ParameterModel::new(ranges)
    }
}

impl From<ParameterModel> for BTreeMap<Metric, MetricRange> {
    fn from(model: ParameterModel) -> Self {
        model.ranges
    }
}

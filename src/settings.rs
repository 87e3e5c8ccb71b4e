use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::error::{Result, TelemetryError};
use crate::models::{Metric, MetricRange, ParameterModel, StationConfig, TransportConfig};
use crate::simulation::PublishPolicy;
use crate::utils::constants::{
    DEFAULT_BLOB_SUFFIX, DEFAULT_CADENCE_SECS, DEFAULT_MAX_BLOBS, DEFAULT_RAW_DIR,
    DEFAULT_STATIONS, DEFAULT_WINDOW_SECS, SETTINGS_ENV_PREFIX, SETTINGS_ENV_SEPARATOR,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SimulationSettings {
    #[validate(range(min = 1, max = 86400))]
    pub cadence_secs: u64,

    /// End a station after this many consecutive publish failures; unset skips them.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub fail_after: Option<u32>,

    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationSettings {
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }

    pub fn publish_policy(&self) -> PublishPolicy {
        PublishPolicy::from_fail_after(self.fail_after)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AggregationSettings {
    #[validate(range(min = 1, max = 86400))]
    pub window_secs: u64,

    /// 0 reads every blob.
    pub max_blobs: usize,

    pub blob_suffix: String,

    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl AggregationSettings {
    pub fn max_blobs(&self) -> Option<usize> {
        (self.max_blobs > 0).then_some(self.max_blobs)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Process-wide settings: stations, parameter ranges, simulation cadence
/// and aggregation windowing.
///
/// Layered from built-in defaults, an optional TOML file, then
/// `SKATEWAY__SECTION__KEY` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub stations: Vec<StationConfig>,
    pub parameters: BTreeMap<Metric, MetricRange>,
    pub simulation: SimulationSettings,
    pub aggregation: AggregationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stations: DEFAULT_STATIONS
                .iter()
                .map(|id| {
                    StationConfig::new(
                        *id,
                        TransportConfig::File {
                            directory: PathBuf::from(DEFAULT_RAW_DIR),
                        },
                    )
                })
                .collect(),
            parameters: ParameterModel::default().into(),
            simulation: SimulationSettings {
                cadence_secs: DEFAULT_CADENCE_SECS,
                fail_after: None,
                seed: None,
            },
            aggregation: AggregationSettings {
                window_secs: DEFAULT_WINDOW_SECS,
                max_blobs: DEFAULT_MAX_BLOBS,
                blob_suffix: DEFAULT_BLOB_SUFFIX.to_string(),
                max_workers: None,
            },
        }
    }
}

impl Settings {
    /// Load defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = serde_json::to_string(&Settings::default())?;

        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));
        if let Some(path) = path {
            if !path.exists() {
                return Err(TelemetryError::Config(format!(
                    "settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix(SETTINGS_ENV_PREFIX)
                .prefix_separator(SETTINGS_ENV_SEPARATOR)
                .separator(SETTINGS_ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    /// Validate every section and the parameter ranges.
    pub fn check(&self) -> Result<()> {
        if self.stations.is_empty() {
            return Err(TelemetryError::Config("no stations configured".to_string()));
        }
        for station in &self.stations {
            station.validate()?;
        }
        self.simulation.validate()?;
        self.aggregation.validate()?;
        self.parameter_model()?;
        Ok(())
    }

    pub fn parameter_model(&self) -> Result<ParameterModel> {
        ParameterModel::new(self.parameters.clone())
    }

    /// Keep only the named stations, in the order given.
    pub fn select_stations(&self, ids: &[String]) -> Result<Vec<StationConfig>> {
        if ids.is_empty() {
            return Ok(self.stations.clone());
        }
        ids.iter()
            .map(|id| {
                self.stations
                    .iter()
                    .find(|s| &s.id == id)
                    .cloned()
                    .ok_or_else(|| TelemetryError::Config(format!("unknown station: {}", id)))
            })
            .collect()
    }
}

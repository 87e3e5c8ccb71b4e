use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// How a station reaches the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Append JSON lines to hourly blob files in a directory.
    File { directory: PathBuf },
    /// Write JSON lines to standard output.
    Stdout,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::File {
            directory: PathBuf::from(crate::utils::constants::DEFAULT_RAW_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StationConfig {
    #[validate(length(min = 1))]
    pub id: String,

    #[serde(default)]
    pub transport: TransportConfig,
}

impl StationConfig {
    pub fn new(id: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            id: id.into(),
            transport,
        }
    }

    /// File-name friendly form of the station id ("Dow's Lake" -> "dows-lake").
    pub fn slug(&self) -> String {
        slugify(&self.id)
    }
}

pub fn slugify(id: &str) -> String {
    let mut slug = String::with_capacity(id.len());
    for ch in id.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "station".to_string()
    } else {
        trimmed.to_string()
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelemetryError>;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Station {station} could not connect: {message}")]
    Connection { station: String, message: String },

    #[error("Station {station} failed to publish: {message}")]
    Publish { station: String, message: String },

    #[error("Could not parse line {line} of {source_name}: {message}")]
    Parse {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid parameter for {metric}: {message}")]
    InvalidParameter { metric: String, message: String },

    #[error("Blob store unavailable: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Simulation cancelled")]
    Cancelled,

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl TelemetryError {
    pub fn connection(station: &str, message: impl Into<String>) -> Self {
        TelemetryError::Connection {
            station: station.to_string(),
            message: message.into(),
        }
    }

    pub fn publish(station: &str, message: impl Into<String>) -> Self {
        TelemetryError::Publish {
            station: station.to_string(),
            message: message.into(),
        }
    }
}

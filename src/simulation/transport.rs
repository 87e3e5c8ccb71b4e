use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Result, TelemetryError};
use crate::models::{StationConfig, TelemetryRecord, TransportConfig};
use crate::utils::filename::hourly_blob_name;

/// An open connection for one station identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub station_id: String,
    pub opened_at: DateTime<Utc>,
}

impl Session {
    pub fn open(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            opened_at: Utc::now(),
        }
    }
}

/// Confirmation that one record was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// 1-based count of records accepted on this session.
    pub sequence: u64,
    pub destination: String,
}

/// Publishes telemetry for a single station.
///
/// A simulator owns its transport exclusively. `disconnect` is called once
/// for every session `connect` returned, and never for a failed connect.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, station: &StationConfig) -> Result<Session>;

    async fn publish(&mut self, session: &Session, record: &TelemetryRecord) -> Result<Ack>;

    async fn disconnect(&mut self, session: Session);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn connect(&mut self, station: &StationConfig) -> Result<Session> {
        (**self).connect(station).await
    }

    async fn publish(&mut self, session: &Session, record: &TelemetryRecord) -> Result<Ack> {
        (**self).publish(session, record).await
    }

    async fn disconnect(&mut self, session: Session) {
        (**self).disconnect(session).await
    }
}

/// Appends records as JSON lines to hourly blob files in a directory, the
/// same layout the aggregation side reads back.
pub struct FileTransport {
    directory: PathBuf,
    slug: String,
    sequence: u64,
}

impl FileTransport {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            slug: String::new(),
            sequence: 0,
        }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn connect(&mut self, station: &StationConfig) -> Result<Session> {
        fs::create_dir_all(&self.directory).await.map_err(|e| {
            TelemetryError::connection(
                &station.id,
                format!("cannot create {}: {}", self.directory.display(), e),
            )
        })?;
        self.slug = station.slug();
        self.sequence = 0;
        Ok(Session::open(&station.id))
    }

    async fn publish(&mut self, session: &Session, record: &TelemetryRecord) -> Result<Ack> {
        let path = self
            .directory
            .join(hourly_blob_name(&self.slug, &record.timestamp));
        let mut line = record.to_json_line()?;
        line.push('\n');

        let write = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        };
        write
            .await
            .map_err(|e| TelemetryError::publish(&session.station_id, e.to_string()))?;

        self.sequence += 1;
        Ok(Ack {
            sequence: self.sequence,
            destination: path.display().to_string(),
        })
    }

    async fn disconnect(&mut self, session: Session) {
        debug!(
            "Closed file session for {} after {} records",
            session.station_id, self.sequence
        );
    }
}

/// Writes records as JSON lines to standard output.
#[derive(Default)]
pub struct StdoutTransport {
    sequence: u64,
}

impl StdoutTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for StdoutTransport {
    async fn connect(&mut self, station: &StationConfig) -> Result<Session> {
        self.sequence = 0;
        Ok(Session::open(&station.id))
    }

    async fn publish(&mut self, session: &Session, record: &TelemetryRecord) -> Result<Ack> {
        let mut line = record.to_json_line()?;
        line.push('\n');

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TelemetryError::publish(&session.station_id, e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| TelemetryError::publish(&session.station_id, e.to_string()))?;

        self.sequence += 1;
        Ok(Ack {
            sequence: self.sequence,
            destination: "stdout".to_string(),
        })
    }

    async fn disconnect(&mut self, _session: Session) {}
}

/// Forwards records to an in-process consumer.
pub struct ChannelTransport {
    sender: mpsc::Sender<TelemetryRecord>,
    sequence: u64,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<TelemetryRecord>) -> Self {
        Self {
            sender,
            sequence: 0,
        }
    }

    /// Transport plus the receiving end, with room for `capacity` records.
    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<TelemetryRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self, station: &StationConfig) -> Result<Session> {
        if self.sender.is_closed() {
            return Err(TelemetryError::connection(&station.id, "receiver is closed"));
        }
        self.sequence = 0;
        Ok(Session::open(&station.id))
    }

    async fn publish(&mut self, session: &Session, record: &TelemetryRecord) -> Result<Ack> {
        self.sender
            .send(record.clone())
            .await
            .map_err(|_| TelemetryError::publish(&session.station_id, "receiver is closed"))?;

        self.sequence += 1;
        Ok(Ack {
            sequence: self.sequence,
            destination: "channel".to_string(),
        })
    }

    async fn disconnect(&mut self, _session: Session) {}
}

/// Builds the transport a station publishes through.
pub trait TransportFactory: Send + Sync {
    fn create(&self, station: &StationConfig) -> Result<Box<dyn Transport>>;
}

/// Builds transports from each station's [`TransportConfig`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, station: &StationConfig) -> Result<Box<dyn Transport>> {
        let transport: Box<dyn Transport> = match &station.transport {
            TransportConfig::File { directory } => {
                info!(
                    "Station {} publishes to {}",
                    station.id,
                    directory.display()
                );
                Box::new(FileTransport::new(directory.clone()))
            }
            TransportConfig::Stdout => Box::new(StdoutTransport::new()),
        };
        Ok(transport)
    }
}

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TelemetryError};
use crate::models::{ParameterModel, StationConfig, TelemetryRecord};
use crate::simulation::transport::{Ack, Session, Transport};
use crate::utils::constants::DEFAULT_CADENCE_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StationState {
    Idle,
    Connected,
    Emitting,
    Disconnected,
}

impl fmt::Display for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StationState::Idle => "idle",
            StationState::Connected => "connected",
            StationState::Emitting => "emitting",
            StationState::Disconnected => "disconnected",
        };
        write!(f, "{}", name)
    }
}

/// What a station does when the transport rejects a record.
///
/// The rejected tick is never retried; the next record is produced on the
/// next cadence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishPolicy {
    /// Log, count and keep emitting.
    #[default]
    Skip,
    /// End the run after this many consecutive failures.
    FailAfter(u32),
}

impl PublishPolicy {
    pub fn from_fail_after(fail_after: Option<u32>) -> Self {
        match fail_after {
            Some(n) if n > 0 => PublishPolicy::FailAfter(n),
            _ => PublishPolicy::Skip,
        }
    }
}

/// Cooperative stop signal shared by one or more simulators.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one station run.
#[derive(Debug)]
pub struct StationReport {
    pub station_id: String,
    pub ticks: u64,
    pub acks: u64,
    pub publish_failures: u64,
    pub final_state: StationState,
    pub error: Option<TelemetryError>,
}

impl StationReport {
    fn new(station_id: &str) -> Self {
        Self {
            station_id: station_id.to_string(),
            ticks: 0,
            acks: 0,
            publish_failures: 0,
            final_state: StationState::Idle,
            error: None,
        }
    }

    /// Report for a run that ended abnormally before producing its own.
    pub fn aborted(station_id: &str, error: TelemetryError) -> Self {
        Self {
            final_state: StationState::Disconnected,
            error: Some(error),
            ..Self::new(station_id)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.final_state == StationState::Disconnected
    }
}

/// Emits synthetic telemetry for one station on a fixed cadence.
pub struct StationSimulator {
    station: StationConfig,
    parameters: Arc<ParameterModel>,
    transport: Box<dyn Transport>,
    cadence: Duration,
    policy: PublishPolicy,
    rng: StdRng,
    state: watch::Sender<StationState>,
    report: StationReport,
}

impl StationSimulator {
    pub fn new(
        station: StationConfig,
        parameters: Arc<ParameterModel>,
        transport: Box<dyn Transport>,
    ) -> Self {
        let (state, _) = watch::channel(StationState::Idle);
        let report = StationReport::new(&station.id);
        Self {
            station,
            parameters,
            transport,
            cadence: Duration::from_secs(DEFAULT_CADENCE_SECS),
            policy: PublishPolicy::default(),
            rng: StdRng::from_entropy(),
            state,
            report,
        }
    }

    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn station(&self) -> &StationConfig {
        &self.station
    }

    /// Live view of the lifecycle state.
    pub fn state(&self) -> watch::Receiver<StationState> {
        self.state.subscribe()
    }

    /// Sample one reading, stamped with the current UTC time.
    pub fn generate(&mut self) -> Result<TelemetryRecord> {
        let mut builder = TelemetryRecord::builder()
            .station_id(self.station.id.clone())
            .timestamp(Utc::now());
        for (metric, range) in self.parameters.iter() {
            builder = builder.metric(metric, range.sample(&mut self.rng));
        }
        builder.build()
    }

    /// Produce and publish one record.
    pub async fn tick(&mut self, session: &Session) -> Result<Ack> {
        self.report.ticks += 1;
        let record = self.generate()?;
        debug!("{} payload: {}", self.station.id, record.to_json_line()?);
        self.transport.publish(session, &record).await
    }

    /// Connect, emit until cancelled or failed, then disconnect.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> StationReport {
        let session = match self.transport.connect(&self.station).await {
            Ok(session) => session,
            Err(e) => {
                error!("Station {} failed to connect: {}", self.station.id, e);
                self.set_state(StationState::Disconnected);
                self.report.error = Some(e);
                return self.report;
            }
        };
        info!("Station {} connected", self.station.id);
        self.set_state(StationState::Connected);

        let outcome = self.emit(&session, &mut cancel).await;

        self.transport.disconnect(session).await;
        self.set_state(StationState::Disconnected);
        info!(
            "Station {} disconnected after {} ticks ({} sent, {} failed)",
            self.station.id, self.report.ticks, self.report.acks, self.report.publish_failures
        );

        if let Err(e) = outcome {
            error!("Station {} stopped: {}", self.station.id, e);
            self.report.error = Some(e);
        }
        self.report
    }

    async fn emit(&mut self, session: &Session, cancel: &mut watch::Receiver<bool>) -> Result<()> {
        self.set_state(StationState::Emitting);
        let mut consecutive_failures = 0u32;

        loop {
            if *cancel.borrow() {
                return Ok(());
            }

            match self.tick(session).await {
                Ok(ack) => {
                    consecutive_failures = 0;
                    self.report.acks += 1;
                    info!(
                        "{} sent message #{} to {}",
                        self.station.id, ack.sequence, ack.destination
                    );
                }
                Err(e @ TelemetryError::Publish { .. }) => {
                    consecutive_failures += 1;
                    self.report.publish_failures += 1;
                    warn!("{}", e);
                    if let PublishPolicy::FailAfter(limit) = self.policy {
                        if consecutive_failures >= limit {
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.cadence) => {}
                // A dropped handle can never cancel again, so treat it as a stop.
                _ = cancel.changed() => return Ok(()),
            }
        }
    }

    fn set_state(&mut self, state: StationState) {
        self.report.final_state = state;
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metric, TransportConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        connects: AtomicUsize,
        publishes: AtomicUsize,
        disconnects: AtomicUsize,
    }

    struct FakeTransport {
        calls: Arc<Calls>,
        refuse_connect: bool,
        fail_publish: bool,
    }

    impl FakeTransport {
        fn new(refuse_connect: bool, fail_publish: bool) -> (Self, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            let transport = Self {
                calls: calls.clone(),
                refuse_connect,
                fail_publish,
            };
            (transport, calls)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&mut self, station: &StationConfig) -> Result<Session> {
            self.calls.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse_connect {
                return Err(TelemetryError::connection(&station.id, "unreachable"));
            }
            Ok(Session::open(&station.id))
        }

        async fn publish(&mut self, session: &Session, _record: &TelemetryRecord) -> Result<Ack> {
            let n = self.calls.publishes.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            if self.fail_publish {
                return Err(TelemetryError::publish(&session.station_id, "rejected"));
            }
            Ok(Ack {
                sequence: n,
                destination: "fake".to_string(),
            })
        }

        async fn disconnect(&mut self, _session: Session) {
            self.calls.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn simulator(transport: FakeTransport) -> StationSimulator {
        StationSimulator::new(
            StationConfig::new("NAC", TransportConfig::Stdout),
            Arc::new(ParameterModel::default()),
            Box::new(transport),
        )
        .with_cadence(Duration::from_millis(10))
        .with_seed(7)
    }

    #[test]
    fn test_generated_values_within_bounds() {
        let (transport, _) = FakeTransport::new(false, false);
        let mut sim = simulator(transport);
        let model = ParameterModel::default();

        for _ in 0..500 {
            let record = sim.generate().unwrap();
            assert!(record.covers(&model));
            assert!(record.out_of_bounds(&model).is_empty());
            for metric in Metric::ALL {
                let value = record.metric(metric).unwrap();
                assert_eq!(value, (value * 10.0).round() / 10.0);
            }
        }
    }

    #[test]
    fn test_seeded_streams_repeat() {
        let (a, _) = FakeTransport::new(false, false);
        let (b, _) = FakeTransport::new(false, false);
        let mut first = simulator(a);
        let mut second = simulator(b);

        for _ in 0..20 {
            assert_eq!(first.generate().unwrap().metrics, second.generate().unwrap().metrics);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_until_cancelled() {
        let (transport, calls) = FakeTransport::new(false, false);
        let sim = simulator(transport);
        let state = sim.state();
        let cancel = CancelHandle::new();

        let task = tokio::spawn(sim.run(cancel.subscribe()));
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(*state.borrow(), StationState::Emitting);

        cancel.cancel();
        let report = task.await.unwrap();

        assert!(report.is_success());
        assert!(report.ticks >= 1);
        assert_eq!(report.acks, report.ticks);
        assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(*state.borrow(), StationState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_publish_still_disconnects() {
        let (transport, calls) = FakeTransport::new(false, true);
        let sim = simulator(transport);
        let cancel = CancelHandle::new();

        let task = tokio::spawn(sim.run(cancel.subscribe()));
        tokio::time::sleep(Duration::from_millis(45)).await;
        cancel.cancel();
        let report = task.await.unwrap();

        assert_eq!(report.final_state, StationState::Disconnected);
        assert_eq!(report.acks, 0);
        assert!(report.publish_failures >= 1);
        assert_eq!(report.publish_failures, report.ticks);
        assert!(report.error.is_none());
        assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_after_policy_stops_run() {
        let (transport, calls) = FakeTransport::new(false, true);
        let sim = simulator(transport).with_policy(PublishPolicy::FailAfter(3));
        let cancel = CancelHandle::new();

        let report = sim.run(cancel.subscribe()).await;

        assert_eq!(report.ticks, 3);
        assert!(matches!(report.error, Some(TelemetryError::Publish { .. })));
        assert_eq!(report.final_state, StationState::Disconnected);
        assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_skips_disconnect() {
        let (transport, calls) = FakeTransport::new(true, false);
        let sim = simulator(transport);
        let cancel = CancelHandle::new();

        let report = sim.run(cancel.subscribe()).await;

        assert!(matches!(report.error, Some(TelemetryError::Connection { .. })));
        assert_eq!(report.final_state, StationState::Disconnected);
        assert_eq!(report.ticks, 0);
        assert_eq!(calls.disconnects.load(Ordering::SeqCst), 0);
        assert_eq!(calls.publishes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start_emits_nothing() {
        let (transport, calls) = FakeTransport::new(false, false);
        let cancel = CancelHandle::new();
        cancel.cancel();

        let report = simulator(transport).run(cancel.subscribe()).await;

        assert_eq!(report.ticks, 0);
        assert!(report.is_success());
        assert_eq!(calls.connects.load(Ordering::SeqCst), 1);
        assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_from_settings() {
        assert_eq!(PublishPolicy::from_fail_after(None), PublishPolicy::Skip);
        assert_eq!(PublishPolicy::from_fail_after(Some(0)), PublishPolicy::Skip);
        assert_eq!(
            PublishPolicy::from_fail_after(Some(5)),
            PublishPolicy::FailAfter(5)
        );
    }
}

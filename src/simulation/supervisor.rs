use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::TelemetryError;
use crate::models::{ParameterModel, StationConfig};
use crate::simulation::simulator::{
    CancelHandle, PublishPolicy, StationReport, StationSimulator, StationState,
};
use crate::simulation::transport::TransportFactory;
use crate::utils::constants::DEFAULT_CADENCE_SECS;

/// A station that ended its run with an unrecoverable error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFailure {
    pub station_id: String,
    pub error: String,
}

/// Runs one simulator task per station and isolates their failures.
///
/// A failed station is recorded and left stopped; its siblings keep
/// emitting. Without [`shutdown_all`](Self::shutdown_all) healthy stations
/// run indefinitely.
pub struct SimulationSupervisor {
    parameters: Arc<ParameterModel>,
    factory: Arc<dyn TransportFactory>,
    cadence: Duration,
    policy: PublishPolicy,
    seed: Option<u64>,
    cancel: CancelHandle,
    tasks: JoinSet<StationReport>,
    states: BTreeMap<String, watch::Receiver<StationState>>,
    failures: Arc<Mutex<Vec<StationFailure>>>,
}

impl SimulationSupervisor {
    pub fn new(parameters: Arc<ParameterModel>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            parameters,
            factory,
            cadence: Duration::from_secs(DEFAULT_CADENCE_SECS),
            policy: PublishPolicy::default(),
            seed: None,
            cancel: CancelHandle::new(),
            tasks: JoinSet::new(),
            states: BTreeMap::new(),
            failures: Arc::new(Mutex::new(Vec::new())),
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

    /// Seed every station's generator; station `i` uses `seed + i`.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Handle that stops every station started by this supervisor.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Spawn a simulator per station.
    ///
    /// A station whose transport cannot be built is recorded as failed and
    /// does not prevent the others from starting.
    pub fn start(&mut self, stations: Vec<StationConfig>) {
        for (index, station) in stations.into_iter().enumerate() {
            let transport = match self.factory.create(&station) {
                Ok(transport) => transport,
                Err(e) => {
                    error!("Station {} not started: {}", station.id, e);
                    record_failure(&self.failures, &station.id, &e);
                    continue;
                }
            };

            let mut simulator =
                StationSimulator::new(station, self.parameters.clone(), transport)
                    .with_cadence(self.cadence)
                    .with_policy(self.policy);
            if let Some(seed) = self.seed {
                simulator = simulator.with_seed(seed.wrapping_add(index as u64));
            }

            let station_id = simulator.station().id.clone();
            self.states.insert(station_id.clone(), simulator.state());

            let cancel = self.cancel.subscribe();
            let failures = self.failures.clone();
            self.tasks.spawn(async move {
                // Inner task so a panic is attributed to its station.
                let report = match tokio::spawn(simulator.run(cancel)).await {
                    Ok(report) => report,
                    Err(join_error) => {
                        StationReport::aborted(&station_id, TelemetryError::TaskJoin(join_error))
                    }
                };
                if let Some(e) = &report.error {
                    record_failure(&failures, &station_id, e);
                }
                report
            });
        }
        info!("Started {} station simulators", self.tasks.len());
    }

    /// Current lifecycle state per station.
    pub fn states(&self) -> BTreeMap<String, StationState> {
        self.states
            .iter()
            .map(|(id, rx)| (id.clone(), *rx.borrow()))
            .collect()
    }

    /// Failures recorded so far.
    pub fn failures(&self) -> Vec<StationFailure> {
        lock(&self.failures).clone()
    }

    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every station and wait for each to disconnect.
    pub async fn shutdown_all(&mut self) -> Vec<StationReport> {
        info!("Shutting down {} stations", self.tasks.len());
        self.cancel.cancel();
        self.join_all().await
    }

    /// Wait for every station to finish on its own.
    pub async fn wait(&mut self) -> Vec<StationReport> {
        self.join_all().await
    }

    async fn join_all(&mut self) -> Vec<StationReport> {
        let mut reports = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                // The wrapper never panics; the outer task can only fail by abort.
                Err(e) => warn!("Station task aborted: {}", e),
            }
        }
        reports.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        reports
    }
}

fn lock(failures: &Mutex<Vec<StationFailure>>) -> MutexGuard<'_, Vec<StationFailure>> {
    failures.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn record_failure(failures: &Mutex<Vec<StationFailure>>, station_id: &str, e: &TelemetryError) {
    lock(failures).push(StationFailure {
        station_id: station_id.to_string(),
        error: e.to_string(),
    });
}

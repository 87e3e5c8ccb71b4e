pub mod simulator;
pub mod supervisor;
pub mod transport;

pub use simulator::{CancelHandle, PublishPolicy, StationReport, StationSimulator, StationState};
pub use supervisor::{SimulationSupervisor, StationFailure};
pub use transport::{
    Ack, ChannelTransport, DefaultTransportFactory, FileTransport, Session, StdoutTransport,
    Transport, TransportFactory,
};

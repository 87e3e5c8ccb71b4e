pub mod aggregate;
pub mod parameters;
pub mod station;
pub mod telemetry;

pub use aggregate::{AggregateRecord, AggregateWire, MetricStats};
pub use parameters::{Metric, MetricRange, ParameterModel};
pub use station::{StationConfig, TransportConfig};
pub use telemetry::{TelemetryRecord, TelemetryRecordBuilder, TelemetryWire};

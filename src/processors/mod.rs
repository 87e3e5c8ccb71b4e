pub mod integrity_checker;
pub mod pipeline;
pub mod window_aggregator;

pub use integrity_checker::{
    AggregateViolation, IntegrityChecker, IntegrityReport, StationStatistics, ViolationType,
};
pub use pipeline::{AggregationPipeline, PipelineOutput};
pub use window_aggregator::WindowAggregator;

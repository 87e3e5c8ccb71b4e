pub mod constants;
pub mod filename;
pub mod logging;
pub mod progress;

pub use constants::*;
pub use filename::{
    generate_default_aggregate_filename, generate_default_summary_filename, hourly_blob_name,
};
pub use logging::init_logging;
pub use progress::ProgressReporter;

pub mod aggregate_writer;
pub mod csv_writer;

pub use aggregate_writer::{read_aggregates, AggregateFileInfo, AggregateWriter};
pub use csv_writer::SummaryCsvWriter;

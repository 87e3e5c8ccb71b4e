pub mod record_reader;

pub use record_reader::{Diagnostic, DiagnosticKind, RawRecordReader, ReadOutcome};

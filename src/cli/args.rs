use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skateway-telemetry")]
#[command(about = "Skateway station telemetry simulator and windowed aggregator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Settings file (TOML)")]
    pub config: Option<PathBuf>,
}

/// Where raw telemetry blobs are read from.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct InputSource {
    #[arg(short, long, help = "Directory of raw telemetry blobs")]
    pub input_dir: Option<PathBuf>,

    #[arg(short = 'a', long, help = "Zip archive of raw telemetry blobs")]
    pub input_archive: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the station simulators until Ctrl-C or the duration elapses
    Simulate {
        #[arg(short, long, help = "Stop after this many seconds")]
        duration_secs: Option<u64>,

        #[arg(short, long = "station", help = "Only run these stations (repeatable)")]
        stations: Vec<String>,

        #[arg(long, help = "Seed for reproducible readings")]
        seed: Option<u64>,

        #[arg(long, help = "Seconds between readings")]
        cadence_secs: Option<u64>,
    },

    /// Aggregate raw telemetry into fixed windows
    Aggregate {
        #[command(flatten)]
        input: InputSource,

        #[arg(
            short,
            long,
            help = "Output aggregates file [default: output/skateway-aggregates-{YYMMDD}.jsonl]"
        )]
        output_file: Option<PathBuf>,

        #[arg(
            long,
            num_args = 0..=1,
            help = "Also write a per-station summary CSV [default: output/skateway-summary-{YYMMDD}.csv]"
        )]
        summary_file: Option<Option<PathBuf>>,

        #[arg(short, long, help = "Window size in seconds")]
        window_secs: Option<u64>,

        #[arg(long, help = "Maximum blobs to read (0 = all)")]
        max_blobs: Option<usize>,

        #[arg(long)]
        max_workers: Option<usize>,

        #[arg(long, default_value = "false")]
        validate_only: bool,
    },

    /// Read raw telemetry and report skipped lines without aggregating
    Validate {
        #[command(flatten)]
        input: InputSource,

        #[arg(long, help = "Maximum blobs to read (0 = all)")]
        max_blobs: Option<usize>,
    },

    /// Summarize an aggregates file per station
    Summarize {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "10")]
        sample: usize,

        #[arg(long, help = "Write the station summary as CSV")]
        csv: Option<PathBuf>,
    },
}

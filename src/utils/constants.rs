/// Reference stations along the skateway
pub const DEFAULT_STATIONS: [&str; 3] = ["Dow's Lake", "Fifth Avenue", "NAC"];

/// Simulation defaults
pub const DEFAULT_CADENCE_SECS: u64 = 10;
pub const DEFAULT_RAW_DIR: &str = "data/raw";

/// Aggregation defaults
pub const DEFAULT_WINDOW_SECS: u64 = 300;
pub const DEFAULT_MAX_BLOBS: usize = 100;
pub const DEFAULT_BLOB_SUFFIX: &str = ".json";
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB

/// Blobs larger than this are memory-mapped when mmap reads are enabled
pub const MMAP_THRESHOLD_BYTES: u64 = 4 * 1024 * 1024;

/// Settings sources
pub const SETTINGS_ENV_PREFIX: &str = "SKATEWAY";
pub const SETTINGS_ENV_SEPARATOR: &str = "__";

/// Summary statistics are reported to two decimals
pub const SUMMARY_DECIMALS: u32 = 2;

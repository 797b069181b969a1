//! Binary telemetry for the kinet simulation kernel.
//!
//! Three pieces cooperate:
//! - [`TelemetryData`]: a registry of named int64/float64 signals and string
//!   constants. Producers hold stable slots they write each step.
//! - [`TelemetryRecorder`]: serializes one row per accepted integration
//!   step into fixed-size in-memory chunks, with a replayable header.
//! - [`LogData`]: the parsed, columnar form of a log, reconstructed either
//!   from the in-memory chunks or from a file on disk.
//!
//! The wire format is little-endian throughout; rows never straddle chunk
//! boundaries.

pub mod data;
pub mod log;
pub mod recorder;

use thiserror::Error;

pub use data::{FloatSlot, IntSlot, TelemetryData};
pub use log::LogData;
pub use recorder::TelemetryRecorder;

/// Version tag leading every log stream.
pub const TELEMETRY_VERSION: i32 = 1;

/// Section marker opening the constants block.
pub const START_CONSTANTS: &str = "START_CONSTANTS";

/// Section marker opening the column-name block.
pub const START_COLUMNS: &str = "START_COLUMNS";

/// Section marker opening the data block.
pub const START_DATA: &str = "START_DATA";

/// Token prefixed to every constant entry and every data row.
pub const START_LINE_TOKEN: &[u8] = b"\n";

/// Delimiter between a constant's key and value.
pub const CONSTANT_DELIMITER: &str = "=";

/// Minimum chunk size in bytes; the first chunk grows to fit the header.
pub const TELEMETRY_MIN_CHUNK_SIZE: usize = 256 * 1024;

/// Name of the mandatory time-quantization constant.
pub const TIME_UNIT_CONSTANT: &str = "Global.Time.Unit";

/// Name of the mandatory integer-section-size constant. Counts the time
/// column in addition to the registered integer signals.
pub const NUM_INT_ENTRIES_CONSTANT: &str = "Num.Int.Entries";

/// Name of the mandatory float-section-size constant.
pub const NUM_FLOAT_ENTRIES_CONSTANT: &str = "Num.Float.Entries";

/// Name of the implicit time column.
pub const GLOBAL_TIME_FIELDNAME: &str = "Global.Time";

/// Telemetry failure, tagged by the caller-facing semantic kind.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A precondition was violated (duplicate name, bad version, unreadable
    /// file, non-positive time unit).
    #[error("bad input: {0}")]
    BadInput(String),
    /// An operation ran outside its lifecycle window (register after
    /// freeze, double initialize).
    #[error("initialization failure: {0}")]
    InitFailed(String),
    /// A recoverable runtime failure.
    #[error("{0}")]
    Generic(String),
}

/// Convenience alias for telemetry results.
pub type Result<T> = std::result::Result<T, TelemetryError>;

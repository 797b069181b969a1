//! Chunked binary telemetry recorder.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::warn;

use kinet_math::STEPPER_MIN_TIMESTEP;

use crate::log::parse_log_data_raw;
use crate::{
    FloatSlot, IntSlot, LogData, Result, TelemetryData, TelemetryError,
    NUM_FLOAT_ENTRIES_CONSTANT, NUM_INT_ENTRIES_CONSTANT, START_LINE_TOKEN,
    TELEMETRY_MIN_CHUNK_SIZE, TIME_UNIT_CONSTANT,
};

/// A fixed-capacity in-memory buffer holding a contiguous run of log rows.
struct Chunk {
    buf: Vec<u8>,
    capacity: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        debug_assert!(self.buf.len() + bytes.len() <= self.capacity);
        self.buf.extend_from_slice(bytes);
    }

    fn used(&self) -> usize {
        self.buf.len()
    }
}

/// Records registered telemetry signals into in-memory chunks, one row per
/// accepted integration step.
///
/// `initialize` freezes the registry and writes the header; `append`
/// serializes one row; `write_log`/`get_log` export the accumulated data.
/// Chunks are sized so that a row never straddles a chunk boundary.
pub struct TelemetryRecorder {
    chunks: Vec<Chunk>,
    integers: Vec<(String, IntSlot)>,
    floats: Vec<(String, FloatSlot)>,
    time_unit_inv: f64,
    int_section_size: usize,
    float_section_size: usize,
    row_size: usize,
    header_size: usize,
    /// Byte capacity of the current chunk (header plus a whole number of
    /// rows for the first chunk, a whole number of rows afterwards).
    chunk_limit: usize,
    recorded_bytes: usize,
    is_initialized: bool,
}

impl TelemetryRecorder {
    /// Create an idle recorder.
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            integers: Vec::new(),
            floats: Vec::new(),
            time_unit_inv: 0.0,
            int_section_size: 0,
            float_section_size: 0,
            row_size: 0,
            header_size: 0,
            chunk_limit: 0,
            recorded_bytes: 0,
            is_initialized: false,
        }
    }

    /// Whether `initialize` has completed.
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Largest time loggable with the given quantization.
    pub fn max_log_time(time_unit: f64) -> f64 {
        i64::MAX as f64 * time_unit
    }

    /// Largest time loggable with this recorder's quantization.
    pub fn get_maximum_log_time(&self) -> f64 {
        Self::max_log_time(1.0 / self.time_unit_inv)
    }

    /// Freeze the registry, register the mandatory constants, snapshot the
    /// section layout, and write the header into a first chunk.
    ///
    /// On failure the recorder stays uninitialized.
    pub fn initialize(&mut self, data: &mut TelemetryData, time_unit: f64) -> Result<()> {
        if self.is_initialized {
            return Err(TelemetryError::InitFailed(
                "telemetry recorder already initialized".to_string(),
            ));
        }
        if time_unit <= 0.0 {
            return Err(TelemetryError::BadInput(
                "the time unit must be positive".to_string(),
            ));
        }

        // Log the time unit as a constant, with enough digits to resolve
        // the smallest stepper timestep
        self.time_unit_inv = 1.0 / time_unit;
        let precision = (-STEPPER_MIN_TIMESTEP.log10()).ceil() as usize;
        data.register_constant(TIME_UNIT_CONSTANT, &format!("{:.*e}", precision, time_unit))?;

        // Section sizes as constants, for streaming readers. The integer
        // count includes the implicit time column.
        data.register_constant(
            NUM_INT_ENTRIES_CONSTANT,
            &(data.num_ints() + 1).to_string(),
        )?;
        data.register_constant(NUM_FLOAT_ENTRIES_CONSTANT, &data.num_floats().to_string())?;
        data.freeze();

        // Snapshot the registry layout
        self.integers = data.integers().to_vec();
        self.floats = data.floats().to_vec();
        self.int_section_size = std::mem::size_of::<i64>() * self.integers.len();
        self.float_section_size = std::mem::size_of::<f64>() * self.floats.len();
        self.row_size = START_LINE_TOKEN.len()
            + std::mem::size_of::<i64>()
            + self.int_section_size
            + self.float_section_size;

        let header = data.format_header();
        self.header_size = header.len();

        self.chunks.clear();
        self.create_new_chunk();
        self.chunks[0].write(&header);
        self.recorded_bytes = self.header_size;

        self.is_initialized = true;
        Ok(())
    }

    /// Open a fresh chunk sized for a whole number of rows. Only the first
    /// chunk reserves room for the header.
    fn create_new_chunk(&mut self) {
        let header_contribution = if self.chunks.is_empty() {
            self.header_size
        } else {
            0
        };
        let max_buffer_size = TELEMETRY_MIN_CHUNK_SIZE.max(header_contribution);
        let max_rows = (max_buffer_size - header_contribution) / self.row_size;
        self.chunk_limit = header_contribution + max_rows * self.row_size;
        self.chunks.push(Chunk::new(self.chunk_limit));
        self.recorded_bytes = 0;
    }

    /// Serialize one data row at time `t` (seconds).
    pub fn append(&mut self, t: f64) -> Result<()> {
        if !self.is_initialized {
            return Err(TelemetryError::InitFailed(
                "telemetry recorder not initialized".to_string(),
            ));
        }

        if self.recorded_bytes == self.chunk_limit {
            self.create_new_chunk();
        }

        let chunk = self.chunks.last_mut().ok_or_else(|| {
            TelemetryError::Generic("no active telemetry chunk".to_string())
        })?;
        chunk.write(START_LINE_TOKEN);
        chunk.write(&((t * self.time_unit_inv).round() as i64).to_le_bytes());
        for (_, slot) in &self.integers {
            chunk.write(&slot.get().to_le_bytes());
        }
        for (_, slot) in &self.floats {
            chunk.write(&slot.get().to_le_bytes());
        }
        self.recorded_bytes += self.row_size;

        Ok(())
    }

    /// Concatenate all chunk payloads into one file.
    ///
    /// A failed write leaves any partial file in place.
    pub fn write_log<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path.as_ref()).map_err(|err| {
            warn!(error = %err, "could not create log file");
            TelemetryError::BadInput(format!(
                "impossible to create the log file ({err}); check that the folder exists and \
                 that you have writing permissions"
            ))
        })?;

        for chunk in &self.chunks {
            file.write_all(&chunk.buf)
                .map_err(|err| TelemetryError::Generic(format!("log write failed: {err}")))?;
        }
        file.flush()
            .map_err(|err| TelemetryError::Generic(format!("log write failed: {err}")))?;

        Ok(())
    }

    /// Parse the in-memory chunks back into columnar log data.
    pub fn get_log(&self) -> Result<LogData> {
        let flows: Vec<&[u8]> = self.chunks.iter().map(|c| c.buf.as_slice()).collect();
        parse_log_data_raw(
            &flows,
            self.int_section_size,
            self.float_section_size,
            self.header_size,
        )
    }

    /// Parse a log file written by [`TelemetryRecorder::write_log`].
    ///
    /// The section sizes are recovered from the mandatory constants, so no
    /// out-of-band layout information is needed.
    pub fn read_log<P: AsRef<Path>>(path: P) -> Result<LogData> {
        let bytes = std::fs::read(path.as_ref()).map_err(|err| {
            TelemetryError::BadInput(format!(
                "impossible to open the log file ({err}); check that the file exists and \
                 that you have reading permissions"
            ))
        })?;

        // Walk the NUL-terminated header strings to find the section sizes
        // and the header length
        let mut entries: Vec<String> = Vec::new();
        let mut pos = 4usize; // skip the version flag
        let mut header_size = None;
        while pos < bytes.len() {
            let end = match bytes[pos..].iter().position(|&b| b == 0) {
                Some(offset) => pos + offset,
                None => break,
            };
            let entry = String::from_utf8_lossy(&bytes[pos..end]).into_owned();
            let is_data_marker = entry == crate::START_DATA;
            entries.push(entry);
            pos = end + 1;
            if is_data_marker {
                header_size = Some(pos);
                break;
            }
        }
        let header_size = header_size.ok_or_else(|| {
            TelemetryError::BadInput("corrupted log file: no data section".to_string())
        })?;

        // The entry counts are the last two constants before the column
        // marker (each carries a leading line token, which the '=' split
        // ignores)
        let constants_start = entries
            .iter()
            .position(|e| e == crate::START_CONSTANTS)
            .ok_or_else(|| {
                TelemetryError::BadInput("corrupted log file: no constants section".to_string())
            })?;
        let columns_start = entries
            .iter()
            .position(|e| e == crate::START_COLUMNS)
            .ok_or_else(|| {
                TelemetryError::BadInput("corrupted log file: no columns section".to_string())
            })?;
        if columns_start < constants_start + 3 {
            return Err(TelemetryError::BadInput(
                "corrupted log file: missing entry-count constants".to_string(),
            ));
        }

        let parse_count = |entry: &str| -> Result<usize> {
            let value = entry
                .rsplit(crate::CONSTANT_DELIMITER)
                .next()
                .unwrap_or_default();
            value.parse::<usize>().map_err(|_| {
                TelemetryError::BadInput("corrupted entry-count constant".to_string())
            })
        };
        let num_int = parse_count(&entries[columns_start - 2])?;
        let num_float = parse_count(&entries[columns_start - 1])?;

        // Remove the implicit time column from the integer section
        let int_section_size = num_int.saturating_sub(1) * std::mem::size_of::<i64>();
        let float_section_size = num_float * std::mem::size_of::<f64>();

        parse_log_data_raw(
            &[bytes.as_slice()],
            int_section_size,
            float_section_size,
            header_size,
        )
    }

    /// Release all chunks and return to the uninitialized state.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.integers.clear();
        self.floats.clear();
        self.is_initialized = false;
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

//! Parsed log data and the binary log parser (inverse of the recorder).

use kinet_math::STEPPER_MIN_TIMESTEP;

use crate::{
    Result, TelemetryError, CONSTANT_DELIMITER, START_COLUMNS, START_CONSTANTS, START_DATA,
    START_LINE_TOKEN, TELEMETRY_VERSION, TIME_UNIT_CONSTANT,
};

/// Columnar, in-memory form of a telemetry log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogData {
    /// Format version read from the stream.
    pub version: i32,
    /// Constants in header order.
    pub constants: Vec<(String, String)>,
    /// Column names in header order (time column first).
    pub fieldnames: Vec<String>,
    /// Time quantization in seconds.
    pub time_unit: f64,
    /// Quantized timestamps, one per row.
    pub timestamps: Vec<i64>,
    /// Integer columns, one inner vector per registered int signal.
    pub int_data: Vec<Vec<i64>>,
    /// Float columns, one inner vector per registered float signal.
    pub float_data: Vec<Vec<f64>>,
}

impl LogData {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the log holds no rows.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// De-quantized timestamps in seconds.
    pub fn times(&self) -> Vec<f64> {
        self.timestamps
            .iter()
            .map(|&t| t as f64 * self.time_unit)
            .collect()
    }

    /// Look up a constant by key.
    pub fn constant(&self, key: &str) -> Option<&str> {
        self.constants
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn empty() -> Self {
        Self {
            version: TELEMETRY_VERSION,
            constants: Vec::new(),
            fieldnames: Vec::new(),
            time_unit: STEPPER_MIN_TIMESTEP,
            timestamps: Vec::new(),
            int_data: Vec::new(),
            float_data: Vec::new(),
        }
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_i64_le(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    i64::from_le_bytes(buf)
}

fn read_f64_le(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    f64::from_le_bytes(buf)
}

/// Parse a sequence of byte streams into a [`LogData`], given the section
/// sizes and the header length.
///
/// Only the first stream carries a header; the remaining streams are pure
/// data chunks. Within a chunk, a byte at an expected row start that is not
/// the first byte of the line token signals end-of-data (a pre-allocated
/// chunk may be partially filled).
pub(crate) fn parse_log_data_raw(
    flows: &[&[u8]],
    int_section_size: usize,
    float_section_size: usize,
    header_size: usize,
) -> Result<LogData> {
    if flows.is_empty() {
        return Ok(LogData::empty());
    }

    let header_flow = flows[0];
    if header_flow.len() < header_size || header_size < 4 {
        return Err(TelemetryError::BadInput(
            "truncated log header".to_string(),
        ));
    }

    // Version flag
    let version = i32::from_le_bytes(
        header_flow[0..4]
            .try_into()
            .map_err(|_| TelemetryError::BadInput("truncated log header".to_string()))?,
    );
    if version != TELEMETRY_VERSION {
        return Err(TelemetryError::BadInput(format!(
            "log telemetry version {version} not supported"
        )));
    }

    let header = &header_flow[4..header_size];

    // Constants section
    let mut constants = Vec::new();
    let mut pos = START_CONSTANTS.len() + 1 + START_LINE_TOKEN.len();
    if pos > header.len() {
        return Err(TelemetryError::BadInput(
            "truncated log header".to_string(),
        ));
    }
    loop {
        let (next, is_last) = match find_subsequence(&header[pos..], START_LINE_TOKEN) {
            Some(offset) => (offset, false),
            None => {
                let offset = find_subsequence(&header[pos..], START_COLUMNS.as_bytes())
                    .ok_or_else(|| {
                        TelemetryError::BadInput("corrupted constants section".to_string())
                    })?;
                (offset, true)
            }
        };

        let entry = &header[pos..pos + next];
        let delim = find_subsequence(entry, CONSTANT_DELIMITER.as_bytes()).ok_or_else(|| {
            TelemetryError::BadInput("corrupted constant entry".to_string())
        })?;
        let key = String::from_utf8_lossy(&entry[..delim]).into_owned();
        // Last byte of the entry is the NUL terminator
        let value =
            String::from_utf8_lossy(&entry[delim + CONSTANT_DELIMITER.len()..next - 1])
                .into_owned();
        constants.push((key, value));

        if is_last {
            pos += next + START_COLUMNS.len() + 1;
            break;
        }
        pos += next + START_LINE_TOKEN.len();
    }

    // Column names, up to the data marker
    let mut fieldnames = Vec::new();
    loop {
        let end = find_subsequence(&header[pos..], &[0]).ok_or_else(|| {
            TelemetryError::BadInput("corrupted fieldname section".to_string())
        })?;
        let name = String::from_utf8_lossy(&header[pos..pos + end]).into_owned();
        pos += end + 1;
        if name == START_DATA {
            break;
        }
        fieldnames.push(name);
    }

    // Time unit from the constants, with a defensive default
    let time_unit = constants
        .iter()
        .find(|(k, _)| k == TIME_UNIT_CONSTANT)
        .and_then(|(_, v)| v.parse::<f64>().ok())
        .unwrap_or(STEPPER_MIN_TIMESTEP);

    // Data rows
    let num_int = int_section_size / std::mem::size_of::<i64>();
    let num_float = float_section_size / std::mem::size_of::<f64>();
    let row_size = START_LINE_TOKEN.len() + std::mem::size_of::<i64>() + int_section_size
        + float_section_size;

    let mut timestamps = Vec::new();
    let mut int_data: Vec<Vec<i64>> = vec![Vec::new(); num_int];
    let mut float_data: Vec<Vec<f64>> = vec![Vec::new(); num_float];

    for (flow_idx, flow) in flows.iter().enumerate() {
        let data = if flow_idx == 0 {
            &flow[header_size..]
        } else {
            flow
        };

        // Pre-allocate for the rows this chunk can hold, shrink happens
        // implicitly when the chunk is partially filled
        let upper = data.len() / row_size;
        timestamps.reserve(upper);

        let mut offset = 0usize;
        while offset + row_size <= data.len() {
            if data[offset] != START_LINE_TOKEN[0] {
                break;
            }
            let mut cursor = offset + START_LINE_TOKEN.len();

            let time = read_i64_le(&data[cursor..]);
            cursor += 8;
            timestamps.push(time);

            for column in int_data.iter_mut() {
                column.push(read_i64_le(&data[cursor..]));
                cursor += 8;
            }
            for column in float_data.iter_mut() {
                column.push(read_f64_le(&data[cursor..]));
                cursor += 8;
            }

            offset += row_size;
        }
    }

    Ok(LogData {
        version,
        constants,
        fieldnames,
        time_unit,
        timestamps,
        int_data,
        float_data,
    })
}

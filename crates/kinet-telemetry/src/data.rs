//! Telemetry signal registry.

use std::cell::Cell;
use std::rc::Rc;

use crate::{
    Result, TelemetryError, CONSTANT_DELIMITER, GLOBAL_TIME_FIELDNAME, START_COLUMNS,
    START_CONSTANTS, START_DATA, START_LINE_TOKEN, TELEMETRY_VERSION,
};

/// Stable handle to a registered int64 signal. The producer writes it with
/// `Cell::set`; the recorder reads it at every append.
pub type IntSlot = Rc<Cell<i64>>;

/// Stable handle to a registered float64 signal.
pub type FloatSlot = Rc<Cell<f64>>;

/// Value kinds that can live in a telemetry registry.
pub trait TelemetryValue: Copy + Default + 'static {
    fn registry(data: &mut TelemetryData) -> &mut Vec<(String, Rc<Cell<Self>>)>;
}

impl TelemetryValue for i64 {
    fn registry(data: &mut TelemetryData) -> &mut Vec<(String, Rc<Cell<i64>>)> {
        &mut data.integers
    }
}

impl TelemetryValue for f64 {
    fn registry(data: &mut TelemetryData) -> &mut Vec<(String, Rc<Cell<f64>>)> {
        &mut data.floats
    }
}

/// Registry of named scalar signals and string constants.
///
/// Registration is open from construction (or `reset`) until `freeze`;
/// insertion order fixes the on-disk column order. Names are unique within
/// a kind.
pub struct TelemetryData {
    constants: Vec<(String, String)>,
    integers: Vec<(String, IntSlot)>,
    floats: Vec<(String, FloatSlot)>,
    registering_available: bool,
}

impl TelemetryData {
    /// Create an empty registry with the registration window open.
    pub fn new() -> Self {
        Self {
            constants: Vec::new(),
            integers: Vec::new(),
            floats: Vec::new(),
            registering_available: true,
        }
    }

    /// Drop everything and reopen the registration window. Previously
    /// handed-out slots are detached from the registry.
    pub fn reset(&mut self) {
        self.constants.clear();
        self.integers.clear();
        self.floats.clear();
        self.registering_available = true;
    }

    /// Whether registration is still open.
    pub fn is_registering_available(&self) -> bool {
        self.registering_available
    }

    /// Close the registration window. Further registrations fail.
    pub fn freeze(&mut self) {
        self.registering_available = false;
    }

    /// Register a string constant. Fails if the name already exists or the
    /// registration window is closed.
    pub fn register_constant(&mut self, name: &str, value: &str) -> Result<()> {
        if !self.registering_available {
            return Err(TelemetryError::InitFailed(format!(
                "cannot register constant '{name}': registration window is closed"
            )));
        }
        if self.constants.iter().any(|(k, _)| k == name) {
            return Err(TelemetryError::BadInput(format!(
                "constant '{name}' already registered"
            )));
        }
        self.constants.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Register a variable of the given kind, or fetch the existing slot.
    ///
    /// Re-registering an existing name returns the original slot and
    /// reports success. A new name is only accepted while the registration
    /// window is open.
    pub fn register_variable<T: TelemetryValue>(&mut self, name: &str) -> Result<Rc<Cell<T>>> {
        let registering = self.registering_available;
        let registry = T::registry(self);

        if let Some((_, slot)) = registry.iter().find(|(k, _)| k == name) {
            return Ok(Rc::clone(slot));
        }

        if !registering {
            return Err(TelemetryError::Generic(format!(
                "entry '{name}' not found and registration is not available"
            )));
        }

        let slot = Rc::new(Cell::new(T::default()));
        registry.push((name.to_string(), Rc::clone(&slot)));
        Ok(slot)
    }

    /// Registered string constants, in registration order.
    pub fn constants(&self) -> &[(String, String)] {
        &self.constants
    }

    /// Registered int64 signals, in registration order.
    pub fn integers(&self) -> &[(String, IntSlot)] {
        &self.integers
    }

    /// Registered float64 signals, in registration order.
    pub fn floats(&self) -> &[(String, FloatSlot)] {
        &self.floats
    }

    /// Number of registered int64 signals.
    pub fn num_ints(&self) -> usize {
        self.integers.len()
    }

    /// Number of registered float64 signals.
    pub fn num_floats(&self) -> usize {
        self.floats.len()
    }

    /// Serialize the header: version, constants, column names, and the
    /// data-section marker.
    ///
    /// Layout (little-endian, NUL-terminated strings):
    /// `version` `START_CONSTANTS\0` then one `\n key=value \0` entry per
    /// constant, `START_COLUMNS\0`, one `name\0` per column (the implicit
    /// time column first, then int columns, then float columns), and
    /// finally `START_DATA\0`.
    pub fn format_header(&self) -> Vec<u8> {
        let mut header = Vec::new();
        header.extend_from_slice(&TELEMETRY_VERSION.to_le_bytes());

        header.extend_from_slice(START_CONSTANTS.as_bytes());
        header.push(0);
        for (key, value) in &self.constants {
            header.extend_from_slice(START_LINE_TOKEN);
            header.extend_from_slice(key.as_bytes());
            header.extend_from_slice(CONSTANT_DELIMITER.as_bytes());
            header.extend_from_slice(value.as_bytes());
            header.push(0);
        }

        header.extend_from_slice(START_COLUMNS.as_bytes());
        header.push(0);
        header.extend_from_slice(GLOBAL_TIME_FIELDNAME.as_bytes());
        header.push(0);
        for (name, _) in &self.integers {
            header.extend_from_slice(name.as_bytes());
            header.push(0);
        }
        for (name, _) in &self.floats {
            header.extend_from_slice(name.as_bytes());
            header.push(0);
        }

        header.extend_from_slice(START_DATA.as_bytes());
        header.push(0);

        header
    }
}

impl Default for TelemetryData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_registration_is_idempotent() {
        let mut data = TelemetryData::new();
        let a = data.register_variable::<f64>("motor.torque").unwrap();
        let b = data.register_variable::<f64>("motor.torque").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(data.num_floats(), 1);
    }

    #[test]
    fn existing_variable_found_after_freeze() {
        let mut data = TelemetryData::new();
        let a = data.register_variable::<i64>("loop.iters").unwrap();
        data.freeze();
        let b = data.register_variable::<i64>("loop.iters").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn new_variable_rejected_after_freeze() {
        let mut data = TelemetryData::new();
        data.freeze();
        let err = data.register_variable::<f64>("late").unwrap_err();
        assert!(matches!(err, TelemetryError::Generic(_)));
        assert_eq!(data.num_floats(), 0);
    }

    #[test]
    fn duplicate_constant_rejected() {
        let mut data = TelemetryData::new();
        data.register_constant("robot.name", "atlas").unwrap();
        let err = data.register_constant("robot.name", "asimo").unwrap_err();
        assert!(matches!(err, TelemetryError::BadInput(_)));
        assert_eq!(data.constants().len(), 1);
    }

    #[test]
    fn constant_rejected_after_freeze() {
        let mut data = TelemetryData::new();
        data.freeze();
        let err = data.register_constant("late", "1").unwrap_err();
        assert!(matches!(err, TelemetryError::InitFailed(_)));
    }

    #[test]
    fn same_name_allowed_across_kinds() {
        let mut data = TelemetryData::new();
        data.register_variable::<i64>("count").unwrap();
        data.register_variable::<f64>("count").unwrap();
        assert_eq!(data.num_ints(), 1);
        assert_eq!(data.num_floats(), 1);
    }

    #[test]
    fn slots_feed_the_registry() {
        let mut data = TelemetryData::new();
        let slot = data.register_variable::<f64>("energy").unwrap();
        slot.set(42.5);
        assert_eq!(data.floats()[0].1.get(), 42.5);
    }

    #[test]
    fn reset_reopens_registration() {
        let mut data = TelemetryData::new();
        data.freeze();
        assert!(!data.is_registering_available());
        data.reset();
        assert!(data.is_registering_available());
        data.register_variable::<f64>("fresh").unwrap();
    }

    #[test]
    fn header_starts_with_version() {
        let data = TelemetryData::new();
        let header = data.format_header();
        let version = i32::from_le_bytes(header[0..4].try_into().unwrap());
        assert_eq!(version, TELEMETRY_VERSION);
    }
}

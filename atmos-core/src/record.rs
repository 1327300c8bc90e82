//! Telemetry record assembled at the end of each wake
//!
//! The record is the single input to every sink. It always exists, even when
//! detection or reading failed: missing sections are `None` and the reason is
//! listed in [`TelemetryRecord::diagnostics`].
//!
//! [`TelemetryRecord::fields`] flattens the record into canonically named,
//! pre-rounded fields. Sinks rename them (kebab-case feed keys, line protocol
//! field keys) but never recompute values.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::battery::BatteryState;
use crate::calibration::CalibrationOffsets;
use crate::derived::DerivedSample;
use crate::identity::IdentityTag;
use crate::reading::SensorReading;
use crate::time::Timestamp;

/// Why part of a record is missing or degraded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// No sensor answered detection
    SensorNotDetected,
    /// Sensor detected but every read attempt failed
    SensorReadFailed {
        /// Attempts made
        attempts: u32,
    },
    /// Offsets unavailable locally and remotely; identity offsets used
    CalibrationDegraded,
    /// Offsets fetched from the remote source this cycle
    CalibrationFetched,
    /// Fuel gauge unreadable
    BatteryUnavailable,
    /// Battery record computed but not committed
    BatteryNotPersisted,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SensorNotDetected => f.write_str("sensor not detected"),
            Diagnostic::SensorReadFailed { attempts } => write!(f, "sensor read failed after {attempts} attempts"),
            Diagnostic::CalibrationDegraded => f.write_str("calibration degraded to identity offsets"),
            Diagnostic::CalibrationFetched => f.write_str("calibration fetched from remote default"),
            Diagnostic::BatteryUnavailable => f.write_str("fuel gauge unavailable"),
            Diagnostic::BatteryNotPersisted => f.write_str("battery record not persisted"),
        }
    }
}

/// Value of one flattened field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Float to be rendered with a fixed number of decimals
    Float {
        /// Value as measured/derived
        value: f32,
        /// Decimals to render
        decimals: u8,
    },
    /// Integer
    Integer(i64),
    /// Free text
    Text(String),
}

impl FieldValue {
    const fn float(value: f32, decimals: u8) -> Self {
        FieldValue::Float { value, decimals }
    }
}

/// One flattened field with its canonical snake_case name
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Canonical name, e.g. `temperature_c`
    pub name: &'static str,
    /// Value
    pub value: FieldValue,
}

/// Everything one wake cycle reports
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Device identity tag
    pub identity: IdentityTag,
    /// Configured human readable name
    pub sensor_name: String,
    /// Firmware version
    pub firmware_version: String,
    /// Calibrated reading
    pub reading: Option<SensorReading>,
    /// Derived quantities of `reading`
    pub derived: Option<DerivedSample>,
    /// Battery state of this cycle
    pub battery: Option<BatteryState>,
    /// Offsets applied to `reading`
    pub calibration: CalibrationOffsets,
    /// Milliseconds since epoch (or boot, see `wall_clock`)
    pub timestamp_ms: Timestamp,
    /// Whether `timestamp_ms` is wall clock time
    pub wall_clock: bool,
    /// Degradations that happened this cycle
    pub diagnostics: Vec<Diagnostic>,
}

impl TelemetryRecord {
    /// Identity fields sent alongside the measurements
    pub fn identity_fields(&self) -> Vec<Field> {
        alloc::vec![
            Field { name: "sensor_name", value: FieldValue::Text(self.identity.display_name(&self.sensor_name)) },
            Field { name: "sensor_id", value: FieldValue::Text(self.identity.as_str().into()) },
            Field { name: "sensor_type", value: FieldValue::Text(self.identity.kind().name().into()) },
            Field { name: "fw_version", value: FieldValue::Text(self.firmware_version.clone()) },
        ]
    }

    /// Measurement, battery and calibration fields in canonical order
    ///
    /// Only fields whose value exists are emitted.
    pub fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        let mut push = |name: &'static str, value: Option<FieldValue>| {
            if let Some(value) = value {
                fields.push(Field { name, value });
            }
        };

        let reading = self.reading.as_ref();
        let derived = self.derived.as_ref();
        let fahrenheit = crate::derived::celsius_to_fahrenheit;

        push("temperature_c", reading.map(|r| FieldValue::float(r.temperature_c, 2)));
        push("temperature_f", derived.map(|d| FieldValue::float(d.temperature_f, 2)));
        push("dewpoint_c", derived.and_then(|d| d.dew_point_c).map(|v| FieldValue::float(v, 2)));
        push("dewpoint_f", derived.and_then(|d| d.dew_point_c).map(|v| FieldValue::float(fahrenheit(v), 2)));
        push("wetbulb_c", derived.and_then(|d| d.wet_bulb_c).map(|v| FieldValue::float(v, 2)));
        push("wetbulb_f", derived.and_then(|d| d.wet_bulb_c).map(|v| FieldValue::float(fahrenheit(v), 2)));
        push("humidity_pct", reading.and_then(|r| r.humidity_pct).map(|v| FieldValue::float(v, 2)));
        push("humidity_ratio_kgkg", derived.and_then(|d| d.humidity_ratio).map(|v| FieldValue::float(v, 5)));
        push("enthalpy_kjkg", derived.and_then(|d| d.enthalpy_kj_per_kg).map(|v| FieldValue::float(v, 2)));
        push("pressure_hpa", reading.and_then(|r| r.pressure_hpa).map(|v| FieldValue::float(v, 2)));
        push("altitude_m", derived.and_then(|d| d.altitude_m).map(|v| FieldValue::float(v, 2)));
        push("gas_ohms", reading.and_then(|r| r.gas_resistance_ohm).map(|v| FieldValue::Integer(libm::roundf(v) as i64)));
        push("gas_iaq_index", derived.and_then(|d| d.air_quality).map(|q| FieldValue::Integer(i64::from(q.index))));
        push("gas_iaq_label", derived.and_then(|d| d.air_quality).map(|q| FieldValue::Text(q.label.into())));
        push("gas_iaq_comp", derived.and_then(|d| d.compensated_gas).map(|v| FieldValue::float(v, 2)));

        let battery = self.battery.as_ref();
        push("battery_v", battery.map(|b| FieldValue::float(b.voltage_v, 3)));
        push("battery_pct", battery.map(|b| FieldValue::float(b.percent, 1)));
        push("charging_state", battery.map(|b| FieldValue::Text(b.status.as_str().into())));

        let offsets = &self.calibration;
        push("offset_temp", Some(FieldValue::float(offsets.temperature_offset, 2)));
        push("offset_hum", Some(FieldValue::float(offsets.humidity_offset, 2)));
        let has_pressure = reading.is_some_and(|r| r.pressure_hpa.is_some());
        push("offset_press", has_pressure.then(|| FieldValue::float(offsets.pressure_offset, 2)));
        push("calibrated", Some(FieldValue::Integer(i64::from(offsets.is_calibrated()))));

        fields
    }

    /// Whether a sensor reading made it into the record
    pub fn has_reading(&self) -> bool {
        self.reading.is_some()
    }
}

//! Sensor kinds and raw readings

use core::fmt;

use serde::{Deserialize, Serialize};

/// Supported environmental sensor families
///
/// The serialized names are the keys of the calibration document, so they
/// must stay stable across firmware versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorKind {
    /// Bosch BME280: temperature, humidity, pressure
    #[serde(rename = "BME280")]
    Bme280,
    /// Bosch BME680: temperature, humidity, pressure, gas resistance
    #[serde(rename = "BME680")]
    Bme680,
    /// Sensirion SHT3x: temperature, humidity
    #[serde(rename = "SHT3x")]
    Sht3x,
    /// Nothing detected
    #[serde(rename = "Unknown")]
    Unknown,
}

impl SensorKind {
    /// Name used in calibration documents and sink payloads
    pub const fn name(&self) -> &'static str {
        match self {
            SensorKind::Bme280 => "BME280",
            SensorKind::Bme680 => "BME680",
            SensorKind::Sht3x => "SHT3x",
            SensorKind::Unknown => "Unknown",
        }
    }

    /// Label used in the identity tag
    ///
    /// SHT3x boards ship with an SHT30, which is what shows up on dashboards.
    pub const fn tag_label(&self) -> &'static str {
        match self {
            SensorKind::Sht3x => "SHT30",
            SensorKind::Unknown => "UNKNOWN",
            other => other.name(),
        }
    }

    /// Whether this family reports barometric pressure
    pub const fn has_pressure(&self) -> bool {
        matches!(self, SensorKind::Bme280 | SensorKind::Bme680)
    }

    /// Whether this family reports gas resistance
    pub const fn has_gas(&self) -> bool {
        matches!(self, SensorKind::Bme680)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One measurement as reported by the sensor
///
/// Channels a sensor lacks are `None`, never zero. Values are raw until
/// [`crate::calibration::CalibrationOffsets::apply`] produces a corrected copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Air temperature (°C)
    pub temperature_c: f32,
    /// Relative humidity (%)
    pub humidity_pct: Option<f32>,
    /// Station pressure (hPa)
    pub pressure_hpa: Option<f32>,
    /// Heated metal-oxide gas resistance (Ω)
    pub gas_resistance_ohm: Option<f32>,
    /// Which sensor produced this reading
    pub source: SensorKind,
}

impl SensorReading {
    /// Temperature-only reading, channels filled in with the `with_*` helpers
    pub const fn new(source: SensorKind, temperature_c: f32) -> Self {
        Self {
            temperature_c,
            humidity_pct: None,
            pressure_hpa: None,
            gas_resistance_ohm: None,
            source,
        }
    }

    /// Add a humidity channel
    pub const fn with_humidity(mut self, humidity_pct: f32) -> Self {
        self.humidity_pct = Some(humidity_pct);
        self
    }

    /// Add a pressure channel
    pub const fn with_pressure(mut self, pressure_hpa: f32) -> Self {
        self.pressure_hpa = Some(pressure_hpa);
        self
    }

    /// Add a gas resistance channel
    pub const fn with_gas(mut self, gas_resistance_ohm: f32) -> Self {
        self.gas_resistance_ohm = Some(gas_resistance_ohm);
        self
    }
}

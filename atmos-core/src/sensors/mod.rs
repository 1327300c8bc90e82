//! Sensor discovery and capability-based handles
//!
//! Drivers differ in what they can measure. Instead of branching on the sensor
//! kind everywhere, a handle exposes one accessor per channel and returns
//! `None` for channels the hardware lacks. [`EnvironmentalSensor::measure`]
//! folds those into a [`SensorReading`].

mod registry;

pub use registry::{Probe, SensorRegistry, Signature, DEFAULT_PROBES};

use alloc::boxed::Box;

use crate::errors::SensorReadError;
use crate::reading::{SensorKind, SensorReading};

/// Result of a successful probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Detection {
    /// Detected family
    pub kind: SensorKind,
    /// Bus address it answered on
    pub address: u8,
}

/// Driver handle for one detected sensor
///
/// Only [`read_temperature`](Self::read_temperature) is mandatory; every other
/// channel defaults to "not supported".
pub trait EnvironmentalSensor {
    /// Family of the underlying chip
    fn kind(&self) -> SensorKind;

    /// Air temperature (°C)
    fn read_temperature(&mut self) -> Result<f32, SensorReadError>;

    /// Relative humidity (%), if the chip has a humidity channel
    fn read_humidity(&mut self) -> Result<Option<f32>, SensorReadError> {
        Ok(None)
    }

    /// Station pressure (hPa), if the chip has a barometer
    fn read_pressure(&mut self) -> Result<Option<f32>, SensorReadError> {
        Ok(None)
    }

    /// Gas resistance (Ω), if the chip has a heated gas sensor
    fn read_gas_resistance(&mut self) -> Result<Option<f32>, SensorReadError> {
        Ok(None)
    }

    /// Read every supported channel into one reading
    ///
    /// Non-finite values are rejected so the retry wrapper gets a chance to
    /// read again instead of propagating NaN into derived quantities.
    fn measure(&mut self) -> Result<SensorReading, SensorReadError> {
        let sensor = self.kind();
        let finite = |value: f32, quantity: &'static str| {
            if value.is_finite() {
                Ok(value)
            } else {
                Err(SensorReadError::InvalidData { sensor, quantity })
            }
        };

        let temperature_c = finite(self.read_temperature()?, "temperature")?;
        let humidity_pct = self.read_humidity()?.map(|v| finite(v, "humidity")).transpose()?;
        let pressure_hpa = self.read_pressure()?.map(|v| finite(v, "pressure")).transpose()?;
        let gas_resistance_ohm = self
            .read_gas_resistance()?
            .map(|v| finite(v, "gas resistance"))
            .transpose()?;

        Ok(SensorReading {
            temperature_c,
            humidity_pct,
            pressure_hpa,
            gas_resistance_ohm,
            source: sensor,
        })
    }
}

impl<S: EnvironmentalSensor + ?Sized> EnvironmentalSensor for Box<S> {
    fn kind(&self) -> SensorKind {
        (**self).kind()
    }

    fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
        (**self).read_temperature()
    }

    fn read_humidity(&mut self) -> Result<Option<f32>, SensorReadError> {
        (**self).read_humidity()
    }

    fn read_pressure(&mut self) -> Result<Option<f32>, SensorReadError> {
        (**self).read_pressure()
    }

    fn read_gas_resistance(&mut self) -> Result<Option<f32>, SensorReadError> {
        (**self).read_gas_resistance()
    }

    fn measure(&mut self) -> Result<SensorReading, SensorReadError> {
        (**self).measure()
    }
}

/// Turns a detection into a driver handle
///
/// Board support code owns the bus and the concrete drivers; the wake cycle
/// only ever sees the handle.
pub trait SensorFactory {
    /// Bring up the driver for a detected chip
    fn open(&mut self, detection: Detection) -> Result<Box<dyn EnvironmentalSensor>, SensorReadError>;
}

impl<F> SensorFactory for F
where
    F: FnMut(Detection) -> Result<Box<dyn EnvironmentalSensor>, SensorReadError>,
{
    fn open(&mut self, detection: Detection) -> Result<Box<dyn EnvironmentalSensor>, SensorReadError> {
        self(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sht {
        temperature: f32,
    }

    impl EnvironmentalSensor for Sht {
        fn kind(&self) -> SensorKind {
            SensorKind::Sht3x
        }

        fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
            Ok(self.temperature)
        }

        fn read_humidity(&mut self) -> Result<Option<f32>, SensorReadError> {
            Ok(Some(51.0))
        }
    }

    #[test]
    fn measure_collects_supported_channels_only() {
        let mut sensor = Sht { temperature: 20.5 };
        let reading = sensor.measure().unwrap();
        assert_eq!(reading.temperature_c, 20.5);
        assert_eq!(reading.humidity_pct, Some(51.0));
        assert_eq!(reading.pressure_hpa, None);
        assert_eq!(reading.gas_resistance_ohm, None);
        assert_eq!(reading.source, SensorKind::Sht3x);
    }

    #[test]
    fn measure_rejects_nan() {
        let mut sensor = Sht { temperature: f32::NAN };
        assert_eq!(
            sensor.measure(),
            Err(SensorReadError::InvalidData { sensor: SensorKind::Sht3x, quantity: "temperature" })
        );
    }

    #[test]
    fn closures_are_factories() {
        let mut factory = |detection: Detection| -> Result<Box<dyn EnvironmentalSensor>, SensorReadError> {
            assert_eq!(detection.kind, SensorKind::Sht3x);
            Ok(Box::new(Sht { temperature: 19.0 }))
        };
        let mut handle = factory
            .open(Detection { kind: SensorKind::Sht3x, address: 0x44 })
            .unwrap();
        assert_eq!(handle.measure().unwrap().temperature_c, 19.0);
    }
}

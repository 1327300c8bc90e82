//! Bench calibration against a reference node
//!
//! The node under calibration sits next to a trusted board that publishes to
//! its own Adafruit IO group. It averages `samples` raw readings, pulls the
//! reference values from that group and prints the resulting offsets entry,
//! ready to be merged into the calibration document.

use std::time::Duration;

use atmos_connectors::adafruit_io::AdafruitIoSink;
use atmos_connectors::http::HttpTransport;
use atmos_connectors::SinkError;
use atmos_core::calibration::{derive_offsets, OffsetEntry};
use atmos_core::{
    CalibrationError, CalibrationOffsets, EnvironmentalSensor, Reference, Reliability, RetryPolicy, SensorReading,
    Watchdog,
};
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::config::{ConfigError, NodeConfig};

/// Averages raw readings and derives offsets toward `reference`
///
/// Failed samples are skipped; at least one must succeed. Offsets are raw
/// deltas, so the sensor must not have any offsets applied.
pub fn run_calibration<W, D>(
    sensor: &mut dyn EnvironmentalSensor,
    reliability: &mut Reliability<W, D>,
    samples: u32,
    interval: Duration,
    policy: &RetryPolicy,
    reference: &Reference,
) -> Result<CalibrationOffsets, CalibrationError>
where
    W: Watchdog,
    D: DelayNs,
{
    let kind = sensor.kind();
    let mut readings: Vec<SensorReading> = Vec::with_capacity(samples as usize);
    for i in 0..samples {
        if i > 0 {
            reliability.pause(interval);
        }
        match reliability.execute("calibration sample", policy, |_| sensor.measure()) {
            Ok(reading) => readings.push(reading),
            Err(e) => warn!("calibration sample {}/{} skipped: {}", i + 1, samples, e),
        }
    }
    info!("collected {} of {} samples from {}", readings.len(), samples, kind);

    let offsets = derive_offsets(kind, &readings, reference)?;
    match serde_json::to_string(&OffsetEntry::from(&offsets)) {
        Ok(entry) => info!("offsets for {}: {}", kind, entry),
        Err(e) => warn!("could not render offsets: {}", e),
    }
    Ok(offsets)
}

/// Reference values from the group named by `calibration.reference_group`
pub fn fetch_reference<T: HttpTransport>(config: &NodeConfig, transport: T) -> Result<Reference, ConfigError> {
    let group = config.calibration.reference_group.as_str();
    if group.is_empty() {
        return Err(ConfigError::Invalid("calibration.reference_group is not set".into()));
    }
    let aio = config
        .adafruit_io_config()
        .ok_or_else(|| ConfigError::Invalid("Adafruit IO credentials are required for calibration".into()))?;
    let mut sink = AdafruitIoSink::new(aio, transport);
    sink.fetch_reference(group).map_err(|e: SinkError| ConfigError::Invalid(format!("reference unavailable: {e}")))
}

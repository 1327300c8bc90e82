//! Error Types for the Wake Cycle
//!
//! ## Error Taxonomy
//!
//! Every fallible step of a wake cycle has its own error type. None of them is
//! allowed to abort the process; the orchestrator degrades each one into a
//! diagnostic on the telemetry record and keeps going until it is safe to sleep.
//!
//! | Error               | Raised by                 | Cycle consequence                         |
//! |---------------------|---------------------------|-------------------------------------------|
//! | `DetectionError`    | sensor registry           | no reading, battery + dispatch still run  |
//! | `SensorReadError`   | sensor handle             | retried, then readings skipped            |
//! | `CalibrationError`  | calibration store/source  | identity offsets (degraded calibration)   |
//! | `FuelGaugeError`    | fuel gauge                | retried, then battery fields skipped      |
//! | `PersistError`      | blob stores               | logged, prior record stays intact         |
//! | `ExhaustedError<E>` | reliability wrapper       | carries the last cause after retries      |
//!
//! A hung step is not represented here at all: the hardware watchdog resets
//! the device, which is the only way a cycle can end without reaching sleep.
//!
//! ## Handling Strategy
//!
//! ```rust
//! use atmos_core::{CalibrationError, CalibrationOffsets, SensorKind};
//!
//! fn offsets_or_identity(result: Result<CalibrationOffsets, CalibrationError>) -> CalibrationOffsets {
//!     match result {
//!         Ok(offsets) => offsets,
//!         Err(CalibrationError::Missing) | Err(CalibrationError::NoEntry(_)) => {
//!             // nothing stored for this sensor yet
//!             CalibrationOffsets::identity(SensorKind::Bme280)
//!         }
//!         Err(_) => CalibrationOffsets::identity(SensorKind::Bme280),
//!     }
//! }
//! ```

use alloc::string::String;
use core::fmt;

use thiserror_no_std::Error;

use crate::reading::SensorKind;

/// No known signature answered on the bus
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionError {
    /// Every probe in the registry came back negative
    #[error("no supported sensor found ({probed} bus queries)")]
    NoneFound {
        /// Number of distinct bus queries issued during the pass
        probed: usize,
    },
}

/// Failure while talking to an environmental sensor
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorReadError {
    /// The bus transaction itself failed (NACK, arbitration loss, timeout)
    #[error("{sensor} bus transaction failed during {operation}")]
    Bus {
        /// Sensor being read
        sensor: SensorKind,
        /// What the driver was doing
        operation: &'static str,
    },

    /// Transaction succeeded but the value makes no sense (NaN, infinity)
    #[error("{sensor} returned a non-finite value for {quantity}")]
    InvalidData {
        /// Sensor being read
        sensor: SensorKind,
        /// Quantity that came back broken
        quantity: &'static str,
    },

    /// The driver factory could not bring the detected chip up
    #[error("could not open {sensor} at 0x{address:02X}")]
    Open {
        /// Detected kind
        sensor: SensorKind,
        /// Detected address
        address: u8,
    },
}

/// Fuel gauge failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelGaugeError {
    /// Bus transaction with the gauge failed
    #[error("fuel gauge bus transaction failed during {0}")]
    Bus(&'static str),

    /// Gauge answered with a non-finite value
    #[error("fuel gauge returned a non-finite {0}")]
    InvalidData(&'static str),
}

/// Failures committing or reading persisted records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// Underlying storage failed
    #[error("storage I/O failed: {0}")]
    Io(String),

    /// The record could not be encoded
    #[error("record encoding failed")]
    Encode,

    /// Stored bytes failed integrity or decoding checks
    #[error("stored record is corrupt")]
    Corrupt,

    /// Encoded record does not fit into the slot
    #[error("record of {needed} bytes exceeds slot capacity of {capacity} bytes")]
    Capacity {
        /// Bytes required by the frame
        needed: usize,
        /// Bytes available in one slot
        capacity: usize,
    },

    /// The write stopped part-way (power loss, brown-out)
    #[error("write interrupted after {written} bytes")]
    Interrupted {
        /// Bytes that reached the medium before the interruption
        written: usize,
    },
}

/// Calibration lookup and fetch failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// No calibration document in local storage
    #[error("calibration document missing")]
    Missing,

    /// Document present but unparsable
    #[error("calibration document malformed: {0}")]
    Malformed(String),

    /// Document parsed but has no entry for this sensor kind
    #[error("no calibration entry for {0}")]
    NoEntry(SensorKind),

    /// Remote source unreachable or rejected the request
    #[error("remote calibration fetch failed: {0}")]
    Fetch(String),

    /// Not enough samples to derive offsets from
    #[error("need at least one sample to derive offsets")]
    InsufficientSamples,

    /// Local storage could not be read
    #[error("calibration storage failed: {0}")]
    Storage(#[from] PersistError),
}

/// Returned by the reliability wrapper once retries are used up
///
/// Carries the cause of the final attempt so callers can decide whether the
/// failure is fatal for a sink or for the whole reading pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ExhaustedError<E> {
    /// Attempts actually made (including the first)
    pub attempts: u32,
    /// Error from the last attempt
    pub last_cause: E,
}

impl<E: fmt::Display> fmt::Display for ExhaustedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last_cause)
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug + fmt::Display> std::error::Error for ExhaustedError<E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn exhausted_error_mentions_last_cause() {
        let err = ExhaustedError {
            attempts: 3,
            last_cause: FuelGaugeError::Bus("cell voltage"),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempts"));
        assert!(text.contains("cell voltage"));
    }

    #[test]
    fn open_error_formats_address_as_hex() {
        let err = SensorReadError::Open { sensor: SensorKind::Sht3x, address: 0x44 };
        assert!(err.to_string().contains("0x44"));
    }
}

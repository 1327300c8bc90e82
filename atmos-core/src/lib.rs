//! Reliability and state-continuity core for the Atmos telemetry node
//!
//! One wake cycle of a battery-powered environmental node is a strictly
//! sequential pipeline:
//!
//! ```text
//! detect ─▶ calibrate ─▶ read ─▶ derive ─▶ battery ─▶ dispatch ─▶ persist ─▶ sleep
//! ```
//!
//! This crate owns every piece of that pipeline that has to survive faults:
//!
//! - [`sensors`]: bus probing and capability-based sensor handles
//! - [`calibration`]: per-board offsets, keyed by sensor kind
//! - [`derived`]: psychrometric and barometric quantities (pure)
//! - [`battery`]: fuel-gauge sampling and charge-direction inference
//! - [`retry`] / [`watchdog`]: backoff wrapper around every fallible step
//! - [`storage`]: atomic commit of the only two records that outlive a cycle
//!
//! Key constraints:
//! - Runs without an allocator-hungry runtime (`no_std` + `alloc` capable)
//! - No busy waiting: every wait goes through [`embedded_hal::delay::DelayNs`]
//! - A power cut at any instant leaves persisted state self-consistent
//!
//! ```no_run
//! use atmos_core::derived::dew_point;
//!
//! // SHT3x-style reading with humidity
//! assert!(dew_point(21.5, Some(48.0)).is_some());
//!
//! // Sensor without a humidity channel
//! assert_eq!(dew_point(21.5, None), None);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

pub mod battery;
pub mod calibration;
pub mod constants;
pub mod derived;
pub mod errors;
pub mod identity;
pub mod reading;
pub mod record;
pub mod retry;
pub mod sensors;
pub mod storage;
pub mod time;
pub mod watchdog;

// Public API
pub use battery::{BatteryState, BatteryStateTracker, BatteryThresholds, BatteryUpdate, ChargeStatus, FuelGauge, GaugeSample};
pub use calibration::{CalibrationOffsets, CalibrationSource, CalibrationStore, Reference};
pub use derived::{DerivedOptions, DerivedSample};
pub use errors::{
    CalibrationError, DetectionError, ExhaustedError, FuelGaugeError, PersistError, SensorReadError,
};
pub use identity::{BoardCode, IdentityTag};
pub use reading::{SensorKind, SensorReading};
pub use record::{Diagnostic, Field, FieldValue, TelemetryRecord};
pub use retry::{Reliability, RetryPolicy};
pub use sensors::{Detection, EnvironmentalSensor, SensorFactory, SensorRegistry};
pub use storage::BlobStore;
pub use watchdog::Watchdog;

/// Firmware version reported in every telemetry record
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Wake-cycle orchestration for the Atmos node
//!
//! Ties the reliability core to the sinks: loads [`NodeConfig`], builds the
//! dispatcher and runs one [`WakeCycle`] per wake, returning how long to
//! sleep.
//!
//! ```rust,no_run
//! use atmos_connectors::http::{HttpConfig, UreqTransport};
//! use atmos_core::storage::AtomicFile;
//! use atmos_node::NodeConfig;
//!
//! let config = NodeConfig::from_env()?;
//! config.validate()?;
//! let transport = UreqTransport::new(HttpConfig::default())?;
//! let dispatcher = config.build_dispatcher(transport);
//!
//! let calibration = AtomicFile::new("/data/calibration.json");
//! let battery = AtomicFile::new("/data/battery.bin");
//! # let _ = (dispatcher, calibration, battery);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Board support code then supplies the I2C bus, the fuel gauge, a sensor
//! factory and the watchdog, and calls [`WakeCycle::run`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod calibrate;
pub mod config;
pub mod cycle;
pub mod std_hal;

pub use calibrate::{fetch_reference, run_calibration};
pub use config::{ConfigError, NodeConfig};
pub use cycle::{CalibrationStatus, CycleReport, WakeCycle};
pub use std_hal::{DeadlineWatchdog, StdDelay};

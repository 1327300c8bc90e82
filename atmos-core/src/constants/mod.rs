//! Constants for Atmos Core
//!
//! Every numeric value the wake cycle depends on lives here, next to the
//! datasheet or reference it was taken from.
//!
//! ## Organization
//!
//! - **Physics**: atmosphere and psychrometric coefficients
//! - **Sensors**: bus addresses, chip signatures, gas index bands
//! - **Battery**: charge-inference thresholds and gauge timings
//! - **Time**: watchdog, retry and sleep timings
//!
//! Names carry their unit as a suffix (`_HPA`, `_MS`, `_PCT`).

/// Atmosphere and psychrometric constants.
pub mod physics;

/// Bus addresses, chip signatures and gas resistance bands.
pub mod sensors;

/// Fuel gauge thresholds and charge inference defaults.
pub mod battery;

/// Watchdog, retry and sleep timings.
pub mod time;

pub use physics::SEA_LEVEL_PRESSURE_HPA;
pub use time::{DEFAULT_SLEEP_SECONDS, WATCHDOG_TIMEOUT_MS};

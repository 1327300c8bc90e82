//! Time-Related Constants
//!
//! Watchdog, retry and sleep timings of a wake cycle.

// ===== WATCHDOG =====

/// Hardware watchdog timeout (milliseconds).
///
/// Must exceed the longest single blocking step, including the longest
/// retry backoff.
pub const WATCHDOG_TIMEOUT_MS: u64 = 15_000;

// ===== SLEEP =====

/// Default deep-sleep interval between wake cycles (seconds).
pub const DEFAULT_SLEEP_SECONDS: u64 = 300;

// ===== RETRY =====

/// Attempts for the sensor detection pass.
pub const DETECT_MAX_ATTEMPTS: u32 = 8;

/// Base delay between detection passes (milliseconds).
///
/// Sensors on a freshly powered rail may take a few hundred ms to ACK.
pub const DETECT_BASE_DELAY_MS: u64 = 250;

/// Attempts for sensor reads, gauge reads and network sends.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Base delay before the first retry (milliseconds).
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Upper bound for any single backoff delay (milliseconds).
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

/// Exponential backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

// ===== GAS SAMPLING =====

/// Gas resistance samples averaged per cycle on BME680 boards.
pub const GAS_SAMPLES: u32 = 10;

/// Interval between gas resistance samples (milliseconds).
pub const GAS_SAMPLE_INTERVAL_MS: u64 = 1_000;

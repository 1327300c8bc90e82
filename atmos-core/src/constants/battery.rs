//! Battery Inference Constants
//!
//! Defaults for charge-direction inference on a single-cell Li-ion pack
//! read through a MAX17048-class fuel gauge.

/// State of charge at or above which the pack counts as full (%).
pub const FULL_PERCENT: f32 = 99.0;

/// Cell voltage at or above which the pack counts as full (V).
///
/// 4.2 V is the float voltage; gauges read slightly under it once the
/// charger switches to trickle.
pub const FULL_VOLTAGE_V: f32 = 4.18;

/// Minimum change in state of charge treated as a real trend (%).
///
/// Smaller deltas are gauge noise and keep the previous status.
pub const NOISE_EPSILON_PCT: f32 = 0.1;

/// Wait before each of the two averaged gauge samples (ms).
pub const GAUGE_SETTLE_MS: u32 = 100;

/// Wait after a gauge quick-start before resampling (ms).
///
/// Source: MAX17048 datasheet, quick-start completes within 175 ms
pub const QUICK_START_SETTLE_MS: u32 = 250;

/// Lowest state of charge considered a plausible reading (%).
pub const PERCENT_SANE_MIN: f32 = -0.5;

/// Highest state of charge considered a plausible reading (%).
///
/// The MAX17048 can report slightly over 100 % right after charge.
pub const PERCENT_SANE_MAX: f32 = 101.5;

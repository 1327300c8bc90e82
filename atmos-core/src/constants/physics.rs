//! Physical Constants for Atmos
//!
//! Coefficients for the barometric and psychrometric calculations in
//! [`crate::derived`]. All temperatures in °C, pressures in hPa.

// ===== ATMOSPHERE =====

/// Standard atmospheric pressure at sea level (hPa/mbar).
///
/// Reference pressure for altitude and for psychrometrics when the sensor
/// has no barometer.
///
/// Source: International Standard Atmosphere (ISA)
pub const SEA_LEVEL_PRESSURE_HPA: f32 = 1013.25;

/// Scale factor of the hypsometric altitude formula (m).
///
/// Equals T0 / L with T0 = 288.15 K and L = 0.0065 K/m.
///
/// Source: International Standard Atmosphere (ISA)
pub const ISA_ALTITUDE_SCALE_M: f32 = 44_330.0;

/// Exponent of the hypsometric altitude formula (R·L / g·M).
///
/// Source: International Standard Atmosphere (ISA)
pub const ISA_ALTITUDE_EXPONENT: f32 = 0.190_3;

// ===== SATURATION VAPOUR PRESSURE (MAGNUS) =====

/// Saturation vapour pressure at 0 °C (hPa).
///
/// Source: Alduchov & Eskridge (1996), "Improved Magnus Form Approximation"
pub const MAGNUS_E0_HPA: f32 = 6.112;

/// Magnus coefficient `a` (dimensionless).
///
/// Source: Bolton (1980), valid -30..35 °C within 0.3 %
pub const MAGNUS_A: f32 = 17.67;

/// Magnus coefficient `b` (°C).
///
/// Source: Bolton (1980)
pub const MAGNUS_B_C: f32 = 243.5;

/// Dew point Magnus coefficient `a` (dimensionless).
///
/// Source: Sensirion, "Introduction to Humidity" application note
pub const DEW_POINT_A: f32 = 17.62;

/// Dew point Magnus coefficient `b` (°C).
pub const DEW_POINT_B_C: f32 = 243.12;

/// Lowest relative humidity fed into the dew point logarithm (%).
///
/// ln(0) is undefined; a bone-dry reading is treated as this value.
pub const DEW_POINT_MIN_HUMIDITY_PCT: f32 = 0.01;

// ===== PSYCHROMETRY =====

/// Psychrometer coefficient for an aspirated wet bulb (1/°C).
///
/// Used as `e = es(Tw) - A·(1 + 0.00115·Tw)·P·(T - Tw)`.
///
/// Source: WMO-No. 8, Guide to Meteorological Instruments, Annex 4.B
pub const PSYCHROMETER_COEFFICIENT: f32 = 6.6e-4;

/// Wet-bulb temperature correction of the psychrometer coefficient (1/°C).
///
/// Source: WMO-No. 8, Annex 4.B
pub const PSYCHROMETER_TEMP_CORRECTION: f32 = 0.001_15;

/// Bisection iterations for the wet-bulb solve.
///
/// Dew point to dry bulb never spans more than 100 °C, so 32 halvings
/// resolve well below f32 precision.
pub const WET_BULB_ITERATIONS: u32 = 32;

/// Molar mass ratio of water vapour to dry air.
///
/// Source: ASHRAE Handbook Fundamentals (2017), ch. 1, eq. 20
pub const WATER_AIR_MASS_RATIO: f32 = 0.621_98;

/// Headroom kept between vapour pressure and total pressure (hPa).
///
/// Keeps the humidity ratio finite when a miscalibrated sensor reports
/// a vapour pressure at or above the total pressure.
pub const VAPOUR_PRESSURE_HEADROOM_HPA: f32 = 0.1;

/// Specific heat of dry air (kJ/kg·°C).
///
/// Source: ASHRAE Handbook Fundamentals (2017), ch. 1, eq. 32
pub const CP_DRY_AIR_KJ_PER_KG_C: f32 = 1.006;

/// Latent heat of vaporisation at 0 °C (kJ/kg).
///
/// Source: ASHRAE Handbook Fundamentals (2017), ch. 1, eq. 32
pub const LATENT_HEAT_KJ_PER_KG: f32 = 2501.0;

/// Specific heat of water vapour (kJ/kg·°C).
///
/// Source: ASHRAE Handbook Fundamentals (2001), ch. 6, eq. 32
pub const CP_WATER_VAPOUR_KJ_PER_KG_C: f32 = 1.805;

//! Derived environmental quantities
//!
//! Pure functions of a corrected [`SensorReading`]. Any quantity whose inputs
//! are missing is `None`; nothing here substitutes zeros for absent channels.
//!
//! Psychrometrics need a total pressure. Sensors without a barometer either
//! use [`SEA_LEVEL_PRESSURE_HPA`] or skip the pressure-dependent quantities,
//! depending on [`DerivedOptions::assume_sea_level_pressure`].

use libm::{expf, logf};

use crate::constants::physics::{
    CP_DRY_AIR_KJ_PER_KG_C, CP_WATER_VAPOUR_KJ_PER_KG_C, DEW_POINT_A, DEW_POINT_B_C, DEW_POINT_MIN_HUMIDITY_PCT,
    ISA_ALTITUDE_EXPONENT, ISA_ALTITUDE_SCALE_M, LATENT_HEAT_KJ_PER_KG, MAGNUS_A, MAGNUS_B_C,
    MAGNUS_E0_HPA, PSYCHROMETER_COEFFICIENT, PSYCHROMETER_TEMP_CORRECTION, SEA_LEVEL_PRESSURE_HPA,
    VAPOUR_PRESSURE_HEADROOM_HPA, WATER_AIR_MASS_RATIO, WET_BULB_ITERATIONS,
};
use crate::constants::sensors::{
    GAS_CLEAN_OHMS, GAS_HUMIDITY_WEIGHT, GAS_LIGHT_VOC_OHMS, GAS_MODERATE_VOC_OHMS,
    GAS_VERY_CLEAN_OHMS,
};
use crate::reading::SensorReading;

/// How to treat readings without a pressure channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedOptions {
    /// Reference sea-level pressure for altitude (hPa)
    pub sea_level_hpa: f32,
    /// Use `sea_level_hpa` as station pressure when the sensor has none
    pub assume_sea_level_pressure: bool,
}

impl Default for DerivedOptions {
    fn default() -> Self {
        Self {
            sea_level_hpa: SEA_LEVEL_PRESSURE_HPA,
            assume_sea_level_pressure: true,
        }
    }
}

/// Coarse air quality band from gas resistance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirQuality {
    /// 1 (high VOCs) ..= 5 (very clean)
    pub index: u8,
    /// Human readable band
    pub label: &'static str,
}

/// Everything computed from one corrected reading
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedSample {
    /// Dry bulb in Fahrenheit
    pub temperature_f: f32,
    /// Dew point (°C)
    pub dew_point_c: Option<f32>,
    /// Psychrometric wet bulb (°C)
    pub wet_bulb_c: Option<f32>,
    /// Mixing ratio (kg water / kg dry air)
    pub humidity_ratio: Option<f32>,
    /// Moist air enthalpy (kJ/kg dry air)
    pub enthalpy_kj_per_kg: Option<f32>,
    /// Barometric altitude (m)
    pub altitude_m: Option<f32>,
    /// Gas resistance band
    pub air_quality: Option<AirQuality>,
    /// Humidity compensated gas metric, `ln(R) + 0.04·RH`
    pub compensated_gas: Option<f32>,
}

impl DerivedSample {
    /// Compute every derived quantity the reading's channels allow
    pub fn compute(reading: &SensorReading, options: &DerivedOptions) -> Self {
        let t = reading.temperature_c;
        let rh = reading.humidity_pct;
        let psychro_pressure = match reading.pressure_hpa {
            Some(p) => Some(p),
            None if options.assume_sea_level_pressure => Some(options.sea_level_hpa),
            None => None,
        };

        let humidity_ratio = psychro_pressure.and_then(|p| humidity_ratio(t, rh, p));

        Self {
            temperature_f: celsius_to_fahrenheit(t),
            dew_point_c: dew_point(t, rh),
            wet_bulb_c: psychro_pressure.and_then(|p| wet_bulb(t, rh, p)),
            humidity_ratio,
            enthalpy_kj_per_kg: enthalpy(t, humidity_ratio),
            altitude_m: altitude(reading.pressure_hpa, options.sea_level_hpa),
            air_quality: air_quality(reading.gas_resistance_ohm),
            compensated_gas: compensated_gas(reading.gas_resistance_ohm, rh),
        }
    }
}

/// Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Saturation vapour pressure over water (hPa), Magnus form
pub fn saturation_vapour_pressure(temp_c: f32) -> f32 {
    MAGNUS_E0_HPA * expf(MAGNUS_A * temp_c / (temp_c + MAGNUS_B_C))
}

fn clamp_humidity(rh: f32) -> f32 {
    rh.clamp(DEW_POINT_MIN_HUMIDITY_PCT, 100.0)
}

/// Dew point (°C) via the Magnus formula
pub fn dew_point(temp_c: f32, humidity_pct: Option<f32>) -> Option<f32> {
    let rh = clamp_humidity(humidity_pct?);
    let gamma = logf(rh / 100.0) + DEW_POINT_A * temp_c / (DEW_POINT_B_C + temp_c);
    Some(DEW_POINT_B_C * gamma / (DEW_POINT_A - gamma))
}

// Temperature at which `saturation_vapour_pressure` equals `vapour_hpa`
fn saturation_temperature(vapour_hpa: f32) -> f32 {
    let x = logf(vapour_hpa / MAGNUS_E0_HPA);
    MAGNUS_B_C * x / (MAGNUS_A - x)
}

/// Psychrometric wet bulb (°C) at the given total pressure
///
/// Solves `e = es(Tw) - A·(1 + c·Tw)·P·(T - Tw)` for `Tw` by bisection between
/// the saturation temperature of the ambient vapour and the dry bulb. The
/// residual is monotonic in `Tw`, so the result always lands in that bracket.
pub fn wet_bulb(temp_c: f32, humidity_pct: Option<f32>, pressure_hpa: f32) -> Option<f32> {
    let rh = clamp_humidity(humidity_pct?);
    let vapour = rh / 100.0 * saturation_vapour_pressure(temp_c);
    let mut lo = saturation_temperature(vapour).min(temp_c);
    let mut hi = temp_c;

    let residual = |tw: f32| {
        let coefficient = PSYCHROMETER_COEFFICIENT * (1.0 + PSYCHROMETER_TEMP_CORRECTION * tw);
        saturation_vapour_pressure(tw) - coefficient * pressure_hpa * (temp_c - tw) - vapour
    };

    for _ in 0..WET_BULB_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if residual(mid) > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Some(0.5 * (lo + hi))
}

/// Stull (2011) empirical wet bulb (°C) at sea-level pressure
///
/// Valid for 5..99 %RH and -20..50 °C. Kept for cross-checking the
/// psychrometric solve.
pub fn wet_bulb_stull(temp_c: f32, humidity_pct: f32) -> f32 {
    use libm::{atanf, powf, sqrtf};
    let rh = humidity_pct;
    temp_c * atanf(0.151_977 * sqrtf(rh + 8.313_659))
        + atanf(temp_c + rh)
        - atanf(rh - 1.676_331)
        + 0.003_918_38 * powf(rh, 1.5) * atanf(0.023_101 * rh)
        - 4.686_035
}

/// Mixing ratio (kg/kg)
///
/// Vapour pressure is capped just under total pressure so an over-corrected
/// humidity cannot produce a division by zero or a negative ratio.
pub fn humidity_ratio(temp_c: f32, humidity_pct: Option<f32>, pressure_hpa: f32) -> Option<f32> {
    let rh = humidity_pct?.clamp(0.0, 100.0);
    let vapour = (rh / 100.0 * saturation_vapour_pressure(temp_c))
        .min(pressure_hpa - VAPOUR_PRESSURE_HEADROOM_HPA);
    if vapour <= 0.0 {
        return Some(0.0);
    }
    Some(WATER_AIR_MASS_RATIO * vapour / (pressure_hpa - vapour))
}

/// Moist air enthalpy (kJ/kg dry air)
pub fn enthalpy(temp_c: f32, humidity_ratio: Option<f32>) -> Option<f32> {
    let w = humidity_ratio?;
    Some(CP_DRY_AIR_KJ_PER_KG_C * temp_c + w * (LATENT_HEAT_KJ_PER_KG + CP_WATER_VAPOUR_KJ_PER_KG_C * temp_c))
}

/// Barometric altitude (m) relative to `sea_level_hpa`
pub fn altitude(pressure_hpa: Option<f32>, sea_level_hpa: f32) -> Option<f32> {
    let p = pressure_hpa?;
    if p <= 0.0 || sea_level_hpa <= 0.0 {
        return None;
    }
    Some(ISA_ALTITUDE_SCALE_M * (1.0 - libm::powf(p / sea_level_hpa, ISA_ALTITUDE_EXPONENT)))
}

/// Band a gas resistance into a 1..=5 index
pub fn air_quality(gas_ohm: Option<f32>) -> Option<AirQuality> {
    let g = gas_ohm.filter(|g| *g > 0.0 && g.is_finite())?;
    let (index, label) = if g >= GAS_VERY_CLEAN_OHMS {
        (5, "very clean")
    } else if g >= GAS_CLEAN_OHMS {
        (4, "clean")
    } else if g >= GAS_LIGHT_VOC_OHMS {
        (3, "light VOCs")
    } else if g >= GAS_MODERATE_VOC_OHMS {
        (2, "moderate VOCs")
    } else {
        (1, "high VOCs")
    };
    Some(AirQuality { index, label })
}

/// Humidity compensated gas metric; higher means cleaner air
pub fn compensated_gas(gas_ohm: Option<f32>, humidity_pct: Option<f32>) -> Option<f32> {
    let g = gas_ohm.filter(|g| *g > 0.0)?;
    let rh = humidity_pct?;
    Some(logf(g) + GAS_HUMIDITY_WEIGHT * rh)
}

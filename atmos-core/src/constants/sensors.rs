//! Sensor Addresses and Signatures
//!
//! Bus addresses and identification registers of the supported chips,
//! plus the gas resistance bands used for the coarse air quality index.

// ===== BOSCH BME280 / BME680 =====

/// Primary I²C address of Bosch environmental sensors (SDO low).
pub const BOSCH_PRIMARY_ADDRESS: u8 = 0x76;

/// Secondary I²C address of Bosch environmental sensors (SDO high).
pub const BOSCH_SECONDARY_ADDRESS: u8 = 0x77;

/// Chip identification register, shared by BME280 and BME680.
///
/// Source: BME280 datasheet rev 1.6, §5.4.1; BME680 datasheet rev 1.3, §5.3.4
pub const BOSCH_CHIP_ID_REGISTER: u8 = 0xD0;

/// Chip ID reported by a BME280.
pub const BME280_CHIP_ID: u8 = 0x60;

/// Chip ID reported by a BME680.
pub const BME680_CHIP_ID: u8 = 0x61;

// ===== SENSIRION SHT3x =====

/// Default I²C address of an SHT3x (ADDR pin low).
pub const SHT3X_PRIMARY_ADDRESS: u8 = 0x44;

/// Alternate I²C address of an SHT3x (ADDR pin high).
pub const SHT3X_SECONDARY_ADDRESS: u8 = 0x45;

/// "Read status register" command. The chip ACKs it in any state.
///
/// Source: SHT3x-DIS datasheet v6, §4.11
pub const SHT3X_STATUS_COMMAND: [u8; 2] = [0xF3, 0x2D];

// ===== FUEL GAUGE =====

/// I²C address of the MAX17048 fuel gauge.
pub const MAX17048_ADDRESS: u8 = 0x36;

// ===== GAS RESISTANCE (BME680) =====
//
// Coarse VOC trend bands on raw heater resistance. Higher resistance means
// fewer reducing gases. Not a substitute for Bosch BSEC.

/// At or above: index 5, "very clean" (Ω).
pub const GAS_VERY_CLEAN_OHMS: f32 = 15_000.0;

/// At or above: index 4, "clean" (Ω).
pub const GAS_CLEAN_OHMS: f32 = 8_000.0;

/// At or above: index 3, "light VOCs" (Ω).
pub const GAS_LIGHT_VOC_OHMS: f32 = 3_000.0;

/// At or above: index 2, "moderate VOCs" (Ω). Below: index 1, "high VOCs".
pub const GAS_MODERATE_VOC_OHMS: f32 = 1_000.0;

/// Humidity weight of the compensated gas metric `ln(R) + k·RH` (1/%).
pub const GAS_HUMIDITY_WEIGHT: f32 = 0.04;

// ===== CALIBRATION =====

/// Offsets at or below this magnitude count as uncalibrated.
pub const CALIBRATED_THRESHOLD: f32 = 0.01;

//! Per-board calibration offsets
//!
//! Offsets are additive corrections (`corrected = raw + offset`) kept in a
//! JSON document keyed by sensor kind:
//!
//! ```json
//! {
//!   "BME280": { "temp": -0.35, "hum": 2.1, "press": 0.8 },
//!   "SHT3x":  { "temp": -0.10, "hum": 1.4, "press": 0.0 }
//! }
//! ```
//!
//! Older boards stored a single flat `{"temp", "hum", "press"}` object. That
//! form still loads and applies to whichever sensor is detected. Saving always
//! writes the keyed form, merging into existing entries.
//!
//! Load order during a cycle: local store, then the remote
//! [`CalibrationSource`], then [`CalibrationOffsets::identity`].

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::constants::sensors::CALIBRATED_THRESHOLD;
use crate::errors::{CalibrationError, PersistError};
use crate::reading::{SensorKind, SensorReading};
use crate::storage::BlobStore;

/// Additive corrections for one sensor kind
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationOffsets {
    /// Added to temperature (°C)
    pub temperature_offset: f32,
    /// Added to relative humidity (%)
    pub humidity_offset: f32,
    /// Added to pressure (hPa)
    pub pressure_offset: f32,
    /// Kind these offsets were derived for
    pub applies_to: SensorKind,
}

impl CalibrationOffsets {
    /// All-zero offsets: readings pass through unchanged
    pub const fn identity(applies_to: SensorKind) -> Self {
        Self {
            temperature_offset: 0.0,
            humidity_offset: 0.0,
            pressure_offset: 0.0,
            applies_to,
        }
    }

    /// True when any offset is larger than rounding noise
    pub fn is_calibrated(&self) -> bool {
        [self.temperature_offset, self.humidity_offset, self.pressure_offset]
            .iter()
            .any(|offset| libm::fabsf(*offset) > CALIBRATED_THRESHOLD)
    }

    /// Corrected copy of `reading`; channels the reading lacks stay absent
    pub fn apply(&self, reading: &SensorReading) -> SensorReading {
        SensorReading {
            temperature_c: reading.temperature_c + self.temperature_offset,
            humidity_pct: reading.humidity_pct.map(|h| h + self.humidity_offset),
            pressure_hpa: reading.pressure_hpa.map(|p| p + self.pressure_offset),
            ..*reading
        }
    }

    fn from_entry(entry: OffsetEntry, applies_to: SensorKind) -> Self {
        Self {
            temperature_offset: entry.temp,
            humidity_offset: entry.hum,
            pressure_offset: entry.press,
            applies_to,
        }
    }
}

/// On-disk shape of one set of offsets
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OffsetEntry {
    /// Temperature offset (°C)
    #[serde(default)]
    pub temp: f32,
    /// Humidity offset (%)
    #[serde(default)]
    pub hum: f32,
    /// Pressure offset (hPa)
    #[serde(default)]
    pub press: f32,
}

impl From<&CalibrationOffsets> for OffsetEntry {
    fn from(offsets: &CalibrationOffsets) -> Self {
        Self {
            temp: offsets.temperature_offset,
            hum: offsets.humidity_offset,
            press: offsets.pressure_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum CalibrationDocument {
    Keyed(BTreeMap<SensorKind, OffsetEntry>),
    Flat(OffsetEntry),
}

impl CalibrationDocument {
    fn parse(bytes: &[u8]) -> Result<Self, CalibrationError> {
        serde_json::from_slice(bytes).map_err(|e| CalibrationError::Malformed(e.to_string()))
    }

    fn offsets_for(&self, kind: SensorKind) -> Option<CalibrationOffsets> {
        match self {
            CalibrationDocument::Keyed(entries) => {
                entries.get(&kind).map(|entry| CalibrationOffsets::from_entry(*entry, kind))
            }
            CalibrationDocument::Flat(entry) => Some(CalibrationOffsets::from_entry(*entry, kind)),
        }
    }
}

/// Remote provider of a default calibration document
///
/// Typically an HTTP GET of a JSON file published per board batch.
pub trait CalibrationSource {
    /// Fetch the raw document text
    fn fetch(&mut self) -> Result<String, CalibrationError>;
}

impl<S: CalibrationSource + ?Sized> CalibrationSource for &mut S {
    fn fetch(&mut self) -> Result<String, CalibrationError> {
        (**self).fetch()
    }
}

/// Calibration document backed by a [`BlobStore`]
pub struct CalibrationStore<B> {
    backing: B,
}

impl<B: BlobStore> CalibrationStore<B> {
    /// Wrap a blob store
    pub fn new(backing: B) -> Self {
        Self { backing }
    }

    /// Offsets for `kind` from local storage
    pub fn load(&mut self, kind: SensorKind) -> Result<CalibrationOffsets, CalibrationError> {
        let bytes = self.backing.read()?.ok_or(CalibrationError::Missing)?;
        CalibrationDocument::parse(&bytes)?
            .offsets_for(kind)
            .ok_or(CalibrationError::NoEntry(kind))
    }

    /// Merge `offsets` into the stored document and commit it atomically
    ///
    /// A flat or unreadable document is replaced by a keyed one.
    pub fn save(&mut self, offsets: &CalibrationOffsets) -> Result<(), PersistError> {
        let mut entries = match self.backing.read() {
            Ok(Some(bytes)) => match CalibrationDocument::parse(&bytes) {
                Ok(CalibrationDocument::Keyed(entries)) => entries,
                Ok(CalibrationDocument::Flat(_)) => {
                    info!("upgrading flat calibration document to keyed form");
                    BTreeMap::new()
                }
                Err(e) => {
                    warn!("replacing unreadable calibration document: {}", e);
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("could not read calibration document before save: {}", e);
                BTreeMap::new()
            }
        };
        entries.insert(offsets.applies_to, OffsetEntry::from(offsets));

        let bytes = serde_json::to_vec(&CalibrationDocument::Keyed(entries)).map_err(|_| PersistError::Encode)?;
        self.backing.commit(&bytes)
    }

    /// Offsets for `kind` from a remote source, without touching local storage
    pub fn fetch_default<S>(&self, source: &mut S, kind: SensorKind) -> Result<CalibrationOffsets, CalibrationError>
    where
        S: CalibrationSource + ?Sized,
    {
        let text = source.fetch()?;
        CalibrationDocument::parse(text.as_bytes())?
            .offsets_for(kind)
            .ok_or(CalibrationError::NoEntry(kind))
    }

    /// Access the underlying store
    pub fn backing_mut(&mut self) -> &mut B {
        &mut self.backing
    }
}

/// Ground truth used when deriving offsets on a reference bench
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    /// Reference temperature (°C)
    pub temperature_c: f32,
    /// Reference humidity (%)
    pub humidity_pct: Option<f32>,
    /// Reference pressure (hPa)
    pub pressure_hpa: Option<f32>,
}

fn round2(value: f32) -> f32 {
    libm::roundf(value * 100.0) / 100.0
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, n) = values.fold((0.0f32, 0u32), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f32)
}

/// Offsets that move the average of `samples` onto `reference`
///
/// Channels missing from either side get a zero offset. Results are rounded
/// to two decimals.
pub fn derive_offsets(
    kind: SensorKind,
    samples: &[SensorReading],
    reference: &Reference,
) -> Result<CalibrationOffsets, CalibrationError> {
    let temperature = mean(samples.iter().map(|s| s.temperature_c)).ok_or(CalibrationError::InsufficientSamples)?;
    let humidity = mean(samples.iter().filter_map(|s| s.humidity_pct));
    let pressure = mean(samples.iter().filter_map(|s| s.pressure_hpa));

    let offset = |reference: Option<f32>, measured: Option<f32>| match (reference, measured) {
        (Some(r), Some(m)) => round2(r - m),
        _ => 0.0,
    };

    Ok(CalibrationOffsets {
        temperature_offset: round2(reference.temperature_c - temperature),
        humidity_offset: offset(reference.humidity_pct, humidity),
        pressure_offset: offset(reference.pressure_hpa, pressure),
        applies_to: kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlob;

    struct StaticSource(&'static str);

    impl CalibrationSource for StaticSource {
        fn fetch(&mut self) -> Result<String, CalibrationError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn apply_skips_missing_channels() {
        let offsets = CalibrationOffsets {
            temperature_offset: -0.5,
            humidity_offset: 2.0,
            pressure_offset: 1.0,
            applies_to: SensorKind::Sht3x,
        };
        let raw = SensorReading::new(SensorKind::Sht3x, 22.0).with_humidity(40.0);
        let corrected = offsets.apply(&raw);
        assert_eq!(corrected.temperature_c, 21.5);
        assert_eq!(corrected.humidity_pct, Some(42.0));
        assert_eq!(corrected.pressure_hpa, None);
        // raw reading untouched
        assert_eq!(raw.temperature_c, 22.0);
    }

    #[test]
    fn identity_is_not_calibrated() {
        assert!(!CalibrationOffsets::identity(SensorKind::Bme280).is_calibrated());
        let offsets = CalibrationOffsets { pressure_offset: 0.2, ..CalibrationOffsets::identity(SensorKind::Bme280) };
        assert!(offsets.is_calibrated());
        let noise = CalibrationOffsets { humidity_offset: -0.01, ..CalibrationOffsets::identity(SensorKind::Bme280) };
        assert!(!noise.is_calibrated());
    }

    #[test]
    fn keyed_document_selects_kind() {
        let doc = br#"{"BME280": {"temp": -0.35, "hum": 2.1, "press": 0.8}, "SHT3x": {"temp": 0.1, "hum": 1.0}}"#;
        let mut store = CalibrationStore::new(MemoryBlob::with_contents(doc));
        let sht = store.load(SensorKind::Sht3x).unwrap();
        assert_eq!(sht.temperature_offset, 0.1);
        assert_eq!(sht.pressure_offset, 0.0);
        assert_eq!(store.load(SensorKind::Bme680), Err(CalibrationError::NoEntry(SensorKind::Bme680)));
    }

    #[test]
    fn flat_document_applies_to_detected_kind() {
        let mut store = CalibrationStore::new(MemoryBlob::with_contents(br#"{"temp": -1.2, "hum": 3, "press": 0}"#));
        let offsets = store.load(SensorKind::Bme680).unwrap();
        assert_eq!(offsets.applies_to, SensorKind::Bme680);
        assert_eq!(offsets.temperature_offset, -1.2);
        assert_eq!(offsets.humidity_offset, 3.0);
    }

    #[test]
    fn missing_and_malformed_documents() {
        let mut store = CalibrationStore::new(MemoryBlob::default());
        assert_eq!(store.load(SensorKind::Bme280), Err(CalibrationError::Missing));

        let mut store = CalibrationStore::new(MemoryBlob::with_contents(b"{not json"));
        assert!(matches!(store.load(SensorKind::Bme280), Err(CalibrationError::Malformed(_))));

        let mut store = CalibrationStore::new(MemoryBlob::with_contents(br#"{"BME999": {"temp": 1}}"#));
        assert!(matches!(store.load(SensorKind::Bme280), Err(CalibrationError::Malformed(_))));
    }

    #[test]
    fn save_then_load_is_bit_identical() {
        let mut store = CalibrationStore::new(MemoryBlob::default());
        let offsets = CalibrationOffsets {
            temperature_offset: -0.35,
            humidity_offset: 2.1,
            pressure_offset: 0.8,
            applies_to: SensorKind::Bme280,
        };
        store.save(&offsets).unwrap();
        let loaded = store.load(SensorKind::Bme280).unwrap();
        assert_eq!(loaded.temperature_offset.to_bits(), offsets.temperature_offset.to_bits());
        assert_eq!(loaded.humidity_offset.to_bits(), offsets.humidity_offset.to_bits());
        assert_eq!(loaded.pressure_offset.to_bits(), offsets.pressure_offset.to_bits());
    }

    #[test]
    fn save_merges_with_existing_entries() {
        let doc = br#"{"SHT3x": {"temp": 0.1, "hum": 1.0, "press": 0.0}}"#;
        let mut store = CalibrationStore::new(MemoryBlob::with_contents(doc));
        store.save(&CalibrationOffsets { temperature_offset: 0.4, ..CalibrationOffsets::identity(SensorKind::Bme280) }).unwrap();
        assert_eq!(store.load(SensorKind::Sht3x).unwrap().temperature_offset, 0.1);
        assert_eq!(store.load(SensorKind::Bme280).unwrap().temperature_offset, 0.4);
    }

    #[test]
    fn save_upgrades_flat_document() {
        let mut store = CalibrationStore::new(MemoryBlob::with_contents(br#"{"temp": 1.0}"#));
        store.save(&CalibrationOffsets { temperature_offset: 0.4, ..CalibrationOffsets::identity(SensorKind::Sht3x) }).unwrap();
        // flat form is gone, other kinds no longer match
        assert_eq!(store.load(SensorKind::Bme280), Err(CalibrationError::NoEntry(SensorKind::Bme280)));
        assert_eq!(store.load(SensorKind::Sht3x).unwrap().temperature_offset, 0.4);
    }

    #[test]
    fn fetch_default_does_not_write_locally() {
        let mut store = CalibrationStore::new(MemoryBlob::default());
        let mut source = StaticSource(r#"{"BME680": {"temp": -0.8, "hum": 4.0, "press": 1.1}}"#);
        let offsets = store.fetch_default(&mut source, SensorKind::Bme680).unwrap();
        assert_eq!(offsets.pressure_offset, 1.1);
        assert_eq!(store.load(SensorKind::Bme680), Err(CalibrationError::Missing));
    }

    #[test]
    fn derive_offsets_averages_and_rounds() {
        let samples = [
            SensorReading::new(SensorKind::Bme280, 22.0).with_humidity(40.0).with_pressure(1000.0),
            SensorReading::new(SensorKind::Bme280, 22.2).with_humidity(41.0).with_pressure(1000.4),
        ];
        let reference = Reference { temperature_c: 21.5, humidity_pct: Some(43.0), pressure_hpa: None };
        let offsets = derive_offsets(SensorKind::Bme280, &samples, &reference).unwrap();
        assert_eq!(offsets.temperature_offset, -0.6);
        assert_eq!(offsets.humidity_offset, 2.5);
        assert_eq!(offsets.pressure_offset, 0.0);
    }

    #[test]
    fn derive_offsets_needs_samples() {
        let reference = Reference { temperature_c: 20.0, humidity_pct: None, pressure_hpa: None };
        assert_eq!(
            derive_offsets(SensorKind::Sht3x, &[], &reference),
            Err(CalibrationError::InsufficientSamples)
        );
    }
}

//! Ordered probe table for sensor detection
//!
//! Probes run in table order and the first match wins: BME680 at 0x76 then
//! 0x77, BME280 at the same two addresses, then SHT3x at 0x44 and 0x45.
//! Bosch parts share addresses, so a detection pass reads each chip ID once
//! and caches the answer per address; later probes for that address check
//! the cached response instead of querying the bus again.

use alloc::vec::Vec;

use embedded_hal::i2c::{I2c, Operation};
use log::{debug, info};

use super::Detection;
use crate::constants::sensors::{
    BME280_CHIP_ID, BME680_CHIP_ID, BOSCH_CHIP_ID_REGISTER, BOSCH_PRIMARY_ADDRESS,
    BOSCH_SECONDARY_ADDRESS, SHT3X_PRIMARY_ADDRESS, SHT3X_SECONDARY_ADDRESS, SHT3X_STATUS_COMMAND,
};
use crate::errors::DetectionError;
use crate::reading::SensorKind;

/// How a chip proves its identity on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// Register read returns a fixed chip ID
    ChipId {
        /// Register holding the ID
        register: u8,
        /// Value identifying this family
        expected: u8,
    },
    /// Chip acknowledges a two-byte command
    CommandAck {
        /// Command bytes
        command: [u8; 2],
    },
}

/// One (kind, address, signature) candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Family reported on a match
    pub kind: SensorKind,
    /// Address to query
    pub address: u8,
    /// What a match looks like
    pub signature: Signature,
}

const fn bosch(kind: SensorKind, address: u8, expected: u8) -> Probe {
    Probe {
        kind,
        address,
        signature: Signature::ChipId { register: BOSCH_CHIP_ID_REGISTER, expected },
    }
}

const fn sht(address: u8) -> Probe {
    Probe {
        kind: SensorKind::Sht3x,
        address,
        signature: Signature::CommandAck { command: SHT3X_STATUS_COMMAND },
    }
}

/// Probe order used by [`SensorRegistry::default`]
///
/// BME680 is checked before BME280 because both answer on the same
/// addresses and only the chip ID tells them apart.
pub const DEFAULT_PROBES: [Probe; 6] = [
    bosch(SensorKind::Bme680, BOSCH_PRIMARY_ADDRESS, BME680_CHIP_ID),
    bosch(SensorKind::Bme680, BOSCH_SECONDARY_ADDRESS, BME680_CHIP_ID),
    bosch(SensorKind::Bme280, BOSCH_PRIMARY_ADDRESS, BME280_CHIP_ID),
    bosch(SensorKind::Bme280, BOSCH_SECONDARY_ADDRESS, BME280_CHIP_ID),
    sht(SHT3X_PRIMARY_ADDRESS),
    sht(SHT3X_SECONDARY_ADDRESS),
];

// What a bus query returned; cached so one address is only asked once per
// pass even when several families share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Register(u8),
    Command([u8; 2]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Response {
    Absent,
    Value(u8),
    Acked,
}

impl Signature {
    fn query(&self) -> Query {
        match *self {
            Signature::ChipId { register, .. } => Query::Register(register),
            Signature::CommandAck { command } => Query::Command(command),
        }
    }

    fn accepts(&self, response: Response) -> bool {
        match (*self, response) {
            (Signature::ChipId { expected, .. }, Response::Value(id)) => id == expected,
            (Signature::CommandAck { .. }, Response::Acked) => true,
            _ => false,
        }
    }
}

#[derive(Default)]
struct ProbeCache {
    entries: Vec<(u8, Query, Response)>,
}

impl ProbeCache {
    fn get_or_query<B: I2c>(&mut self, bus: &mut B, address: u8, query: Query) -> Response {
        if let Some((_, _, response)) = self.entries.iter().find(|(a, q, _)| *a == address && *q == query) {
            return *response;
        }
        let response = issue(bus, address, query);
        self.entries.push((address, query, response));
        response
    }

    fn queries(&self) -> usize {
        self.entries.len()
    }
}

fn issue<B: I2c>(bus: &mut B, address: u8, query: Query) -> Response {
    match query {
        Query::Register(register) => {
            let mut id = [0u8; 1];
            match bus.write_read(address, &[register], &mut id) {
                Ok(()) => Response::Value(id[0]),
                Err(e) => {
                    debug!("0x{:02X}: register 0x{:02X} not readable ({:?})", address, register, e);
                    Response::Absent
                }
            }
        }
        Query::Command(command) => match bus.transaction(address, &mut [Operation::Write(&command)]) {
            Ok(()) => Response::Acked,
            Err(e) => {
                debug!("0x{:02X}: command not acknowledged ({:?})", address, e);
                Response::Absent
            }
        },
    }
}

/// Ordered set of probes
///
/// Detection is the only place that talks to the bus before a driver exists.
/// Bus errors during a probe mean "not here" and are never surfaced.
#[derive(Debug, Clone)]
pub struct SensorRegistry {
    probes: Vec<Probe>,
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self { probes: DEFAULT_PROBES.to_vec() }
    }
}

impl SensorRegistry {
    /// Registry with a custom probe order
    pub fn with_probes(probes: Vec<Probe>) -> Self {
        Self { probes }
    }

    /// Probes in evaluation order
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// First matching probe in registry order
    pub fn detect<B: I2c>(&self, bus: &mut B) -> Result<Detection, DetectionError> {
        let mut cache = ProbeCache::default();
        for probe in &self.probes {
            let response = cache.get_or_query(bus, probe.address, probe.signature.query());
            if probe.signature.accepts(response) {
                info!("detected {} at 0x{:02X}", probe.kind, probe.address);
                return Ok(Detection { kind: probe.kind, address: probe.address });
            }
        }
        Err(DetectionError::NoneFound { probed: cache.queries() })
    }

    /// Every device that matches a probe, at most one per address
    pub fn scan<B: I2c>(&self, bus: &mut B) -> Vec<Detection> {
        let mut cache = ProbeCache::default();
        let mut found: Vec<Detection> = Vec::new();
        for probe in &self.probes {
            if found.iter().any(|d| d.address == probe.address) {
                continue;
            }
            let response = cache.get_or_query(bus, probe.address, probe.signature.query());
            if probe.signature.accepts(response) {
                found.push(Detection { kind: probe.kind, address: probe.address });
            }
        }
        found
    }

    /// Identify whatever answers at one address
    pub fn probe_address<B: I2c>(&self, bus: &mut B, address: u8) -> Option<SensorKind> {
        let mut cache = ProbeCache::default();
        self.probes
            .iter()
            .filter(|p| p.address == address)
            .find(|p| p.signature.accepts(cache.get_or_query(bus, address, p.signature.query())))
            .map(|p| p.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource};

    #[derive(Default)]
    struct Bus {
        chip_ids: Vec<(u8, u8)>,
        sht: Vec<u8>,
        transactions: usize,
    }

    impl ErrorType for Bus {
        type Error = ErrorKind;
    }

    impl I2c for Bus {
        fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
            self.transactions += 1;
            let chip_id = self.chip_ids.iter().find(|(a, _)| *a == address).map(|(_, id)| *id);
            if chip_id.is_none() && !self.sht.contains(&address) {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for op in operations.iter_mut() {
                if let Operation::Read(buf) = op {
                    buf.fill(chip_id.unwrap_or(0));
                }
            }
            Ok(())
        }
    }

    #[test]
    fn bme680_wins_over_bme280_at_same_address() {
        let mut bus = Bus { chip_ids: vec![(0x76, 0x61)], ..Bus::default() };
        let found = SensorRegistry::default().detect(&mut bus).unwrap();
        assert_eq!(found, Detection { kind: SensorKind::Bme680, address: 0x76 });
    }

    #[test]
    fn chip_id_is_read_once_per_address() {
        let mut bus = Bus { chip_ids: vec![(0x77, 0x60)], ..Bus::default() };
        let found = SensorRegistry::default().detect(&mut bus).unwrap();
        assert_eq!(found, Detection { kind: SensorKind::Bme280, address: 0x77 });
        // 0x76 and 0x77 once each, the BME280 probes reuse the cached IDs
        assert_eq!(bus.transactions, 2);
    }

    #[test]
    fn sht_detected_by_ack() {
        let mut bus = Bus { sht: vec![0x45], ..Bus::default() };
        let found = SensorRegistry::default().detect(&mut bus).unwrap();
        assert_eq!(found, Detection { kind: SensorKind::Sht3x, address: 0x45 });
    }

    #[test]
    fn empty_bus_reports_none_found() {
        let mut bus = Bus::default();
        let err = SensorRegistry::default().detect(&mut bus).unwrap_err();
        assert_eq!(err, DetectionError::NoneFound { probed: 4 });
    }

    #[test]
    fn foreign_chip_id_is_not_a_match() {
        let mut bus = Bus { chip_ids: vec![(0x76, 0x58)], ..Bus::default() };
        assert!(SensorRegistry::default().detect(&mut bus).is_err());
    }

    #[test]
    fn scan_reports_every_device() {
        let mut bus = Bus { chip_ids: vec![(0x77, 0x60)], sht: vec![0x44], ..Bus::default() };
        let found = SensorRegistry::default().scan(&mut bus);
        assert_eq!(
            found,
            vec![
                Detection { kind: SensorKind::Bme280, address: 0x77 },
                Detection { kind: SensorKind::Sht3x, address: 0x44 },
            ]
        );
    }

    #[test]
    fn probe_single_address() {
        let mut bus = Bus { chip_ids: vec![(0x76, 0x60)], ..Bus::default() };
        let registry = SensorRegistry::default();
        assert_eq!(registry.probe_address(&mut bus, 0x76), Some(SensorKind::Bme280));
        assert_eq!(registry.probe_address(&mut bus, 0x44), None);
    }
}

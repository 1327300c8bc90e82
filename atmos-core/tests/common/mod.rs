//! Shared fakes for atmos-core integration tests
//!
//! - `TornMemory`: sleep memory that can lose power part-way through a write
//! - `RecordingDelay`: records every requested wait instead of sleeping
//! - `CountingWatchdog`: counts arm/feed/disarm calls

#![allow(dead_code)]

use std::time::Duration;

use atmos_core::errors::PersistError;
use atmos_core::storage::SleepMemory;
use atmos_core::watchdog::Watchdog;
use embedded_hal::delay::DelayNs;

/// RAM that stops writing after a byte budget runs out
pub struct TornMemory {
    pub bytes: Vec<u8>,
    /// Bytes that may still be written before "power is lost"
    pub budget: Option<usize>,
}

impl TornMemory {
    pub fn new(capacity: usize) -> Self {
        Self { bytes: vec![0; capacity], budget: None }
    }

    pub fn cut_power_after(&mut self, bytes: usize) {
        self.budget = Some(bytes);
    }

    pub fn restore_power(&mut self) {
        self.budget = None;
    }
}

impl SleepMemory for TornMemory {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), PersistError> {
        self.bytes.as_slice().read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), PersistError> {
        match self.budget {
            Some(budget) if budget < data.len() => {
                self.bytes[offset..offset + budget].copy_from_slice(&data[..budget]);
                self.budget = Some(0);
                Err(PersistError::Interrupted { written: budget })
            }
            Some(budget) => {
                self.budget = Some(budget - data.len());
                self.bytes.as_mut_slice().write(offset, data)
            }
            None => self.bytes.as_mut_slice().write(offset, data),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub waits: Vec<Duration>,
}

impl RecordingDelay {
    pub fn total(&self) -> Duration {
        self.waits.iter().sum()
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waits.push(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        self.waits.push(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.waits.push(Duration::from_millis(u64::from(ms)));
    }
}

#[derive(Debug, Default)]
pub struct CountingWatchdog {
    pub armed: Option<Duration>,
    pub feeds: u32,
    pub disarmed: bool,
}

impl Watchdog for CountingWatchdog {
    fn arm(&mut self, timeout: Duration) {
        self.armed = Some(timeout);
        self.disarmed = false;
    }

    fn feed(&mut self) {
        self.feeds += 1;
    }

    fn disarm(&mut self) {
        self.disarmed = true;
    }
}

//! Shared fakes for atmos-connectors integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use atmos_connectors::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use atmos_core::battery::{BatteryState, ChargeStatus};
use atmos_core::{
    BoardCode, CalibrationOffsets, DerivedOptions, DerivedSample, IdentityTag, SensorKind, SensorReading,
    TelemetryRecord, Watchdog,
};
use embedded_hal::delay::DelayNs;

/// Answers requests from a script; an empty script answers 204
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    pub requests: Rc<RefCell<Vec<HttpRequest>>>,
    script: Rc<RefCell<VecDeque<Result<u16, String>>>>,
}

impl ScriptedTransport {
    pub fn statuses(statuses: &[u16]) -> Self {
        let transport = Self::default();
        transport.script.borrow_mut().extend(statuses.iter().map(|s| Ok(*s)));
        transport
    }

    pub fn then_fail(self, reason: &str) -> Self {
        self.script.borrow_mut().push_back(Err(reason.into()));
        self
    }

    pub fn sent(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.borrow_mut().push(request.clone());
        match self.script.borrow_mut().pop_front() {
            Some(Ok(status)) => Ok(HttpResponse { status, body: format!("status {status}") }),
            Some(Err(reason)) => Err(HttpError::Request(reason)),
            None => Ok(HttpResponse { status: 204, body: String::new() }),
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub waits: Vec<Duration>,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waits.push(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.waits.push(Duration::from_millis(u64::from(ms)));
    }
}

#[derive(Debug, Default)]
pub struct CountingWatchdog {
    pub feeds: u32,
    pub disarmed: bool,
}

impl Watchdog for CountingWatchdog {
    fn arm(&mut self, _timeout: Duration) {}

    fn feed(&mut self) {
        self.feeds += 1;
    }

    fn disarm(&mut self) {
        self.disarmed = true;
    }
}

pub fn sht_record(sensor_name: &str) -> TelemetryRecord {
    let reading = SensorReading::new(SensorKind::Sht3x, 19.8).with_humidity(55.0);
    TelemetryRecord {
        identity: IdentityTag::new(SensorKind::Sht3x, BoardCode::S3, &[0x01, 0x02, 0x03, 0xAB, 0xCD, 0xEF]),
        sensor_name: sensor_name.into(),
        firmware_version: "1.0.9".into(),
        reading: Some(reading),
        derived: Some(DerivedSample::compute(&reading, &DerivedOptions::default())),
        battery: Some(BatteryState { voltage_v: 4.02, percent: 90.0, cycle: 1, status: ChargeStatus::Charging }),
        calibration: CalibrationOffsets::identity(SensorKind::Sht3x),
        timestamp_ms: 42_000,
        wall_clock: false,
        diagnostics: Vec::new(),
    }
}

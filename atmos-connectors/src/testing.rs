//! Scripted transport and sample records for unit tests

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use atmos_core::battery::{BatteryState, ChargeStatus};
use atmos_core::{
    BoardCode, CalibrationOffsets, DerivedOptions, DerivedSample, IdentityTag, SensorKind, SensorReading,
    TelemetryRecord,
};

use crate::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};

/// Replays queued responses and records every request
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    pub requests: Rc<RefCell<Vec<HttpRequest>>>,
    responses: Rc<RefCell<VecDeque<Result<HttpResponse, String>>>>,
}

impl ScriptedTransport {
    pub fn respond(self, status: u16, body: &str) -> Self {
        self.responses.borrow_mut().push_back(Ok(HttpResponse { status, body: body.into() }));
        self
    }

    pub fn fail(self, reason: &str) -> Self {
        self.responses.borrow_mut().push_back(Err(reason.into()));
        self
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests.borrow().last().cloned().expect("no request sent")
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.borrow_mut().push(request.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(HttpError::Request(reason)),
            None => Ok(HttpResponse { status: 200, body: String::new() }),
        }
    }
}

/// BME280 record with battery and calibration
pub fn bme280_record() -> TelemetryRecord {
    let reading = SensorReading::new(SensorKind::Bme280, 21.5)
        .with_humidity(48.25)
        .with_pressure(1008.4);
    TelemetryRecord {
        identity: IdentityTag::new(SensorKind::Bme280, BoardCode::S2, &[0xFE, 0x74, 0xA8]),
        sensor_name: "HowlX Atmos".into(),
        firmware_version: "1.0.9".into(),
        reading: Some(reading),
        derived: Some(DerivedSample::compute(&reading, &DerivedOptions::default())),
        battery: Some(BatteryState { voltage_v: 3.912, percent: 81.5, cycle: 7, status: ChargeStatus::Discharging }),
        calibration: CalibrationOffsets {
            temperature_offset: -0.35,
            humidity_offset: 2.1,
            pressure_offset: 0.8,
            applies_to: SensorKind::Bme280,
        },
        timestamp_ms: 1_700_000_000_123,
        wall_clock: true,
        diagnostics: Vec::new(),
    }
}

//! Shared fakes for atmos-node integration tests
//!
//! - `Bus`: I2C bus answering chip-ID reads and SHT3x command acks
//! - `FakeSensor`: scripted driver handle, shareable with the factory
//! - `ScriptedGauge`: fuel gauge replaying a list of charge percentages
//! - `ScriptedTransport`: HTTP transport answering from a status script
//! - `RecordingDelay` / `CountingWatchdog`: observe waits and watchdog use

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use atmos_connectors::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use atmos_core::{
    CalibrationError, CalibrationSource, Detection, EnvironmentalSensor, FuelGauge, FuelGaugeError,
    SensorFactory, SensorKind, SensorReadError, Watchdog,
};
use atmos_node::NodeConfig;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

pub const UID: [u8; 6] = [0x10, 0x20, 0x30, 0xAB, 0xCD, 0xEF];

#[derive(Debug, Default)]
pub struct Bus {
    pub chip_ids: Vec<(u8, u8)>,
    pub sht: Vec<u8>,
}

impl Bus {
    pub fn bme280() -> Self {
        Self { chip_ids: vec![(0x76, 0x60)], ..Self::default() }
    }

    pub fn bme680() -> Self {
        Self { chip_ids: vec![(0x77, 0x61)], ..Self::default() }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl ErrorType for Bus {
    type Error = ErrorKind;
}

impl I2c for Bus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
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

#[derive(Debug)]
pub struct SensorScript {
    pub kind: SensorKind,
    pub temperature_c: f32,
    pub humidity_pct: Option<f32>,
    pub pressure_hpa: Option<f32>,
    pub gas: VecDeque<f32>,
    /// Temperature reads that fail before the first success
    pub failures: u32,
    pub reads: u32,
}

/// Driver handle whose script stays visible to the test
#[derive(Debug, Clone)]
pub struct FakeSensor(pub Rc<RefCell<SensorScript>>);

impl FakeSensor {
    pub fn bme280(temperature_c: f32, humidity_pct: f32, pressure_hpa: f32) -> Self {
        Self(Rc::new(RefCell::new(SensorScript {
            kind: SensorKind::Bme280,
            temperature_c,
            humidity_pct: Some(humidity_pct),
            pressure_hpa: Some(pressure_hpa),
            gas: VecDeque::new(),
            failures: 0,
            reads: 0,
        })))
    }

    pub fn bme680(gas: &[f32]) -> Self {
        let sensor = Self::bme280(22.0, 40.0, 1000.0);
        {
            let mut script = sensor.0.borrow_mut();
            script.kind = SensorKind::Bme680;
            script.gas = gas.iter().copied().collect();
        }
        sensor
    }

    pub fn failing(self, failures: u32) -> Self {
        self.0.borrow_mut().failures = failures;
        self
    }

    pub fn reads(&self) -> u32 {
        self.0.borrow().reads
    }

    /// Factory handing out this sensor for any detection
    pub fn factory(&self) -> Box<dyn SensorFactory> {
        let sensor = self.clone();
        Box::new(move |_detection: Detection| -> Result<Box<dyn EnvironmentalSensor>, SensorReadError> {
            Ok(Box::new(sensor.clone()))
        })
    }
}

impl EnvironmentalSensor for FakeSensor {
    fn kind(&self) -> SensorKind {
        self.0.borrow().kind
    }

    fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
        let mut script = self.0.borrow_mut();
        script.reads += 1;
        if script.failures > 0 {
            script.failures -= 1;
            return Err(SensorReadError::Bus { sensor: script.kind, operation: "temperature" });
        }
        Ok(script.temperature_c)
    }

    fn read_humidity(&mut self) -> Result<Option<f32>, SensorReadError> {
        Ok(self.0.borrow().humidity_pct)
    }

    fn read_pressure(&mut self) -> Result<Option<f32>, SensorReadError> {
        Ok(self.0.borrow().pressure_hpa)
    }

    fn read_gas_resistance(&mut self) -> Result<Option<f32>, SensorReadError> {
        let mut script = self.0.borrow_mut();
        if script.kind != SensorKind::Bme680 {
            return Ok(None);
        }
        Ok(script.gas.pop_front())
    }
}

/// Gauge replaying one charge percentage per cycle
#[derive(Debug)]
pub struct ScriptedGauge {
    pub voltage_v: f32,
    pub percent: f32,
    pub broken: bool,
}

impl ScriptedGauge {
    pub fn new(voltage_v: f32, percent: f32) -> Self {
        Self { voltage_v, percent, broken: false }
    }

    pub fn broken() -> Self {
        Self { voltage_v: 0.0, percent: 0.0, broken: true }
    }
}

impl FuelGauge for ScriptedGauge {
    fn voltage(&mut self) -> Result<f32, FuelGaugeError> {
        if self.broken {
            return Err(FuelGaugeError::Bus("voltage"));
        }
        Ok(self.voltage_v)
    }

    fn percent(&mut self) -> Result<f32, FuelGaugeError> {
        if self.broken {
            return Err(FuelGaugeError::Bus("percent"));
        }
        Ok(self.percent)
    }
}

/// Answers requests from a script; an empty script answers 204
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    pub requests: Rc<RefCell<Vec<HttpRequest>>>,
    script: Rc<RefCell<VecDeque<u16>>>,
}

impl ScriptedTransport {
    pub fn statuses(statuses: &[u16]) -> Self {
        let transport = Self::default();
        transport.script.borrow_mut().extend(statuses.iter().copied());
        transport
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.url.clone()).collect()
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.borrow_mut().push(request.clone());
        let status = self.script.borrow_mut().pop_front().unwrap_or(204);
        Ok(HttpResponse { status, body: format!("status {status}") })
    }
}

/// Remote calibration document, or a fixed error
pub struct StaticSource {
    pub document: Result<String, CalibrationError>,
    pub fetches: Rc<RefCell<u32>>,
}

impl StaticSource {
    pub fn document(text: &str) -> Self {
        Self { document: Ok(text.into()), fetches: Rc::default() }
    }

    pub fn unreachable() -> Self {
        Self { document: Err(CalibrationError::Fetch("connection refused".into())), fetches: Rc::default() }
    }
}

impl CalibrationSource for StaticSource {
    fn fetch(&mut self) -> Result<String, CalibrationError> {
        *self.fetches.borrow_mut() += 1;
        self.document.clone()
    }
}

#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub waits: Vec<Duration>,
}

impl RecordingDelay {
    pub fn count(&self, wait: Duration) -> usize {
        self.waits.iter().filter(|w| **w == wait).count()
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

/// Influx v2 only, no remote calibration
pub fn influx_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.adafruit_io.enabled = false;
    config.influx.enabled = true;
    config.influx.url = "http://influx:8086".into();
    config.influx.org = "home".into();
    config.influx.bucket = "sensors".into();
    config.influx.token = "tok".into();
    config
}

/// Adafruit IO followed by Influx v2
pub fn both_sinks_config() -> NodeConfig {
    let mut config = influx_config();
    config.adafruit_io.enabled = true;
    config.adafruit_io.username = "howlx".into();
    config.adafruit_io.key = "aio_key".into();
    config.adafruit_io.group = "atmos".into();
    config
}

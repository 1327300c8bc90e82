//! One wake cycle, from watchdog arm to safe-to-sleep
//!
//! ```text
//! arm ─▶ detect ─▶ open ─▶ calibration ─▶ measure ─▶ gas average ─▶ derive
//!                                                                     │
//!  sleep ◀─ disarm ◀─ dispatch ◀─ record ◀─ battery (persist) ◀───────┘
//! ```
//!
//! Every fallible step runs through [`Reliability`], so the watchdog is fed
//! before each attempt and waits are low-power. No step aborts the cycle:
//! a failure removes that part of the record and adds a [`Diagnostic`].

use std::time::Duration;

use atmos_connectors::{SinkResult, TelemetryDispatcher};
use atmos_core::sensors::SensorRegistry;
use atmos_core::time::TimeSource;
use atmos_core::{
    BatteryStateTracker, BlobStore, BoardCode, CalibrationError, CalibrationOffsets, CalibrationSource,
    CalibrationStore, DerivedSample, Detection, Diagnostic, EnvironmentalSensor, FuelGauge, GaugeSample,
    IdentityTag, Reliability, SensorFactory, SensorKind, SensorReading, TelemetryRecord, Watchdog,
};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};

use crate::config::NodeConfig;

/// How the offsets of this cycle were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    /// Loaded from local storage
    Stored,
    /// Fetched from the remote default and cached locally
    Fetched,
    /// Nothing stored and remote fetch disabled; identity offsets
    Uncalibrated,
    /// Local or remote calibration failed; identity offsets
    Degraded,
    /// No sensor this cycle
    Skipped,
}

/// Outcome of one wake cycle
#[derive(Debug)]
pub struct CycleReport {
    /// Record sent to the sinks
    pub record: TelemetryRecord,
    /// Per-sink outcome
    pub sink_results: Vec<SinkResult>,
    /// Calibration source of this cycle
    pub calibration: CalibrationStatus,
    /// Whether the battery record was committed
    pub battery_persisted: bool,
    /// Deep sleep to enter now
    pub sleep_for: Duration,
}

impl CycleReport {
    /// Every sink accepted the record
    pub fn all_delivered(&self) -> bool {
        self.sink_results.iter().all(SinkResult::is_success)
    }
}

/// Owns everything that outlives a single step of the cycle
pub struct WakeCycle<C, S> {
    config: NodeConfig,
    board: BoardCode,
    hardware_uid: Vec<u8>,
    registry: SensorRegistry,
    factory: Box<dyn SensorFactory>,
    calibration: CalibrationStore<C>,
    calibration_source: Option<Box<dyn CalibrationSource>>,
    battery: BatteryStateTracker<S>,
    dispatcher: TelemetryDispatcher,
}

impl<C: BlobStore, S: BlobStore> WakeCycle<C, S> {
    /// Cycle with the default probe list and no remote calibration source
    pub fn new(
        config: NodeConfig,
        factory: Box<dyn SensorFactory>,
        calibration_store: C,
        battery_store: S,
        dispatcher: TelemetryDispatcher,
    ) -> Self {
        let thresholds = config.battery;
        Self {
            config,
            board: BoardCode::Unknown,
            hardware_uid: Vec::new(),
            registry: SensorRegistry::default(),
            factory,
            calibration: CalibrationStore::new(calibration_store),
            calibration_source: None,
            battery: BatteryStateTracker::new(battery_store, thresholds),
            dispatcher,
        }
    }

    /// Board family and hardware unique ID for the identity tag
    pub fn board(mut self, board: BoardCode, hardware_uid: &[u8]) -> Self {
        self.board = board;
        self.hardware_uid = hardware_uid.to_vec();
        self
    }

    /// Replace the probe list
    pub fn registry(mut self, registry: SensorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Source of default offsets, used when `calibration.remote_fetch` is set
    pub fn calibration_source(mut self, source: Box<dyn CalibrationSource>) -> Self {
        self.calibration_source = Some(source);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Calibration store, for inspection
    pub fn calibration_store(&mut self) -> &mut CalibrationStore<C> {
        &mut self.calibration
    }

    /// Battery tracker, for inspection
    pub fn battery_tracker(&mut self) -> &mut BatteryStateTracker<S> {
        &mut self.battery
    }

    /// Run one full cycle
    pub fn run<B, G, W, D, T>(
        &mut self,
        bus: &mut B,
        gauge: &mut G,
        reliability: &mut Reliability<W, D>,
        clock: &T,
    ) -> CycleReport
    where
        B: I2c,
        G: FuelGauge,
        W: Watchdog,
        D: DelayNs,
        T: TimeSource,
    {
        reliability.arm(self.config.watchdog_timeout());
        let mut diagnostics = Vec::new();

        let mut sensor = self.detect_and_open(bus, reliability, &mut diagnostics);
        let kind = sensor.as_ref().map_or(SensorKind::Unknown, |s| s.kind());

        let (offsets, calibration) = if sensor.is_some() {
            self.resolve_calibration(kind, reliability)
        } else {
            (CalibrationOffsets::identity(kind), CalibrationStatus::Skipped)
        };
        match calibration {
            CalibrationStatus::Fetched => diagnostics.push(Diagnostic::CalibrationFetched),
            CalibrationStatus::Degraded => diagnostics.push(Diagnostic::CalibrationDegraded),
            _ => {}
        }

        let raw = sensor
            .as_deref_mut()
            .and_then(|sensor| self.measure(sensor, reliability, &mut diagnostics));
        let reading = raw.map(|raw| offsets.apply(&raw));
        let derived = reading.map(|r| DerivedSample::compute(&r, &self.config.derived_options()));
        if let Some(r) = &reading {
            info!(
                "{}: {:.2} °C, {:?} %RH, {:?} hPa, {:?} Ω",
                kind, r.temperature_c, r.humidity_pct, r.pressure_hpa, r.gas_resistance_ohm
            );
        }

        let battery_policy = self.config.retry.battery.policy();
        let (battery, battery_persisted) =
            match reliability.execute("fuel gauge", &battery_policy, |delay| GaugeSample::take(gauge, delay)) {
                Ok(sample) => {
                    let update = self.battery.update(sample);
                    if !update.persisted {
                        diagnostics.push(Diagnostic::BatteryNotPersisted);
                    }
                    (Some(update.state), update.persisted)
                }
                Err(e) => {
                    error!("battery step skipped: {}", e);
                    diagnostics.push(Diagnostic::BatteryUnavailable);
                    (None, false)
                }
            };

        let record = TelemetryRecord {
            identity: IdentityTag::new(kind, self.board, &self.hardware_uid),
            sensor_name: self.config.sensor_name.clone(),
            firmware_version: self.config.firmware_version.clone(),
            reading,
            derived,
            battery,
            calibration: offsets,
            timestamp_ms: clock.now(),
            wall_clock: clock.is_wall_clock(),
            diagnostics,
        };
        for diagnostic in &record.diagnostics {
            warn!("degraded: {}", diagnostic);
        }

        let sink_results = self.dispatcher.dispatch(&record, reliability);
        let delivered = sink_results.iter().filter(|r| r.is_success()).count();
        info!("{} of {} sinks accepted {}", delivered, sink_results.len(), record.identity);

        let sleep_for = self.config.sleep_duration();
        reliability.disarm_for_sleep();
        info!("cycle complete, sleeping {} s", sleep_for.as_secs());

        CycleReport { record, sink_results, calibration, battery_persisted, sleep_for }
    }

    fn detect_and_open<B, W, D>(
        &mut self,
        bus: &mut B,
        reliability: &mut Reliability<W, D>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<Box<dyn EnvironmentalSensor>>
    where
        B: I2c,
        W: Watchdog,
        D: DelayNs,
    {
        let detect_policy = self.config.retry.detect.policy();
        let registry = &self.registry;
        let detection: Detection =
            match reliability.execute("sensor detection", &detect_policy, |_| registry.detect(bus)) {
                Ok(detection) => detection,
                Err(e) => {
                    error!("sensor detection failed: {}", e);
                    diagnostics.push(Diagnostic::SensorNotDetected);
                    return None;
                }
            };

        let open_policy = self.config.retry.read.policy();
        let factory = &mut self.factory;
        match reliability.execute("sensor open", &open_policy, |_| factory.open(detection)) {
            Ok(sensor) => Some(sensor),
            Err(e) => {
                error!("could not open {}: {}", detection.kind, e);
                diagnostics.push(Diagnostic::SensorReadFailed { attempts: e.attempts });
                None
            }
        }
    }

    /// Offsets for `kind`: local store, else remote default (cached), else identity
    pub fn resolve_calibration<W, D>(
        &mut self,
        kind: SensorKind,
        reliability: &mut Reliability<W, D>,
    ) -> (CalibrationOffsets, CalibrationStatus)
    where
        W: Watchdog,
        D: DelayNs,
    {
        let local_error = match self.calibration.load(kind) {
            Ok(offsets) => {
                debug!("using stored offsets for {}", kind);
                return (offsets, CalibrationStatus::Stored);
            }
            Err(e) => e,
        };

        let identity = CalibrationOffsets::identity(kind);
        let missing = matches!(local_error, CalibrationError::Missing | CalibrationError::NoEntry(_));
        if !self.config.calibration.remote_fetch {
            return if missing {
                info!("no offsets stored for {}, running uncalibrated", kind);
                (identity, CalibrationStatus::Uncalibrated)
            } else {
                warn!("stored offsets unusable: {}", local_error);
                (identity, CalibrationStatus::Degraded)
            };
        }
        let Some(source) = self.calibration_source.as_mut() else {
            warn!("remote calibration enabled but no source configured");
            return (identity, CalibrationStatus::Degraded);
        };

        info!("{}; fetching default offsets", local_error);
        let policy = self.config.retry.calibration.policy();
        let store = &self.calibration;
        let fetched = reliability.execute_if(
            "calibration fetch",
            &policy,
            |_| store.fetch_default(&mut **source, kind),
            |e| matches!(e, CalibrationError::Fetch(_)),
        );
        match fetched {
            Ok(offsets) => {
                if let Err(e) = self.calibration.save(&offsets) {
                    warn!("fetched offsets not cached: {}", e);
                }
                (offsets, CalibrationStatus::Fetched)
            }
            Err(e) => {
                warn!("remote calibration failed, using identity offsets: {}", e);
                (identity, CalibrationStatus::Degraded)
            }
        }
    }

    fn measure<W, D>(
        &self,
        sensor: &mut dyn EnvironmentalSensor,
        reliability: &mut Reliability<W, D>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<SensorReading>
    where
        W: Watchdog,
        D: DelayNs,
    {
        let policy = self.config.retry.read.policy();
        let mut reading = match reliability.execute("sensor read", &policy, |_| sensor.measure()) {
            Ok(reading) => reading,
            Err(e) => {
                error!("{} read failed: {}", sensor.kind(), e);
                diagnostics.push(Diagnostic::SensorReadFailed { attempts: e.attempts });
                return None;
            }
        };

        if reading.gas_resistance_ohm.is_some() && self.config.gas_samples > 0 {
            if let Some(average) = self.average_gas(sensor, reliability) {
                reading.gas_resistance_ohm = Some(average);
            }
        }
        Some(reading)
    }

    // The heater needs several cycles before the resistance settles; the
    // average replaces the single reading when at least one sample succeeds.
    fn average_gas<W, D>(&self, sensor: &mut dyn EnvironmentalSensor, reliability: &mut Reliability<W, D>) -> Option<f32>
    where
        W: Watchdog,
        D: DelayNs,
    {
        let samples = self.config.gas_samples;
        let interval = Duration::from_millis(self.config.gas_sample_interval_ms);
        let mut sum = 0.0f32;
        let mut count = 0u32;
        for i in 0..samples {
            if i > 0 {
                reliability.pause(interval);
            }
            reliability.feed();
            match sensor.read_gas_resistance() {
                Ok(Some(gas)) if gas.is_finite() => {
                    debug!("gas sample {}/{} = {:.0} Ω", i + 1, samples, gas);
                    sum += gas;
                    count += 1;
                }
                Ok(_) => warn!("gas sample {}/{} unusable", i + 1, samples),
                Err(e) => warn!("gas sample {}/{} failed: {}", i + 1, samples, e),
            }
        }
        (count > 0).then(|| {
            let average = sum / count as f32;
            info!("gas average over {} samples = {:.0} Ω", count, average);
            average
        })
    }
}

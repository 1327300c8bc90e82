//! Battery state and charge-direction inference
//!
//! The node has no charger status pin, so whether the pack is charging is
//! inferred by comparing this wake's state of charge to the one persisted by
//! the previous wake:
//!
//! | Condition (first match wins)                      | Status        |
//! |---------------------------------------------------|---------------|
//! | no prior record                                   | `Unknown`     |
//! | `percent >= full_percent` and `V >= full_voltage` | `Charged`     |
//! | `percent - prior > epsilon`                       | `Charging`    |
//! | `prior - percent > epsilon`                       | `Discharging` |
//! | otherwise                                         | prior status  |
//!
//! Exactly one record is persisted. It is read at the start of the battery
//! step, compared, then replaced atomically through a [`BlobStore`]. A commit
//! failure is logged and leaves the previous record in place.

use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::constants::battery::{
    FULL_PERCENT, FULL_VOLTAGE_V, GAUGE_SETTLE_MS, NOISE_EPSILON_PCT, PERCENT_SANE_MAX,
    PERCENT_SANE_MIN, QUICK_START_SETTLE_MS,
};
use crate::errors::{FuelGaugeError, PersistError};
use crate::storage::BlobStore;

/// Inferred charge direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargeStatus {
    /// No prior record to compare against
    Unknown,
    /// State of charge rising
    Charging,
    /// State of charge falling
    Discharging,
    /// At or above the full thresholds
    Charged,
}

impl ChargeStatus {
    /// Lowercase label for sinks and logs
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Unknown => "unknown",
            ChargeStatus::Charging => "charging",
            ChargeStatus::Discharging => "discharging",
            ChargeStatus::Charged => "charged",
        }
    }
}

/// Persisted battery record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Cell voltage (V)
    pub voltage_v: f32,
    /// State of charge (%), clamped to 0..=100
    pub percent: f32,
    /// Wake cycles recorded since the store was empty
    pub cycle: u64,
    /// Inferred status at the time of this record
    pub status: ChargeStatus,
}

impl BatteryState {
    /// Encode as a postcard record
    pub fn encode(&self) -> Result<Vec<u8>, PersistError> {
        postcard::to_allocvec(self).map_err(|_| PersistError::Encode)
    }

    /// Decode a postcard record
    pub fn decode(bytes: &[u8]) -> Result<Self, PersistError> {
        postcard::from_bytes(bytes).map_err(|_| PersistError::Corrupt)
    }
}

/// Thresholds for status inference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryThresholds {
    /// State of charge counted as full (%)
    pub full_percent: f32,
    /// Cell voltage counted as full (V)
    pub full_voltage_v: f32,
    /// Minimum change treated as a trend (%)
    pub noise_epsilon_pct: f32,
}

impl Default for BatteryThresholds {
    fn default() -> Self {
        Self {
            full_percent: FULL_PERCENT,
            full_voltage_v: FULL_VOLTAGE_V,
            noise_epsilon_pct: NOISE_EPSILON_PCT,
        }
    }
}

impl BatteryThresholds {
    /// Apply the inference table to a new sample
    pub fn infer(&self, prior: Option<&BatteryState>, voltage_v: f32, percent: f32) -> ChargeStatus {
        let Some(prior) = prior else {
            return ChargeStatus::Unknown;
        };
        if percent >= self.full_percent && voltage_v >= self.full_voltage_v {
            ChargeStatus::Charged
        } else if percent - prior.percent > self.noise_epsilon_pct {
            ChargeStatus::Charging
        } else if prior.percent - percent > self.noise_epsilon_pct {
            ChargeStatus::Discharging
        } else {
            prior.status
        }
    }
}

/// Fuel gauge register access
pub trait FuelGauge {
    /// Cell voltage (V)
    fn voltage(&mut self) -> Result<f32, FuelGaugeError>;

    /// State of charge (%), unclamped
    fn percent(&mut self) -> Result<f32, FuelGaugeError>;

    /// Restart the gauge's state-of-charge estimation
    ///
    /// Gauges without the feature do nothing.
    fn quick_start(&mut self) -> Result<(), FuelGaugeError> {
        Ok(())
    }
}

impl<G: FuelGauge + ?Sized> FuelGauge for &mut G {
    fn voltage(&mut self) -> Result<f32, FuelGaugeError> {
        (**self).voltage()
    }

    fn percent(&mut self) -> Result<f32, FuelGaugeError> {
        (**self).percent()
    }

    fn quick_start(&mut self) -> Result<(), FuelGaugeError> {
        (**self).quick_start()
    }
}

/// Averaged, sanitized gauge sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeSample {
    /// Cell voltage (V)
    pub voltage_v: f32,
    /// State of charge (%), 0..=100
    pub percent: f32,
}

impl GaugeSample {
    /// Two settled readings averaged
    ///
    /// A state of charge outside the plausible range triggers one quick-start
    /// and a resample. The result is clamped to 0..=100 either way.
    pub fn take<G, D>(gauge: &mut G, delay: &mut D) -> Result<Self, FuelGaugeError>
    where
        G: FuelGauge + ?Sized,
        D: DelayNs + ?Sized,
    {
        let mut sample = Self::averaged(gauge, delay)?;
        if !(PERCENT_SANE_MIN..=PERCENT_SANE_MAX).contains(&sample.percent) {
            warn!("fuel gauge reports {}%, quick-starting", sample.percent);
            match gauge.quick_start() {
                Ok(()) => {
                    delay.delay_ms(QUICK_START_SETTLE_MS);
                    sample = Self::averaged(gauge, delay)?;
                }
                Err(e) => warn!("quick-start failed: {}", e),
            }
        }
        sample.percent = sample.percent.clamp(0.0, 100.0);
        Ok(sample)
    }

    fn averaged<G, D>(gauge: &mut G, delay: &mut D) -> Result<Self, FuelGaugeError>
    where
        G: FuelGauge + ?Sized,
        D: DelayNs + ?Sized,
    {
        let mut voltage = 0.0;
        let mut percent = 0.0;
        for _ in 0..2 {
            delay.delay_ms(GAUGE_SETTLE_MS);
            let v = gauge.voltage()?;
            let p = gauge.percent()?;
            if !v.is_finite() {
                return Err(FuelGaugeError::InvalidData("voltage"));
            }
            if !p.is_finite() {
                return Err(FuelGaugeError::InvalidData("state of charge"));
            }
            voltage += v;
            percent += p;
        }
        Ok(Self { voltage_v: voltage / 2.0, percent: percent / 2.0 })
    }
}

/// Outcome of one battery step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryUpdate {
    /// State computed this wake
    pub state: BatteryState,
    /// Record read at the start of the step
    pub prior: Option<BatteryState>,
    /// Whether `state` was committed
    pub persisted: bool,
}

/// Reads, compares and replaces the persisted battery record
pub struct BatteryStateTracker<B> {
    store: B,
    thresholds: BatteryThresholds,
}

impl<B: BlobStore> BatteryStateTracker<B> {
    /// Tracker over `store`
    pub fn new(store: B, thresholds: BatteryThresholds) -> Self {
        Self { store, thresholds }
    }

    /// Active thresholds
    pub fn thresholds(&self) -> &BatteryThresholds {
        &self.thresholds
    }

    /// Last committed record; unreadable records count as absent
    pub fn load_prior(&mut self) -> Option<BatteryState> {
        match self.store.read() {
            Ok(Some(bytes)) => match BatteryState::decode(&bytes) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!("battery record rejected ({}), treating as first boot", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("battery record unreadable: {}", e);
                None
            }
        }
    }

    /// Sample the gauge, infer status and persist the new record
    pub fn read_and_update<G, D>(&mut self, gauge: &mut G, delay: &mut D) -> Result<BatteryUpdate, FuelGaugeError>
    where
        G: FuelGauge + ?Sized,
        D: DelayNs + ?Sized,
    {
        let sample = GaugeSample::take(gauge, delay)?;
        Ok(self.update(sample))
    }

    /// Infer status for an already-taken sample and persist it
    pub fn update(&mut self, sample: GaugeSample) -> BatteryUpdate {
        let prior = self.load_prior();
        let status = self.thresholds.infer(prior.as_ref(), sample.voltage_v, sample.percent);
        let state = BatteryState {
            voltage_v: sample.voltage_v,
            percent: sample.percent,
            cycle: prior.map_or(0, |p| p.cycle).wrapping_add(1),
            status,
        };

        let persisted = match self.commit(&state) {
            Ok(()) => true,
            Err(e) => {
                error!("battery record not persisted, prior kept: {}", e);
                false
            }
        };
        info!(
            "battery {:.3} V {:.1}% {} (cycle {})",
            state.voltage_v,
            state.percent,
            state.status.as_str(),
            state.cycle
        );

        BatteryUpdate { state, prior, persisted }
    }

    fn commit(&mut self, state: &BatteryState) -> Result<(), PersistError> {
        self.store.commit(&state.encode()?)
    }

    /// Give the store back
    pub fn into_inner(self) -> B {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlob;
    use alloc::vec::Vec;

    struct ScriptedGauge {
        voltage: f32,
        percents: Vec<f32>,
        quick_starts: u32,
    }

    impl FuelGauge for ScriptedGauge {
        fn voltage(&mut self) -> Result<f32, FuelGaugeError> {
            Ok(self.voltage)
        }

        fn percent(&mut self) -> Result<f32, FuelGaugeError> {
            if self.percents.len() > 1 {
                Ok(self.percents.remove(0))
            } else {
                self.percents.first().copied().ok_or(FuelGaugeError::Bus("percent"))
            }
        }

        fn quick_start(&mut self) -> Result<(), FuelGaugeError> {
            self.quick_starts += 1;
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn thresholds() -> BatteryThresholds {
        BatteryThresholds { noise_epsilon_pct: 1.0, ..BatteryThresholds::default() }
    }

    fn sample(percent: f32) -> GaugeSample {
        GaugeSample { voltage_v: 3.9, percent }
    }

    #[test]
    fn status_sequence_over_four_wakes() {
        let mut tracker = BatteryStateTracker::new(MemoryBlob::default(), thresholds());
        let statuses: Vec<ChargeStatus> = [80.0, 82.0, 82.0, 79.0]
            .into_iter()
            .map(|p| tracker.update(sample(p)).state.status)
            .collect();
        assert_eq!(
            statuses,
            [ChargeStatus::Unknown, ChargeStatus::Charging, ChargeStatus::Charging, ChargeStatus::Discharging]
        );
    }

    #[test]
    fn full_thresholds_win_over_trend() {
        let t = BatteryThresholds::default();
        let prior = BatteryState { voltage_v: 4.0, percent: 90.0, cycle: 3, status: ChargeStatus::Charging };
        assert_eq!(t.infer(Some(&prior), 4.19, 99.5), ChargeStatus::Charged);
        assert_eq!(t.infer(Some(&prior), 4.19, 95.0), ChargeStatus::Charging);
        assert_eq!(t.infer(Some(&prior), 4.0, 99.5), ChargeStatus::Charging);
        assert_eq!(t.infer(None, 4.2, 100.0), ChargeStatus::Unknown);
    }

    #[test]
    fn noise_keeps_prior_status() {
        let t = thresholds();
        let prior = BatteryState { voltage_v: 3.8, percent: 60.0, cycle: 1, status: ChargeStatus::Discharging };
        assert_eq!(t.infer(Some(&prior), 3.8, 60.6), ChargeStatus::Discharging);
        assert_eq!(t.infer(Some(&prior), 3.8, 59.5), ChargeStatus::Discharging);
    }

    #[test]
    fn cycle_counter_increments() {
        let mut tracker = BatteryStateTracker::new(MemoryBlob::default(), thresholds());
        assert_eq!(tracker.update(sample(50.0)).state.cycle, 1);
        let update = tracker.update(sample(50.0));
        assert_eq!(update.state.cycle, 2);
        assert_eq!(update.prior.unwrap().cycle, 1);
        assert!(update.persisted);
    }

    #[test]
    fn corrupt_record_counts_as_first_boot() {
        let mut tracker = BatteryStateTracker::new(MemoryBlob::with_contents(&[0xFF]), thresholds());
        let update = tracker.update(sample(70.0));
        assert_eq!(update.prior, None);
        assert_eq!(update.state.status, ChargeStatus::Unknown);
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let state = BatteryState { voltage_v: 3.9, percent: 64.0, cycle: 12, status: ChargeStatus::Discharging };
        let bytes = state.encode().unwrap();
        assert_eq!(BatteryState::decode(&bytes), Ok(state));
        assert_eq!(BatteryState::decode(&bytes[..3]), Err(PersistError::Corrupt));
        assert_eq!(BatteryState::decode(&[]), Err(PersistError::Corrupt));
    }

    #[test]
    fn gauge_samples_are_averaged() {
        let mut gauge = ScriptedGauge { voltage: 3.7, percents: vec![40.0, 42.0], quick_starts: 0 };
        let s = GaugeSample::take(&mut gauge, &mut NoDelay).unwrap();
        assert_eq!(s.percent, 41.0);
        assert_eq!(gauge.quick_starts, 0);
    }

    #[test]
    fn implausible_percent_triggers_quick_start() {
        let mut gauge = ScriptedGauge { voltage: 3.7, percents: vec![250.0, 250.0, 55.0], quick_starts: 0 };
        let s = GaugeSample::take(&mut gauge, &mut NoDelay).unwrap();
        assert_eq!(gauge.quick_starts, 1);
        assert_eq!(s.percent, 55.0);
    }

    #[test]
    fn still_implausible_after_quick_start_is_clamped() {
        let mut gauge = ScriptedGauge { voltage: 3.7, percents: vec![-5.0], quick_starts: 0 };
        let s = GaugeSample::take(&mut gauge, &mut NoDelay).unwrap();
        assert_eq!(s.percent, 0.0);
    }
}

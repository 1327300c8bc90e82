//! Node configuration
//!
//! ## Sources
//!
//! 1. Built-in defaults ([`NodeConfig::default`])
//! 2. A JSON document ([`NodeConfig::from_file`]); absent keys keep defaults
//! 3. Environment overrides ([`NodeConfig::apply_env`]), using the variable
//!    names of the board's `settings.toml`
//!
//! | Variable                   | Setting                          |
//! |----------------------------|----------------------------------|
//! | `AIO_ENABLE`               | `adafruit_io.enabled`            |
//! | `ADAFRUIT_AIO_USERNAME`    | `adafruit_io.username`           |
//! | `ADAFRUIT_AIO_KEY`         | `adafruit_io.key`                |
//! | `AIO_GROUP_KEY`            | `adafruit_io.group`              |
//! | `AIO_REF_GROUP`            | `calibration.reference_group`    |
//! | `INFLUX_ENABLE`            | `influx.enabled`                 |
//! | `INFLUX_URL`               | `influx.url`                     |
//! | `INFLUX_ORG` / `_BUCKET` / `_TOKEN` | v2 target               |
//! | `INFLUX_V1_DB` / `_USER` / `_PASS`  | v1 target               |
//! | `INTEGRATED_SENSOR`        | `calibration.remote_fetch`       |
//! | `SLEEP_SECONDS`            | `sleep_seconds`                  |
//!
//! Flags accept `1`, `true`, `yes`, `on` and `y` (any case, optionally
//! quoted); any other non-empty value is false. Empty values are ignored.
//!
//! ## Validation
//!
//! [`NodeConfig::validate`] rejects settings that would make a cycle unsafe,
//! most importantly any retry wait that could outlast the watchdog.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use atmos_connectors::adafruit_io::{AdafruitIoConfig, AdafruitIoSink, DEFAULT_BASE_URL};
use atmos_connectors::http::{validate_url, HttpTransport};
use atmos_connectors::influx::{InfluxConfig, InfluxSink, InfluxTarget};
use atmos_connectors::{FieldMap, TelemetryDispatcher};
use atmos_core::constants::time::{GAS_SAMPLES, GAS_SAMPLE_INTERVAL_MS};
use atmos_core::constants::{DEFAULT_SLEEP_SECONDS, SEA_LEVEL_PRESSURE_HPA, WATCHDOG_TIMEOUT_MS};
use atmos_core::{BatteryThresholds, DerivedOptions, RetryPolicy};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config document is not valid JSON for [`NodeConfig`]
    #[error("Invalid config document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Environment variable has an unusable value
    #[error("Invalid value for {name}: {value:?}")]
    Env {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// Settings are inconsistent or unsafe
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serialisable form of a [`RetryPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Total attempts
    pub max_attempts: u32,
    /// First backoff wait (ms)
    pub base_delay_ms: u64,
    /// Longest backoff wait (ms)
    pub max_delay_ms: u64,
    /// Growth factor between waits
    pub backoff_multiplier: f32,
}

impl Default for PolicySettings {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl From<RetryPolicy> for PolicySettings {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

impl PolicySettings {
    /// Runtime policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }
}

/// Retry budgets per wake-cycle step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Sensor detection pass
    pub detect: PolicySettings,
    /// Sensor measurement
    pub read: PolicySettings,
    /// Remote calibration fetch
    pub calibration: PolicySettings,
    /// Fuel gauge sampling
    pub battery: PolicySettings,
    /// Every sink
    pub sinks: PolicySettings,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            detect: RetryPolicy::detection().into(),
            read: PolicySettings::default(),
            calibration: PolicySettings::default(),
            battery: PolicySettings::default(),
            sinks: PolicySettings::default(),
        }
    }
}

impl RetrySettings {
    fn named(&self) -> [(&'static str, &PolicySettings); 5] {
        [
            ("detect", &self.detect),
            ("read", &self.read),
            ("calibration", &self.calibration),
            ("battery", &self.battery),
            ("sinks", &self.sinks),
        ]
    }
}

/// Where calibration offsets come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Fetch default offsets when none are stored locally
    pub remote_fetch: bool,
    /// Default offsets document
    pub url: String,
    /// Adafruit IO group publishing reference readings
    pub reference_group: String,
    /// Samples averaged in calibration mode
    pub samples: u32,
    /// Wait between calibration samples (ms)
    pub sample_interval_ms: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            remote_fetch: false,
            url: String::new(),
            reference_group: String::new(),
            samples: 60,
            sample_interval_ms: 1_000,
        }
    }
}

/// Adafruit IO sink settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdafruitIoSettings {
    /// Send to Adafruit IO
    pub enabled: bool,
    /// API root
    pub base_url: String,
    /// Account name
    pub username: String,
    /// AIO key
    pub key: String,
    /// Telemetry group
    pub group: String,
    /// Canonical field name to feed key overrides
    pub renames: BTreeMap<String, String>,
}

impl Default for AdafruitIoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_BASE_URL.into(),
            username: String::new(),
            key: String::new(),
            group: String::new(),
            renames: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for AdafruitIoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdafruitIoSettings")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("key", &"***")
            .field("group", &self.group)
            .field("renames", &self.renames)
            .finish()
    }
}

/// InfluxDB sink settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxSettings {
    /// Send to InfluxDB
    pub enabled: bool,
    /// Server root
    pub url: String,
    /// v2 organization
    pub org: String,
    /// v2 bucket
    pub bucket: String,
    /// v2 token
    pub token: String,
    /// v1 database
    pub v1_database: String,
    /// v1 user
    pub v1_username: String,
    /// v1 password
    pub v1_password: String,
    /// Measurement name
    pub measurement: String,
    /// Canonical field name to field key overrides
    pub renames: BTreeMap<String, String>,
}

impl Default for InfluxSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:8086".into(),
            org: String::new(),
            bucket: String::new(),
            token: String::new(),
            v1_database: String::new(),
            v1_username: String::new(),
            v1_password: String::new(),
            measurement: "atmos".into(),
            renames: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for InfluxSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxSettings")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("v1_database", &self.v1_database)
            .field("v1_username", &self.v1_username)
            .field("measurement", &self.measurement)
            .finish_non_exhaustive()
    }
}

impl InfluxSettings {
    /// v2 when org, bucket and token are all set, else v1 when a database is set
    pub fn target(&self) -> Option<InfluxTarget> {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        if !self.token.is_empty() && !self.org.is_empty() && !self.bucket.is_empty() {
            Some(InfluxTarget::V2 { org: self.org.clone(), bucket: self.bucket.clone(), token: self.token.clone() })
        } else if !self.v1_database.is_empty() {
            Some(InfluxTarget::V1 {
                database: self.v1_database.clone(),
                username: non_empty(&self.v1_username),
                password: non_empty(&self.v1_password),
            })
        } else {
            None
        }
    }
}

/// Everything a wake cycle needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Human readable device name
    pub sensor_name: String,
    /// Reported firmware version
    pub firmware_version: String,
    /// Deep sleep between cycles (s)
    pub sleep_seconds: u64,
    /// Hardware watchdog timeout (ms)
    pub watchdog_timeout_ms: u64,
    /// Sea-level reference pressure (hPa)
    pub sea_level_hpa: f32,
    /// Use `sea_level_hpa` for psychrometrics when the sensor has no barometer
    pub assume_sea_level_pressure: bool,
    /// Gas resistance samples averaged per cycle (0 disables averaging)
    pub gas_samples: u32,
    /// Wait between gas samples (ms)
    pub gas_sample_interval_ms: u64,
    /// Retry budgets
    pub retry: RetrySettings,
    /// Charge inference thresholds
    pub battery: BatteryThresholds,
    /// Calibration sources
    pub calibration: CalibrationSettings,
    /// Adafruit IO sink
    pub adafruit_io: AdafruitIoSettings,
    /// InfluxDB sink
    pub influx: InfluxSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sensor_name: "HowlX Atmos".into(),
            firmware_version: atmos_core::VERSION.into(),
            sleep_seconds: DEFAULT_SLEEP_SECONDS,
            watchdog_timeout_ms: WATCHDOG_TIMEOUT_MS,
            sea_level_hpa: SEA_LEVEL_PRESSURE_HPA,
            assume_sea_level_pressure: true,
            gas_samples: GAS_SAMPLES,
            gas_sample_interval_ms: GAS_SAMPLE_INTERVAL_MS,
            retry: RetrySettings::default(),
            battery: BatteryThresholds::default(),
            calibration: CalibrationSettings::default(),
            adafruit_io: AdafruitIoSettings::default(),
            influx: InfluxSettings::default(),
        }
    }
}

/// Loose boolean parsing for environment flags
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase();
    matches!(value.as_str(), "1" | "true" | "yes" | "on" | "y")
}

impl NodeConfig {
    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`; unset and empty variables are skipped
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let strings: [(&str, &mut String); 11] = [
            ("ADAFRUIT_AIO_USERNAME", &mut self.adafruit_io.username),
            ("ADAFRUIT_AIO_KEY", &mut self.adafruit_io.key),
            ("AIO_GROUP_KEY", &mut self.adafruit_io.group),
            ("AIO_REF_GROUP", &mut self.calibration.reference_group),
            ("INFLUX_URL", &mut self.influx.url),
            ("INFLUX_ORG", &mut self.influx.org),
            ("INFLUX_BUCKET", &mut self.influx.bucket),
            ("INFLUX_TOKEN", &mut self.influx.token),
            ("INFLUX_V1_DB", &mut self.influx.v1_database),
            ("INFLUX_V1_USER", &mut self.influx.v1_username),
            ("INFLUX_V1_PASS", &mut self.influx.v1_password),
        ];
        for (name, slot) in strings {
            if let Some(value) = get(name) {
                *slot = value;
            }
        }

        let flags: [(&str, &mut bool); 3] = [
            ("AIO_ENABLE", &mut self.adafruit_io.enabled),
            ("INFLUX_ENABLE", &mut self.influx.enabled),
            ("INTEGRATED_SENSOR", &mut self.calibration.remote_fetch),
        ];
        for (name, slot) in flags {
            if let Some(value) = get(name) {
                *slot = parse_flag(&value);
            }
        }

        if let Some(value) = get("SLEEP_SECONDS") {
            self.sleep_seconds = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { name: "SLEEP_SECONDS", value: value.clone() })?;
        }
        Ok(())
    }

    /// Check the configuration is safe to run
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.sleep_seconds == 0 {
            return invalid("sleep_seconds must be positive".into());
        }
        if self.watchdog_timeout_ms == 0 {
            return invalid("watchdog_timeout_ms must be positive".into());
        }
        for (name, policy) in self.retry.named() {
            if policy.max_attempts == 0 {
                return invalid(format!("retry.{name}.max_attempts must be at least 1"));
            }
            if policy.max_delay_ms >= self.watchdog_timeout_ms {
                return invalid(format!(
                    "retry.{name}.max_delay_ms ({}) must be shorter than the watchdog timeout ({})",
                    policy.max_delay_ms, self.watchdog_timeout_ms
                ));
            }
            if policy.base_delay_ms > policy.max_delay_ms {
                return invalid(format!("retry.{name}.base_delay_ms exceeds max_delay_ms"));
            }
            if policy.backoff_multiplier.is_nan() || policy.backoff_multiplier < 1.0 {
                return invalid(format!("retry.{name}.backoff_multiplier must be at least 1"));
            }
        }
        if self.gas_sample_interval_ms >= self.watchdog_timeout_ms {
            return invalid("gas_sample_interval_ms must be shorter than the watchdog timeout".into());
        }
        if self.sea_level_hpa.is_nan() || self.sea_level_hpa <= 0.0 {
            return invalid("sea_level_hpa must be positive".into());
        }

        let aio = &self.adafruit_io;
        if aio.enabled {
            if aio.username.is_empty() || aio.key.is_empty() || aio.group.is_empty() {
                return invalid("Adafruit IO needs ADAFRUIT_AIO_USERNAME, ADAFRUIT_AIO_KEY and AIO_GROUP_KEY".into());
            }
            validate_url(&aio.base_url).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.influx.enabled {
            validate_url(&self.influx.url).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.calibration.remote_fetch {
            validate_url(&self.calibration.url).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Deep sleep duration
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(self.sleep_seconds)
    }

    /// Watchdog timeout
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    /// Options for derived quantities
    pub fn derived_options(&self) -> DerivedOptions {
        DerivedOptions {
            sea_level_hpa: self.sea_level_hpa,
            assume_sea_level_pressure: self.assume_sea_level_pressure,
        }
    }

    /// Adafruit IO sink settings, if enabled
    pub fn adafruit_io_config(&self) -> Option<AdafruitIoConfig> {
        let aio = &self.adafruit_io;
        aio.enabled.then(|| {
            AdafruitIoConfig::new(aio.username.as_str(), aio.key.as_str(), aio.group.as_str())
                .base_url(aio.base_url.as_str())
                .field_map(FieldMap::kebab().with_renames(aio.renames.clone()))
                .retry(self.retry.sinks.policy())
        })
    }

    /// InfluxDB sink settings, if enabled and addressable
    pub fn influx_config(&self) -> Option<InfluxConfig> {
        if !self.influx.enabled {
            return None;
        }
        let Some(target) = self.influx.target() else {
            warn!("Influx enabled but neither org/bucket/token nor a v1 database is set");
            return None;
        };
        Some(
            InfluxConfig::new(self.influx.url.as_str(), target)
                .measurement(self.influx.measurement.as_str())
                .field_map(FieldMap::snake().with_renames(self.influx.renames.clone()))
                .retry(self.retry.sinks.policy()),
        )
    }

    /// Dispatcher with every enabled sink, each on its own clone of `transport`
    pub fn build_dispatcher<T>(&self, transport: T) -> TelemetryDispatcher
    where
        T: HttpTransport + Clone + 'static,
    {
        let mut dispatcher = TelemetryDispatcher::new();
        if let Some(config) = self.adafruit_io_config() {
            dispatcher.push(Box::new(AdafruitIoSink::new(config, transport.clone())));
        }
        if let Some(config) = self.influx_config() {
            dispatcher.push(Box::new(InfluxSink::new(config, transport)));
        }
        info!("Sinks enabled: {:?}", dispatcher.names());
        dispatcher
    }
}

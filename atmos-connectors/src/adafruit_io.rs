//! Adafruit IO group sink
//!
//! Every field of a record goes out in one batched group write:
//!
//! ```text
//! POST {base}/{username}/groups/{group}/data
//! X-AIO-Key: <key>
//!
//! {"feeds": [{"key": "sensor-name", "value": "HowlX Atmos [SHT30:S2-FE74A8]"},
//!            {"key": "temperature-c", "value": 21.5}, ...]}
//! ```
//!
//! The same API doubles as the reference instrument for bench calibration:
//! [`AdafruitIoSink::fetch_reference`] reads the last value of the
//! temperature, humidity and pressure feeds of a reference group.

use atmos_core::{Reference, RetryPolicy, TelemetryRecord};
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::fields::{json_value, FieldMap};
use crate::http::{join_url, AuthMethod, HttpRequest, HttpTransport};
use crate::{check_status, Sink, SinkError};

const SINK_NAME: &str = "adafruit_io";

/// Public Adafruit IO REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://io.adafruit.com/api/v2";

/// Adafruit IO settings
#[derive(Clone)]
pub struct AdafruitIoConfig {
    /// API root, without the user segment
    pub base_url: String,
    /// Account name
    pub username: String,
    /// AIO key, sent as `X-AIO-Key`
    pub key: String,
    /// Group receiving the telemetry feeds
    pub group: String,
    /// Feed key naming
    pub field_map: FieldMap,
    /// Retry budget per cycle
    pub retry: RetryPolicy,
}

impl AdafruitIoConfig {
    /// Settings for `group` on the public endpoint
    pub fn new(username: impl Into<String>, key: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            username: username.into(),
            key: key.into(),
            group: group.into(),
            field_map: FieldMap::kebab(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point at another API root (self-hosted proxy, tests)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Replace the feed key mapping
    pub fn field_map(mut self, field_map: FieldMap) -> Self {
        self.field_map = field_map;
        self
    }

    /// Replace the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn auth(&self) -> AuthMethod {
        AuthMethod::ApiKey { header: "X-AIO-Key".into(), value: self.key.clone() }
    }
}

impl std::fmt::Debug for AdafruitIoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdafruitIoConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("key", &"***")
            .field("group", &self.group)
            .field("field_map", &self.field_map)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Sends records to an Adafruit IO group
pub struct AdafruitIoSink<T> {
    config: AdafruitIoConfig,
    transport: T,
}

#[derive(Deserialize)]
struct GroupFeed {
    #[serde(default)]
    key: String,
    #[serde(default)]
    last_value: Option<Value>,
}

#[derive(Deserialize)]
struct Group {
    #[serde(default)]
    feeds: Vec<GroupFeed>,
}

impl<T: HttpTransport> AdafruitIoSink<T> {
    /// Create a sink sending through `transport`
    pub fn new(config: AdafruitIoConfig, transport: T) -> Self {
        Self { config, transport }
    }

    /// Settings in use
    pub fn config(&self) -> &AdafruitIoConfig {
        &self.config
    }

    /// JSON body of the group write for `record`
    pub fn payload(&self, record: &TelemetryRecord) -> Value {
        let map = &self.config.field_map;
        let feeds: Vec<Value> = record
            .identity_fields()
            .into_iter()
            .chain(record.fields())
            .map(|field| json!({ "key": map.key_for(field.name), "value": json_value(&field.value) }))
            .collect();
        json!({ "feeds": feeds })
    }

    /// Last reference values published to `group`
    ///
    /// Feeds are matched by key suffix, so both `temperature-c` and
    /// `reference.temperature-c` are found. Temperature is mandatory.
    pub fn fetch_reference(&mut self, group: &str) -> Result<Reference, SinkError> {
        let url = join_url(&self.config.base_url, &format!("{}/groups/{}", self.config.username, group));
        let request = HttpRequest::get(url).auth(&self.config.auth());
        let response = check_status(SINK_NAME, self.transport.execute(&request)?)?;

        let document: Group =
            serde_json::from_str(&response.body).map_err(|e| SinkError::Response(format!("group document: {e}")))?;

        let map = &self.config.field_map;
        let last_value = |canonical: &str| -> Option<f32> {
            let suffix = map.key_for(canonical).to_ascii_lowercase();
            let feed = document.feeds.iter().find(|f| f.key.to_ascii_lowercase().ends_with(&suffix))?;
            match feed.last_value.as_ref()? {
                Value::String(text) => text.trim().parse().ok(),
                Value::Number(n) => n.as_f64().map(|v| v as f32),
                _ => None,
            }
        };

        let temperature_c = last_value("temperature_c")
            .ok_or_else(|| SinkError::Response(format!("group {group} has no temperature reference")))?;
        let reference = Reference {
            temperature_c,
            humidity_pct: last_value("humidity_pct"),
            pressure_hpa: last_value("pressure_hpa"),
        };
        debug!("Reference from Adafruit IO: {:?}", reference);
        Ok(reference)
    }
}

impl<T: HttpTransport> Sink for AdafruitIoSink<T> {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    fn send(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let body = serde_json::to_string(&self.payload(record)).map_err(|e| SinkError::Encode(e.to_string()))?;
        let url = join_url(
            &self.config.base_url,
            &format!("{}/groups/{}/data", self.config.username, self.config.group),
        );
        let request = HttpRequest::post(url, body)
            .auth(&self.config.auth())
            .header("Content-Type", "application/json");
        check_status(SINK_NAME, self.transport.execute(&request)?)?;
        debug!("Adafruit IO accepted group write to {}", self.config.group);
        Ok(())
    }
}

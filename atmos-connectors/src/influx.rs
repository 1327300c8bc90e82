//! InfluxDB sink (line protocol over HTTP)
//!
//! One point per wake cycle:
//!
//! ```text
//! atmos,device=BME280:S2-FE74A8,sensor=BME280,name=HowlX\ Atmos,firmware=1.0.9 temperature_c=21.50,...,calibrated=1i 1700000000
//! ```
//!
//! Timestamps are whole seconds and only present when the record carries
//! wall clock time; otherwise the server stamps the point on arrival.
//!
//! ## Targets
//!
//! - **v2**: `POST /api/v2/write?org=..&bucket=..&precision=s`, `Authorization: Token`
//! - **v1**: `POST /write?db=..&precision=s`, basic auth when a user is set

use atmos_core::{FieldValue, RetryPolicy, TelemetryRecord};
use log::debug;

use crate::fields::{text_value, FieldMap};
use crate::http::{join_url, AuthMethod, HttpRequest, HttpTransport};
use crate::{check_status, Sink, SinkError};

const SINK_NAME: &str = "influx";

/// Database addressing and credentials
#[derive(Clone, PartialEq, Eq)]
pub enum InfluxTarget {
    /// InfluxDB 2.x / Cloud
    V2 {
        /// Organization
        org: String,
        /// Bucket
        bucket: String,
        /// API token
        token: String,
    },
    /// InfluxDB 1.x
    V1 {
        /// Database
        database: String,
        /// User, basic auth is sent when present
        username: Option<String>,
        /// Password
        password: Option<String>,
    },
}

impl std::fmt::Debug for InfluxTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfluxTarget::V2 { org, bucket, .. } => write!(f, "V2 {{ org: {org}, bucket: {bucket}, token: *** }}"),
            InfluxTarget::V1 { database, username, .. } => {
                write!(f, "V1 {{ database: {database}, username: {username:?} }}")
            }
        }
    }
}

/// InfluxDB settings
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Server root, e.g. `http://localhost:8086`
    pub url: String,
    /// v1 or v2 addressing
    pub target: InfluxTarget,
    /// Measurement name
    pub measurement: String,
    /// Field key naming
    pub field_map: FieldMap,
    /// Retry budget per cycle
    pub retry: RetryPolicy,
}

impl InfluxConfig {
    /// Settings for `target` on the server at `url`
    pub fn new(url: impl Into<String>, target: InfluxTarget) -> Self {
        Self {
            url: url.into(),
            target,
            measurement: "atmos".into(),
            field_map: FieldMap::snake(),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the measurement name
    pub fn measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = measurement.into();
        self
    }

    /// Replace the field key mapping
    pub fn field_map(mut self, field_map: FieldMap) -> Self {
        self.field_map = field_map;
        self
    }

    /// Replace the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Writes records as line protocol points
pub struct InfluxSink<T> {
    config: InfluxConfig,
    transport: T,
}

// Measurement names escape commas and spaces
fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

// Tag keys, tag values and field keys also escape '='
fn escape_key(value: &str) -> String {
    value.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn field_value(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Float { value: v, .. } if !v.is_finite() => None,
        FieldValue::Float { .. } => Some(text_value(value)),
        FieldValue::Integer(n) => Some(format!("{n}i")),
        FieldValue::Text(text) => Some(quote(text)),
    }
}

impl<T: HttpTransport> InfluxSink<T> {
    /// Create a sink writing through `transport`
    pub fn new(config: InfluxConfig, transport: T) -> Self {
        Self { config, transport }
    }

    /// Settings in use
    pub fn config(&self) -> &InfluxConfig {
        &self.config
    }

    /// Line protocol point for `record`
    pub fn line(&self, record: &TelemetryRecord) -> Result<String, SinkError> {
        let tags = [
            ("device", record.identity.as_str()),
            ("sensor", record.identity.kind().name()),
            ("name", record.sensor_name.as_str()),
            ("firmware", record.firmware_version.as_str()),
        ];
        let mut line = escape_measurement(&self.config.measurement);
        for (key, value) in tags.iter().filter(|(_, v)| !v.is_empty()) {
            line.push(',');
            line.push_str(key);
            line.push('=');
            line.push_str(&escape_key(value));
        }

        let fields: Vec<String> = record
            .fields()
            .iter()
            .filter_map(|field| {
                let value = field_value(&field.value)?;
                Some(format!("{}={}", escape_key(&self.config.field_map.key_for(field.name)), value))
            })
            .collect();
        if fields.is_empty() {
            return Err(SinkError::Encode("record has no fields".into()));
        }
        line.push(' ');
        line.push_str(&fields.join(","));

        if record.wall_clock {
            line.push(' ');
            line.push_str(&(record.timestamp_ms / 1000).to_string());
        }
        Ok(line)
    }

    fn request(&self, body: String) -> HttpRequest {
        let request = match &self.config.target {
            InfluxTarget::V2 { org, bucket, token } => HttpRequest::post(join_url(&self.config.url, "api/v2/write"), body)
                .query("org", org.as_str())
                .query("bucket", bucket.as_str())
                .query("precision", "s")
                .auth(&AuthMethod::Token(token.clone()))
                .header("Accept", "application/json"),
            InfluxTarget::V1 { database, username, password } => {
                let request = HttpRequest::post(join_url(&self.config.url, "write"), body)
                    .query("db", database.as_str())
                    .query("precision", "s");
                match username {
                    Some(username) => request.auth(&AuthMethod::Basic {
                        username: username.clone(),
                        password: password.clone().unwrap_or_default(),
                    }),
                    None => request,
                }
            }
        };
        request.header("Content-Type", "text/plain; charset=utf-8")
    }
}

impl<T: HttpTransport> Sink for InfluxSink<T> {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    fn send(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let line = self.line(record)?;
        let request = self.request(line);
        let response = check_status(SINK_NAME, self.transport.execute(&request)?)?;
        debug!("InfluxDB write status: {}", response.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bme280_record, ScriptedTransport};

    fn v2() -> InfluxTarget {
        InfluxTarget::V2 { org: "home".into(), bucket: "sensors".into(), token: "tok".into() }
    }

    fn sink(target: InfluxTarget, transport: ScriptedTransport) -> InfluxSink<ScriptedTransport> {
        InfluxSink::new(InfluxConfig::new("http://influx:8086", target), transport)
    }

    #[test]
    fn line_has_tags_fields_and_seconds() {
        let sink = sink(v2(), ScriptedTransport::default());
        let line = sink.line(&bme280_record()).unwrap();

        assert!(line.starts_with(
            "atmos,device=BME280:S2-FE74A8,sensor=BME280,name=HowlX\\ Atmos,firmware=1.0.9 temperature_c=21.50,"
        ));
        assert!(line.contains(",humidity_pct=48.25,"));
        assert!(line.contains(",battery_v=3.912,"));
        assert!(line.contains(",charging_state=\"discharging\","));
        assert!(line.contains(",offset_press=0.80,"));
        assert!(line.ends_with(",calibrated=1i 1700000000"));
    }

    #[test]
    fn boot_relative_records_have_no_timestamp() {
        let mut record = bme280_record();
        record.wall_clock = false;
        let line = sink(v2(), ScriptedTransport::default()).line(&record).unwrap();
        assert!(line.ends_with("calibrated=1i"));
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_key("a b,c=d"), "a\\ b\\,c\\=d");
        assert_eq!(escape_measurement("my meas,x"), "my\\ meas\\,x");
        assert_eq!(quote("say \"hi\" \\o/"), "\"say \\\"hi\\\" \\\\o/\"");
    }

    #[test]
    fn non_finite_floats_are_dropped() {
        let mut record = bme280_record();
        if let Some(battery) = record.battery.as_mut() {
            battery.voltage_v = f32::NAN;
        }
        let line = sink(v2(), ScriptedTransport::default()).line(&record).unwrap();
        assert!(!line.contains("battery_v"));
        assert!(line.contains("battery_pct=81.5"));
    }

    #[test]
    fn v2_write_request() {
        let transport = ScriptedTransport::default().respond(204, "");
        let mut sink = sink(v2(), transport.clone());
        sink.send(&bme280_record()).unwrap();

        let request = transport.last_request();
        assert_eq!(request.url, "http://influx:8086/api/v2/write");
        assert_eq!(
            request.query,
            vec![
                ("org".to_string(), "home".to_string()),
                ("bucket".to_string(), "sensors".to_string()),
                ("precision".to_string(), "s".to_string()),
            ]
        );
        assert_eq!(request.header_value("Authorization"), Some("Token tok"));
        assert_eq!(request.header_value("Content-Type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn v1_write_request_with_and_without_user() {
        let transport = ScriptedTransport::default();
        let target = InfluxTarget::V1 { database: "atmos".into(), username: Some("user".into()), password: Some("pass".into()) };
        sink(target, transport.clone()).send(&bme280_record()).unwrap();
        let request = transport.last_request();
        assert_eq!(request.url, "http://influx:8086/write");
        assert_eq!(request.query[0], ("db".to_string(), "atmos".to_string()));
        assert_eq!(request.header_value("authorization"), Some("Basic dXNlcjpwYXNz"));

        let transport = ScriptedTransport::default();
        let target = InfluxTarget::V1 { database: "atmos".into(), username: None, password: None };
        sink(target, transport.clone()).send(&bme280_record()).unwrap();
        assert_eq!(transport.last_request().header_value("authorization"), None);
    }

    #[test]
    fn server_error_is_retryable_rejection() {
        let mut sink = sink(v2(), ScriptedTransport::default().respond(503, "overloaded"));
        let err = sink.send(&bme280_record()).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, SinkError::Rejected { status: 503, .. }));
    }

    #[test]
    fn debug_hides_token() {
        let target = InfluxTarget::V2 { org: "o".into(), bucket: "b".into(), token: "secret-token".into() };
        assert!(!format!("{target:?}").contains("secret-token"));
    }
}

//! Telemetry Sinks for the Atmos Node
//!
//! ## Overview
//!
//! A wake cycle produces exactly one [`TelemetryRecord`]. This crate ships it
//! to every configured backend and reports, per backend, whether it landed.
//!
//! ```text
//!                      ┌──▶ AdafruitIoSink ──▶ POST /{user}/groups/{group}/data
//! TelemetryRecord ─────┤
//!   (dispatcher)       └──▶ InfluxSink ──────▶ POST /api/v2/write  |  /write (v1)
//! ```
//!
//! ## Sink Selection Guide
//!
//! ### Adafruit IO
//!
//! **When to use:** dashboards and alerts without running infrastructure.
//!
//! - One batched group write per cycle (a single request for all feeds)
//! - Feed keys are kebab-case (`temperature-c`); override with a [`FieldMap`]
//! - Also serves as the reference source for bench calibration
//!
//! ### InfluxDB
//!
//! **When to use:** long-term storage and Grafana.
//!
//! - Line protocol, one point per cycle
//! - v2 (org/bucket/token) preferred, v1 (database, optional user) supported
//! - Identity and firmware version are tags, measurements are fields
//!
//! ## Failure Isolation
//!
//! Sinks are independent. Each runs under its own [`RetryPolicy`] through the
//! node's reliability wrapper; one sink exhausting its retries never prevents
//! the next from running. Only transport failures, HTTP 5xx and HTTP 429 are
//! retried. A 4xx means the request itself is wrong, so repeating it only
//! burns battery.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use atmos_connectors::{influx::{InfluxConfig, InfluxSink, InfluxTarget}, TelemetryDispatcher};
//! use atmos_connectors::http::{HttpConfig, UreqTransport};
//!
//! let transport = UreqTransport::new(HttpConfig::default()).unwrap();
//! let influx = InfluxSink::new(
//!     InfluxConfig::new(
//!         "http://localhost:8086",
//!         InfluxTarget::V2 { org: "home".into(), bucket: "sensors".into(), token: "secret".into() },
//!     ),
//!     transport,
//! );
//! let dispatcher = TelemetryDispatcher::new().with_sink(Box::new(influx));
//! assert_eq!(dispatcher.len(), 1);
//! ```

pub mod adafruit_io;
pub mod calibration_source;
pub mod dispatcher;
pub mod fields;
pub mod http;
pub mod influx;

#[cfg(test)]
mod testing;

pub use dispatcher::{SinkResult, TelemetryDispatcher};
pub use fields::FieldMap;

use atmos_core::{RetryPolicy, TelemetryRecord};
use thiserror::Error;

use crate::http::{HttpError, HttpResponse};

/// Errors a sink can report for one send
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport failure (DNS, TLS, timeout, connection reset)
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Backend answered with a non-success status
    #[error("{sink} rejected the write with HTTP {status}: {message}")]
    Rejected {
        /// Sink name
        sink: &'static str,
        /// HTTP status
        status: u16,
        /// Response body, truncated
        message: String,
    },

    /// Record could not be encoded for this backend
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Response body could not be understood
    #[error("Unexpected response: {0}")]
    Response(String),
}

impl SinkError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::Http(_) => true,
            SinkError::Rejected { status, .. } => *status >= 500 || *status == 429,
            SinkError::Encode(_) | SinkError::Response(_) => false,
        }
    }
}

// Longest response body kept in a `Rejected` error
const MAX_ERROR_BODY: usize = 200;

/// Turn a non-2xx response into [`SinkError::Rejected`]
pub(crate) fn check_status(sink: &'static str, response: HttpResponse) -> Result<HttpResponse, SinkError> {
    if response.is_success() {
        return Ok(response);
    }
    let message: String = response.body.chars().take(MAX_ERROR_BODY).collect();
    Err(SinkError::Rejected { sink, status: response.status, message })
}

/// A backend that accepts telemetry records
pub trait Sink {
    /// Short name used in logs and results
    fn name(&self) -> &'static str;

    /// Retry budget for this backend
    fn retry_policy(&self) -> &RetryPolicy;

    /// Deliver one record; a single attempt, retries are the caller's job
    fn send(&mut self, record: &TelemetryRecord) -> Result<(), SinkError>;
}

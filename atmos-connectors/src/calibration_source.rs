//! Remote default offsets over HTTP
//!
//! A freshly flashed node has no local calibration. The fleet keeps a default
//! offsets document (keyed by sensor kind, or flat) at a fixed URL; the node
//! downloads it once and caches the entry for its sensor locally.

use atmos_core::{CalibrationError, CalibrationSource};
use log::debug;

use crate::http::{HttpRequest, HttpTransport};

/// Fetches the default offsets document with a GET
pub struct HttpCalibrationSource<T> {
    url: String,
    transport: T,
}

impl<T: HttpTransport> HttpCalibrationSource<T> {
    /// Source reading `url` through `transport`
    pub fn new(url: impl Into<String>, transport: T) -> Self {
        Self { url: url.into(), transport }
    }

    /// Document location
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<T: HttpTransport> CalibrationSource for HttpCalibrationSource<T> {
    fn fetch(&mut self) -> Result<String, CalibrationError> {
        let response = self
            .transport
            .execute(&HttpRequest::get(self.url.as_str()))
            .map_err(|e| CalibrationError::Fetch(e.to_string()))?;
        if !response.is_success() {
            return Err(CalibrationError::Fetch(format!("HTTP {} from {}", response.status, self.url)));
        }
        debug!("Fetched {} bytes of default offsets", response.body.len());
        Ok(response.body)
    }
}

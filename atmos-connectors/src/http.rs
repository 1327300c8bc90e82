//! HTTP/HTTPS Transport for Atmos Sinks
//!
//! ## Overview
//!
//! Both sinks speak plain HTTP requests. They build an [`HttpRequest`] and
//! hand it to an [`HttpTransport`]; the transport only moves bytes. Keeping
//! the seam this narrow means sinks are tested against a scripted transport
//! and the node can swap in a board-specific socket stack.
//!
//! ## Implementation Choices
//!
//! - Blocking requests: a wake cycle is sequential and short-lived
//! - No retries inside the transport: the dispatcher owns retry and backoff,
//!   so the watchdog is fed between attempts
//! - Any HTTP status is a successful *transport* result; deciding whether a
//!   4xx/5xx is an error is the sink's job
//!
//! ## Security
//!
//! - **HTTPS recommended**: plain HTTP is accepted for LAN InfluxDB servers
//! - **Credentials** only ever travel in headers, never in URLs or logs
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use atmos_connectors::http::{AuthMethod, HttpConfig, HttpRequest, HttpTransport, UreqTransport};
//!
//! let mut transport = UreqTransport::new(HttpConfig::default().timeout_secs(10))?;
//! let request = HttpRequest::get("https://example.com/offsets.json")
//!     .auth(&AuthMethod::Bearer("token".into()));
//! let response = transport.execute(&request)?;
//! println!("{}", response.status);
//! # Ok::<(), atmos_connectors::http::HttpError>(())
//! ```

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// HTTP-specific errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Headers added to every request
    pub headers: Vec<(String, String)>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: format!("Atmos/{}", env!("CARGO_PKG_VERSION")),
            headers: Vec::new(),
        }
    }
}

impl HttpConfig {
    /// Set request timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add custom header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Authentication methods
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `Authorization: Token <token>` (InfluxDB v2)
    Token(String),
    /// Basic authentication
    Basic {
        /// User name
        username: String,
        /// Password
        password: String,
    },
    /// API key in a custom header
    ApiKey {
        /// Header name
        header: String,
        /// Key
        value: String,
    },
}

impl std::fmt::Debug for AuthMethod {
    // Never print secrets
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::None => f.write_str("None"),
            AuthMethod::Bearer(_) => f.write_str("Bearer(***)"),
            AuthMethod::Token(_) => f.write_str("Token(***)"),
            AuthMethod::Basic { username, .. } => write!(f, "Basic({username}:***)"),
            AuthMethod::ApiKey { header, .. } => write!(f, "ApiKey({header}: ***)"),
        }
    }
}

impl AuthMethod {
    /// Header carrying the credentials, if any
    pub fn header(&self) -> Option<(String, String)> {
        match self {
            AuthMethod::None => None,
            AuthMethod::Bearer(token) => Some(("Authorization".into(), format!("Bearer {token}"))),
            AuthMethod::Token(token) => Some(("Authorization".into(), format!("Token {token}"))),
            AuthMethod::Basic { username, password } => {
                let credentials = STANDARD.encode(format!("{username}:{password}"));
                Some(("Authorization".into(), format!("Basic {credentials}")))
            }
            AuthMethod::ApiKey { header, value } => Some((header.clone(), value.clone())),
        }
    }
}

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// One outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Absolute URL without query string
    pub url: String,
    /// Query parameters, encoded by the transport
    pub query: Vec<(String, String)>,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Body for POST requests
    pub body: Option<String>,
}

impl HttpRequest {
    /// GET `url`
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: Method::Get, url: url.into(), query: Vec::new(), headers: Vec::new(), body: None }
    }

    /// POST `body` to `url`
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self { method: Method::Post, url: url.into(), query: Vec::new(), headers: Vec::new(), body: Some(body.into()) }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add the credentials header of `auth`
    pub fn auth(mut self, auth: &AuthMethod) -> Self {
        if let Some(header) = auth.header() {
            self.headers.push(header);
        }
        self
    }

    /// First header named `name`, case-insensitive
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl HttpResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Moves one request over the network
pub trait HttpTransport {
    /// Perform the request; `Err` only for transport-level failures
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &mut T {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        (**self).execute(request)
    }
}

impl<T: HttpTransport + ?Sized> HttpTransport for Box<T> {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        (**self).execute(request)
    }
}

/// Check a base URL before any request is built
pub fn validate_url(url: &str) -> Result<(), HttpError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| HttpError::Config(format!("URL must start with http:// or https://: {url}")))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(HttpError::Config(format!("URL has no host: {url}")));
    }
    Ok(())
}

/// Join a base URL and a path with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(feature = "http")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "http")]
mod ureq_transport {
    use super::{HttpConfig, HttpError, HttpRequest, HttpResponse, HttpTransport, Method};

    /// HTTP transport using lightweight ureq client
    #[derive(Clone)]
    pub struct UreqTransport {
        agent: ureq::Agent,
        headers: Vec<(String, String)>,
    }

    impl UreqTransport {
        /// Create a transport from `config`
        pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
            if config.timeout.is_zero() {
                return Err(HttpError::Config("timeout must be non-zero".into()));
            }
            let agent = ureq::AgentBuilder::new()
                .timeout(config.timeout)
                .user_agent(&config.user_agent)
                .build();
            Ok(Self { agent, headers: config.headers })
        }
    }

    impl HttpTransport for UreqTransport {
        fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
            let method = match request.method {
                Method::Get => "GET",
                Method::Post => "POST",
            };
            let mut call = self.agent.request(method, &request.url);
            for (name, value) in &request.query {
                call = call.query(name, value);
            }
            for (name, value) in self.headers.iter().chain(&request.headers) {
                call = call.set(name, value);
            }

            let result = match &request.body {
                Some(body) => call.send_string(body),
                None => call.call(),
            };

            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.into_string().map_err(|e| HttpError::Request(e.to_string()))?;
                    Ok(HttpResponse { status, body })
                }
                Err(ureq::Error::Status(status, response)) => Ok(HttpResponse {
                    status,
                    body: response.into_string().unwrap_or_default(),
                }),
                Err(ureq::Error::Transport(e)) => Err(HttpError::Request(e.to_string())),
            }
        }
    }
}

//! Request types and the network transport seam
//!
//! `HttpRequestSpec` is what scripts hand us. It is validated into a
//! `PreparedRequest` once, before any attempt is made, so a malformed
//! request never burns retries.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const USER_AGENT: &str = concat!("Nexus/", env!("CARGO_PKG_VERSION"));

/// A request as described by a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequestSpec {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Per-call timeout in milliseconds, overrides the client default
    #[serde(default, rename = "timeout")]
    pub timeout_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: None,
        }
    }

    /// POST with a JSON content type
    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(CONTENT_TYPE.as_str().to_string(), "application/json".to_string());
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers,
            body: Some(body.into()),
            timeout_ms: None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Validate method, URL and headers
    pub fn prepare(&self) -> Result<PreparedRequest, String> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| format!("invalid method '{}'", self.method))?;
        let url = parse_url(&self.url)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name '{}'", name))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header '{}'", name))?;
            headers.insert(name, value);
        }

        Ok(PreparedRequest {
            method,
            url,
            headers,
            body: self.body.clone(),
        })
    }
}

/// Only http(s) URLs are accepted
pub fn parse_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL '{}': {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported URL scheme '{}'", other)),
    }
}

/// A validated request, ready for any number of attempts
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

/// Response handed back to scripts. Error statuses are ordinary responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection failed: {0}")]
    Connection(String),
}

/// One network attempt. Implementations must not retry internally.
pub trait Transport: Send + Sync {
    fn send(&self, request: &PreparedRequest, timeout: Duration)
        -> Result<HttpResponse, TransportError>;

    /// GET `url` and copy a successful body into `sink`.
    /// Returns the status and the number of bytes written.
    fn stream(
        &self,
        url: &Url,
        timeout: Duration,
        sink: &mut dyn Write,
    ) -> Result<(u16, u64), TransportError>;
}

/// Blocking reqwest transport with a cookie jar shared across requests
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(timeout);

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        Ok(HttpResponse { status, body })
    }

    fn stream(
        &self,
        url: &Url,
        timeout: Duration,
        sink: &mut dyn Write,
    ) -> Result<(u16, u64), TransportError> {
        let mut resp = self.client.get(url.clone()).timeout(timeout).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Ok((status.as_u16(), 0));
        }
        let written = resp.copy_to(sink)?;
        Ok((status.as_u16(), written))
    }
}

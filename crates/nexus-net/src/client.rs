//! Retrying HTTP client
//!
//! Transport-level failures (connect, DNS, timeout, broken body) are retried
//! with linear backoff. HTTP error statuses are NOT failures here: a 404 or a
//! 500 comes back as a normal `HttpResponse` and is never retried.

use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::transport::{
    parse_url, HttpRequestSpec, HttpResponse, ReqwestTransport, Transport, TransportError,
};
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum NetError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport setup failed: {0}")]
    Setup(TransportError),
}

impl NetError {
    /// Number of attempts made before giving up, if the network was reached at all
    pub fn attempts(&self) -> Option<u32> {
        match self {
            NetError::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Bounds each attempt, not the whole retry sequence
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub status: u16,
    pub bytes: u64,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client shared by the network capability, downloads and installs.
///
/// Settings sit behind a mutex so `setTimeout`/`setRetries` from a script
/// are observed by every later call made through the same client.
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    settings: Mutex<ClientSettings>,
}

impl HttpClient {
    /// Production client backed by reqwest
    pub fn new(settings: ClientSettings) -> Result<Self, NetError> {
        let transport = ReqwestTransport::new().map_err(NetError::Setup)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            Arc::new(ThreadSleeper),
            settings,
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            transport,
            sleeper,
            settings: Mutex::new(settings),
        }
    }

    pub fn settings(&self) -> ClientSettings {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .timeout = timeout;
    }

    pub fn set_retries(&self, retries: u32) {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retry
            .retries = retries;
    }

    /// Execute a request, retrying transport failures
    pub fn request(&self, spec: &HttpRequestSpec) -> Result<HttpResponse, NetError> {
        let prepared = spec.prepare().map_err(NetError::InvalidRequest)?;
        let override_timeout = spec.timeout();

        debug!(method = %prepared.method, url = %prepared.url, "http request");
        self.with_retries(override_timeout, |timeout| {
            self.transport.send(&prepared, timeout)
        })
    }

    pub fn get(&self, url: &str) -> Result<HttpResponse, NetError> {
        self.request(&HttpRequestSpec::get(url))
    }

    /// POST with `Content-Type: application/json`
    pub fn post(&self, url: &str, body: &str) -> Result<HttpResponse, NetError> {
        self.request(&HttpRequestSpec::post_json(url, body))
    }

    /// Stream `url` into `dest`.
    ///
    /// The body goes to a temporary file next to `dest` and is moved into
    /// place only on a 2xx response, so `dest` never holds a partial body.
    pub fn download(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, NetError> {
        let url = parse_url(url).map_err(NetError::InvalidRequest)?;
        let dir = dest.parent().ok_or_else(|| {
            NetError::InvalidRequest(format!("no parent directory for {}", dest.display()))
        })?;

        let mut staging = NamedTempFile::new_in(dir)?;
        debug!(url = %url, dest = %dest.display(), "download");

        let (status, bytes) = self.with_retries(None, |timeout| {
            let file = staging.as_file_mut();
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            self.transport.stream(&url, timeout, file)
        })?;

        let outcome = DownloadOutcome { status, bytes };
        if outcome.is_success() {
            staging.persist(dest).map_err(|e| NetError::Io(e.error))?;
        }
        Ok(outcome)
    }

    /// Run `attempt` up to `retries + 1` times, sleeping `(i + 1) * base`
    /// after failed attempt `i` when another attempt remains.
    fn with_retries<T>(
        &self,
        override_timeout: Option<Duration>,
        mut attempt: impl FnMut(Duration) -> Result<T, TransportError>,
    ) -> Result<T, NetError> {
        let settings = self.settings();
        let timeout = override_timeout.unwrap_or(settings.timeout);
        let max_attempts = settings.retry.max_attempts();

        let mut index = 0;
        loop {
            match attempt(timeout) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let made = index + 1;
                    if made >= max_attempts {
                        warn!(attempts = made, error = %err, "giving up");
                        return Err(NetError::Exhausted {
                            attempts: made,
                            source: err,
                        });
                    }
                    let delay = settings.retry.delay_for_attempt(index);
                    warn!(attempt = made, error = %err, delay_ms = delay.as_millis() as u64, "transport failure, retrying");
                    self.sleeper.sleep(delay);
                    index += 1;
                }
            }
        }
    }
}

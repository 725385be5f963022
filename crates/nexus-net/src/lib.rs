//! Nexus Net - Resilient HTTP client
//!
//! This crate provides:
//! - Linear-backoff retry policy with an injectable delay primitive
//! - A `Transport` seam (reqwest in production, fakes in tests)
//! - `HttpClient` with request/get/post and streamed downloads

pub mod client;
pub mod retry;
pub mod transport;

pub use client::{ClientSettings, DownloadOutcome, HttpClient, NetError, DEFAULT_TIMEOUT};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper, DEFAULT_BASE_DELAY, DEFAULT_RETRIES};
pub use transport::{
    HttpRequestSpec, HttpResponse, PreparedRequest, ReqwestTransport, Transport, TransportError,
    USER_AGENT,
};

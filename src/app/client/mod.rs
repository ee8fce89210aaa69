//! HTTP client adapter
//!
//! A narrow wrapper over reqwest exposing exactly what the download engine
//! needs: a probe that discovers size and range support, a streaming GET for
//! the single-connection fallback, a buffered ranged GET for workers, and a
//! one-shot content request. Every body loop honors the shared
//! [`ControlFlag`] and a low-speed watchdog, so a stalled or cancelled
//! transfer unwinds within a bounded time.
//!
//! Ranged responses are buffered rather than streamed on purpose: some
//! origins switch to an error body mid-stream, and those bytes must never
//! reach the data file.

pub mod config;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header;
use reqwest::Client;
use tracing::debug;

use crate::app::classify::{TransportError, TransportKind};
use crate::app::control::ControlFlag;
use crate::app::interval::Interval;

pub use config::ClientConfig;

/// Granularity at which body loops re-check the control flag.
const POLL_SLICE: Duration = Duration::from_millis(250);

/// What the probe learned about a remote resource.
#[derive(Debug, Clone)]
pub struct ProbeAttributes {
    /// Total size in bytes, `-1` when the server did not say.
    pub content_length: i64,
    /// Verbatim `Content-Range` header, when present.
    pub content_range: Option<String>,
    /// Verbatim `Accept-Ranges` value; empty means no range support. A 206
    /// answer without the header implies `bytes`.
    pub accept_ranges: String,
    /// Status line plus response headers, for diagnostics.
    pub raw_header: String,
    /// HTTP status of the probe response.
    pub status: u16,
}

impl ProbeAttributes {
    /// Whether the origin advertises byte-range support.
    pub fn supports_ranges(&self) -> bool {
        !self.accept_ranges.is_empty()
    }
}

/// A worker's buffered ranged GET result.
#[derive(Debug)]
pub struct RangedResponse {
    pub status: u16,
    /// Body bytes; empty unless the status was 200 or 206.
    pub body: Vec<u8>,
}

/// Aborts transfers that stay under `limit` bytes/second across `window`.
#[derive(Debug)]
struct SpeedWatchdog {
    limit: u64,
    window: Duration,
    window_start: Instant,
    bytes: u64,
}

impl SpeedWatchdog {
    fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            window_start: Instant::now(),
            bytes: 0,
        }
    }

    fn record(&mut self, n: usize) {
        self.bytes += n as u64;
    }

    fn check(&mut self) -> Result<(), TransportError> {
        let elapsed = self.window_start.elapsed();
        if elapsed < self.window {
            return Ok(());
        }
        let floor = self.limit.saturating_mul(elapsed.as_millis() as u64) / 1000;
        if self.bytes < floor {
            debug!(
                "transfer stalled: {} bytes in {:?}, floor {}",
                self.bytes, elapsed, floor
            );
            return Err(TransportError::new(TransportKind::Timeout));
        }
        self.window_start = Instant::now();
        self.bytes = 0;
        Ok(())
    }
}

/// An in-flight response body with cancellation and stall protection.
#[derive(Debug)]
pub struct StreamingBody {
    response: reqwest::Response,
    watchdog: SpeedWatchdog,
    flag: ControlFlag,
    chunk_timeout: Duration,
}

impl StreamingBody {
    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    /// Reported `Content-Length` of this response, `-1` when absent.
    pub fn content_length(&self) -> i64 {
        self.response
            .content_length()
            .map(|n| n as i64)
            .unwrap_or(-1)
    }

    /// Next body chunk; `None` at end of body.
    ///
    /// Returns a `CancelledByCallback` transport error when the control flag
    /// leaves Running, and a `Timeout` one when the watchdog trips or no
    /// chunk arrives within the chunk timeout.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        let deadline = Instant::now() + self.chunk_timeout;
        loop {
            if !self.flag.is_running() {
                return Err(TransportError::new(TransportKind::CancelledByCallback));
            }
            match tokio::time::timeout(POLL_SLICE, self.response.chunk()).await {
                Ok(result) => {
                    let chunk = result.map_err(TransportError::from)?;
                    if let Some(data) = &chunk {
                        self.watchdog.record(data.len());
                        self.watchdog.check()?;
                    }
                    return Ok(chunk);
                }
                Err(_) => {
                    self.watchdog.check()?;
                    if Instant::now() >= deadline {
                        return Err(TransportError::new(TransportKind::Timeout));
                    }
                }
            }
        }
    }
}

/// The download engine's HTTP capability set.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    content_client: Client,
    config: ClientConfig,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let client = config.build_http_client()?;
        let content_client = config.build_content_client()?;
        Ok(Self {
            client,
            content_client,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Discover size and range support for `url`.
    ///
    /// Performed as a GET with `Range: bytes=0-` and the body discarded, so
    /// origins that answer 206 identify themselves even without an
    /// `Accept-Ranges` header.
    pub async fn probe(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<ProbeAttributes, TransportError> {
        let request = self
            .request(&self.client, url, headers)
            .header(header::RANGE, "bytes=0-");

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| TransportError::new(TransportKind::Timeout))?
            .map_err(TransportError::from)?;

        let status = response.status().as_u16();
        let mut raw_header = format!("HTTP {status}\r\n");
        for (name, value) in response.headers() {
            raw_header.push_str(name.as_str());
            raw_header.push_str(": ");
            raw_header.push_str(value.to_str().unwrap_or("<binary>"));
            raw_header.push_str("\r\n");
        }

        let content_range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let content_length = content_range
            .as_deref()
            .and_then(parse_content_range_total)
            .or_else(|| response.content_length().map(|n| n as i64))
            .unwrap_or(-1);

        let accept_ranges = derive_accept_ranges(
            response
                .headers()
                .get(header::ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok()),
            status,
        );

        debug!(
            "probe {url}: status {status}, length {content_length}, ranges {:?}",
            accept_ranges
        );

        // dropping the response aborts the body transfer
        Ok(ProbeAttributes {
            content_length,
            content_range,
            accept_ranges,
            raw_header,
            status,
        })
    }

    /// Start a plain GET and hand back the streaming body.
    pub async fn streaming_get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        flag: &ControlFlag,
    ) -> Result<StreamingBody, TransportError> {
        let response = self
            .request(&self.client, url, headers)
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(self.body(response, flag.clone()))
    }

    /// Fetch `span` with `Range: bytes=a-b`, buffering the whole body.
    ///
    /// Non-success statuses return with an empty body; deciding what they
    /// mean is the caller's job.
    pub async fn ranged_get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        span: Interval,
        flag: &ControlFlag,
    ) -> Result<RangedResponse, TransportError> {
        let response = self
            .request(&self.client, url, headers)
            .header(
                header::RANGE,
                format!("bytes={}-{}", span.start, span.end),
            )
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status().as_u16();
        if status != 200 && status != 206 {
            return Ok(RangedResponse {
                status,
                body: Vec::new(),
            });
        }

        let mut body = Vec::with_capacity(span.size().clamp(0, 1 << 24) as usize);
        let mut stream = self.body(response, flag.clone());
        while let Some(chunk) = stream.chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(RangedResponse { status, body })
    }

    /// One-shot GET returning status and full body.
    pub async fn request_content(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(u16, Vec<u8>), TransportError> {
        let response = self
            .request(&self.content_client, url, headers)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status().as_u16();
        let mut body = Vec::new();
        let mut stream = self.body(response, ControlFlag::new());
        while let Some(chunk) = stream.chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok((status, body))
    }

    fn request(
        &self,
        client: &Client,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> reqwest::RequestBuilder {
        let mut request = client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        request
    }

    fn body(&self, response: reqwest::Response, flag: ControlFlag) -> StreamingBody {
        StreamingBody {
            response,
            watchdog: SpeedWatchdog::new(
                self.config.low_speed_limit,
                self.config.low_speed_window,
            ),
            flag,
            chunk_timeout: self.config.chunk_read_timeout,
        }
    }
}

/// Total size from a `Content-Range` header (`bytes 0-1023/4096` → 4096).
fn parse_content_range_total(value: &str) -> Option<i64> {
    let total = value.rsplit('/').next()?.trim();
    if total == "*" {
        return None;
    }
    total.parse().ok()
}

/// `Accept-Ranges` policy: verbatim when present, implied `bytes` when the
/// server already answered 206.
fn derive_accept_ranges(header: Option<&str>, status: u16) -> String {
    match header {
        Some(value) => value.to_string(),
        None if status == 206 => "bytes".to_string(),
        None => String::new(),
    }
}

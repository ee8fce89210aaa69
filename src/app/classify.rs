//! Fault classification for HTTP and transport outcomes
//!
//! Maps what actually happened on the wire — an HTTP status, a transport
//! failure, a cooperative cancellation — onto the domain error set, together
//! with the fatal-vs-retriable verdict encoded in
//! [`DownloadError::is_fatal`](crate::errors::DownloadError::is_fatal).
//! The tables here are pure; no I/O, no state.

use thiserror::Error;

use crate::errors::DownloadError;

/// What went wrong below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Request could not be sent.
    Send,
    /// Response body could not be read or decoded.
    Recv,
    /// Name resolution or connection establishment failed.
    Connect,
    /// Connect timeout, overall deadline, or the low-speed watchdog fired.
    Timeout,
    /// TLS negotiation failed.
    TlsConnect,
    /// Proxy negotiation failed.
    Proxy,
    /// Client-side bug (request construction, redirect policy).
    Internal,
    /// The server closed the connection without a usable response.
    EmptyResponse,
    /// The cooperative abort hook fired mid-request.
    CancelledByCallback,
    /// Anything the transport library could not pin down.
    Unknown,
}

/// A transport-level failure, optionally wrapping the library error.
#[derive(Error, Debug)]
#[error("transport failure: {kind:?}")]
pub struct TransportError {
    kind: TransportKind,
    #[source]
    source: Option<reqwest::Error>,
}

impl TransportError {
    pub fn new(kind: TransportKind) -> Self {
        Self { kind, source: None }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == TransportKind::CancelledByCallback
    }

    /// Lift into the domain error set: cancellation becomes the fatal
    /// `OperationInterrupted`, every other transport code a retriable
    /// `NetworkError`.
    pub fn into_download_error(self) -> DownloadError {
        if self.is_cancellation() {
            DownloadError::Interrupted
        } else {
            DownloadError::Network(self)
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(source: reqwest::Error) -> Self {
        let kind = if source.is_timeout() {
            TransportKind::Timeout
        } else if source.is_connect() {
            TransportKind::Connect
        } else if source.is_request() {
            TransportKind::Send
        } else if source.is_body() || source.is_decode() {
            TransportKind::Recv
        } else if source.is_builder() || source.is_redirect() {
            TransportKind::Internal
        } else {
            TransportKind::Unknown
        };
        Self {
            kind,
            source: Some(source),
        }
    }
}

/// Classify an HTTP status on its own: `None` for the success statuses, the
/// matching domain error otherwise.
///
/// 200 and 206 are the two shapes of success the engine accepts; 404 and 503
/// are terminal verdicts about the resource or the origin, everything else
/// `>= 400` is a retriable operation failure, and any other status is an
/// unknown combination reported as a runtime error.
pub fn classify_status(status: u16, url: &str) -> Option<DownloadError> {
    match status {
        200 | 206 => None,
        404 => Some(DownloadError::FileNotFound {
            url: url.to_string(),
        }),
        503 => Some(DownloadError::Server { status }),
        s if s >= 400 => Some(DownloadError::OperationFailed { status: s }),
        s => Some(DownloadError::Runtime(format!(
            "unexpected HTTP status {s} from {url}"
        ))),
    }
}

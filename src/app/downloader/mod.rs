//! Download coordination
//!
//! The coordinator drives a whole download: it probes the origin, decides
//! between a single streaming connection and range-partitioned workers,
//! opens the [`RangeFile`], spawns and monitors workers, schedules progress
//! callbacks and metadata dumps, arbitrates worker failures against the
//! download timeout, and finally closes the range file — which promotes the
//! temp artifact to its destination name only when every byte arrived.
//!
//! # Examples
//!
//! ```rust,no_run
//! use rangefetch::{download_file, Preferences};
//! use std::path::Path;
//!
//! # async fn example() -> rangefetch::Result<()> {
//! let preferences = Preferences::default().with_connections(4);
//! download_file(
//!     "https://example.com/big.iso",
//!     Path::new("/tmp/big.iso"),
//!     |status| {
//!         println!("{}/{} bytes", status.processed_bytes, status.total_bytes);
//!         true // keep going; false cancels
//!     },
//!     &preferences,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod worker;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::app::classify::{classify_status, TransportError};
use crate::app::client::{ClientConfig, HttpClient, ProbeAttributes};
use crate::app::control::ControlFlag;
use crate::app::range_file::RangeFile;
use crate::constants::download;
use crate::errors::{DownloadError, ErrorKind, Result};

pub use config::Preferences;
pub use worker::{modal_error_kind, RangeWorker, WorkerFlag, WorkerState};

/// Progress report handed to the embedder's callback.
#[derive(Debug, Clone, Copy)]
pub struct DownloadStatus {
    /// Total size in bytes; `-1` in direct mode when the server did not
    /// advertise one.
    pub total_bytes: i64,
    /// Bytes written so far.
    pub processed_bytes: i64,
}

/// Download `url` into `destination`, resuming prior progress when the
/// on-disk artifacts allow it.
///
/// The progress callback runs on the coordinator task at roughly
/// [`Preferences::interval`] granularity; returning `false` cancels the
/// download with [`ErrorKind::OperationInterrupted`], leaving the temp and
/// metadata files in place for a later resume.
pub async fn download_file<F>(
    url: &str,
    destination: &Path,
    progress: F,
    preferences: &Preferences,
) -> Result<()>
where
    F: FnMut(&DownloadStatus) -> bool + Send,
{
    if url.is_empty() {
        return Err(DownloadError::InvalidArgument("empty url".into()));
    }
    preferences
        .validate()
        .map_err(DownloadError::InvalidArgument)?;

    let started = Instant::now();
    let client = Arc::new(
        HttpClient::new(preferences.client.clone())
            .map_err(TransportError::into_download_error)?,
    );

    // probe only when multiple connections could be used at all
    let probe = if preferences.connections > 1 {
        Some(probe_with_retry(&client, url, preferences, started).await?)
    } else {
        None
    };

    let direct = chooses_direct_mode(probe.as_ref(), preferences);
    info!(
        "downloading {url} -> {} ({} mode)",
        destination.display(),
        if direct { "direct" } else { "multi" }
    );

    // a leftover final file from a prior run is stale; remove it
    match fs::remove_file(destination).await {
        Ok(()) => debug!("removed stale destination {}", destination.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(DownloadError::filesystem(e, destination)),
    }

    let range_file = Arc::new(RangeFile::default());
    let mut session = DownloadSession {
        url,
        preferences,
        client,
        range_file: Arc::clone(&range_file),
        started,
        progress,
        last_report: None,
    };

    let result = if direct {
        session.run_direct(probe.as_ref(), destination).await
    } else {
        let probe = probe.as_ref().expect("multi mode always probes");
        session.run_multi(probe, destination).await
    };

    // promote on success, retain artifacts otherwise; a close failure on an
    // otherwise clean download becomes the download's error
    let close_result = range_file.close(result.is_ok()).await;
    match (result, close_result) {
        (Ok(()), Err(close_error)) => Err(close_error),
        (result, close_result) => {
            if let Err(e) = close_result {
                warn!("range file close failed after download error: {e}");
            }
            if let Err(e) = &result {
                warn!("download of {url} failed: {e}");
            } else {
                info!("download of {url} finished");
            }
            result
        }
    }
}

/// One-shot GET returning the full body of a 200 response.
pub async fn request_content(url: &str, headers: &HashMap<String, String>) -> Result<Vec<u8>> {
    let client =
        HttpClient::new(ClientConfig::default()).map_err(TransportError::into_download_error)?;
    let (status, body) = client
        .request_content(url, headers)
        .await
        .map_err(TransportError::into_download_error)?;
    match status {
        200 => Ok(body),
        other => Err(classify_status(other, url)
            .unwrap_or(DownloadError::OperationFailed { status: other })),
    }
}

/// Probe `url` for size and range support without downloading.
pub async fn probe_attributes(
    url: &str,
    headers: &HashMap<String, String>,
    timeout: Duration,
) -> Result<ProbeAttributes> {
    let client =
        HttpClient::new(ClientConfig::default()).map_err(TransportError::into_download_error)?;
    let attrs = client
        .probe(url, headers, timeout)
        .await
        .map_err(TransportError::into_download_error)?;
    if let Some(error) = classify_status(attrs.status, url) {
        return Err(error);
    }
    Ok(attrs)
}

/// Direct mode serves resources that cannot or should not be partitioned:
/// unknown length, no advertised range support, or too small to be worth
/// extra connections.
fn chooses_direct_mode(probe: Option<&ProbeAttributes>, preferences: &Preferences) -> bool {
    match probe {
        None => true,
        Some(p) => {
            p.content_length == -1
                || p.content_length <= preferences.block_size
                || !p.supports_ranges()
                || p.content_length < download::MULTI_MODE_THRESHOLD
        }
    }
}

/// Probe with retry: transient network failures are retried while the
/// cumulative elapsed time stays within the download timeout.
async fn probe_with_retry(
    client: &HttpClient,
    url: &str,
    preferences: &Preferences,
    started: Instant,
) -> Result<ProbeAttributes> {
    loop {
        match client
            .probe(url, &preferences.headers, preferences.timeout)
            .await
        {
            Ok(attrs) => {
                if let Some(error) = classify_status(attrs.status, url) {
                    return Err(error);
                }
                return Ok(attrs);
            }
            Err(transport) => {
                let error = transport.into_download_error();
                if !error.is_fatal() && started.elapsed() < preferences.timeout {
                    debug!("probe of {url} failed ({error}), retrying");
                    tokio::time::sleep(preferences.interval).await;
                    continue;
                }
                return Err(error);
            }
        }
    }
}

/// State threaded through one download attempt.
struct DownloadSession<'a, F> {
    url: &'a str,
    preferences: &'a Preferences,
    client: Arc<HttpClient>,
    range_file: Arc<RangeFile>,
    started: Instant,
    progress: F,
    last_report: Option<Instant>,
}

impl<F> DownloadSession<'_, F>
where
    F: FnMut(&DownloadStatus) -> bool + Send,
{
    /// Invoke the progress callback at most once per interval.
    ///
    /// Returns `false` when the embedder requested cancellation.
    fn report(&mut self, total_bytes: i64) -> bool {
        let due = self
            .last_report
            .map(|at| at.elapsed() >= self.preferences.interval)
            .unwrap_or(true);
        if !due {
            return true;
        }
        self.last_report = Some(Instant::now());
        let status = DownloadStatus {
            total_bytes,
            processed_bytes: self.range_file.processed(),
        };
        (self.progress)(&status)
    }

    /// Single-connection streaming fallback with time-bounded retry.
    async fn run_direct(
        &mut self,
        probe: Option<&ProbeAttributes>,
        destination: &Path,
    ) -> Result<()> {
        let advertised = probe.map(|p| p.content_length).unwrap_or(-1);
        self.range_file
            .reserve(advertised, self.preferences.block_size)
            .await?;
        self.range_file.open(destination).await?;

        let flag = ControlFlag::new();
        let mut first_attempt = true;
        loop {
            if !first_attempt {
                // retried bytes overwrite the same offsets from zero
                self.range_file.rewind().await?;
            }
            first_attempt = false;

            match self.stream_once(advertised, &flag).await {
                Ok(()) => return Ok(()),
                Err(error)
                    if error.kind() == ErrorKind::NetworkError
                        && self.started.elapsed() < self.preferences.timeout =>
                {
                    debug!("direct transfer failed ({error}), retrying from the top");
                    tokio::time::sleep(self.preferences.interval).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// One streaming GET into the range file.
    async fn stream_once(&mut self, advertised: i64, flag: &ControlFlag) -> Result<()> {
        let mut body = self
            .client
            .streaming_get(self.url, &self.preferences.headers, flag)
            .await
            .map_err(TransportError::into_download_error)?;

        if let Some(error) = classify_status(body.status(), self.url) {
            return Err(error);
        }

        let total = if advertised > 0 {
            advertised
        } else {
            body.content_length()
        };

        loop {
            let chunk = body
                .chunk()
                .await
                .map_err(TransportError::into_download_error)?;
            match chunk {
                Some(data) => self.range_file.fill_sequential(&data).await?,
                None => return Ok(()),
            }
            if !self.report(total) {
                flag.cancel();
                return Err(DownloadError::Interrupted);
            }
        }
    }

    /// Range-partitioned download with `connections` workers.
    async fn run_multi(&mut self, probe: &ProbeAttributes, destination: &Path) -> Result<()> {
        self.range_file
            .reserve(probe.content_length, self.preferences.block_size)
            .await?;
        self.range_file.open(destination).await?;

        let flag = ControlFlag::new();
        let states: Vec<Arc<WorkerState>> = (0..self.preferences.connections)
            .map(|_| Arc::new(WorkerState::new()))
            .collect();

        let mut handles = Vec::with_capacity(states.len());
        for (id, state) in states.iter().enumerate() {
            let worker = RangeWorker::new(
                id as u32,
                self.url.to_string(),
                self.preferences.headers.clone(),
                Arc::clone(&self.client),
                Arc::clone(&self.range_file),
                flag.clone(),
                Arc::clone(state),
            );
            handles.push(tokio::spawn(worker.run()));
        }

        let download_error = self.monitor(&flag, &states).await;

        for handle in handles {
            let _ = handle.await;
        }

        if !self.range_file.is_full().await {
            // keep the resume state current for the next invocation
            if let Err(e) = self.range_file.dump().await {
                warn!("final metadata dump failed: {e}");
            }
        }

        match download_error {
            Some(error) => Err(error),
            None if !self.range_file.is_full().await => {
                // workers all stopped without covering the file; surface the
                // most common worker error
                Err(take_modal_error(&states).unwrap_or_else(|| {
                    DownloadError::Runtime("workers stopped before the file was complete".into())
                }))
            }
            None => Ok(()),
        }
    }

    /// The coordinator loop: watch workers, pump progress, dump metadata,
    /// arbitrate failure once the download timeout has elapsed.
    async fn monitor(
        &mut self,
        flag: &ControlFlag,
        states: &[Arc<WorkerState>],
    ) -> Option<DownloadError> {
        let mut cursor = 0usize;
        let mut last_dump = Instant::now();

        loop {
            if !flag.is_running() || self.range_file.is_full().await {
                return None;
            }

            while cursor < states.len() && states[cursor].flag() == WorkerFlag::Finished {
                cursor += 1;
            }
            if cursor >= states.len() {
                return None;
            }

            // every worker has terminated but ranges remain: nothing will
            // make further progress, stop monitoring and let the caller
            // surface the worker errors
            if states
                .iter()
                .all(|s| matches!(s.flag(), WorkerFlag::Finished | WorkerFlag::Interrupted))
            {
                return None;
            }

            if self.started.elapsed() > self.preferences.timeout
                && states[cursor].last_error_kind().is_some()
                && states.iter().all(|s| s.last_error_kind().is_some())
            {
                let error = take_modal_error(states)
                    .unwrap_or_else(|| DownloadError::Runtime("worker error census empty".into()));
                warn!(
                    "every worker is failing after {:?}, declaring {}",
                    self.started.elapsed(),
                    error.kind()
                );
                flag.fail();
                return Some(error);
            }

            if !self.report(self.range_file.total()) {
                flag.cancel();
                return Some(DownloadError::Interrupted);
            }

            if last_dump.elapsed() >= download::DUMP_INTERVAL {
                if let Err(e) = self.range_file.dump().await {
                    warn!("metadata dump failed: {e}");
                }
                last_dump = Instant::now();
            }

            tokio::time::sleep(self.preferences.interval).await;
        }
    }
}

/// Take the stored error of the worker whose category is the modal one.
fn take_modal_error(states: &[Arc<WorkerState>]) -> Option<DownloadError> {
    let modal = modal_error_kind(states)?;
    states
        .iter()
        .find(|s| s.last_error_kind() == Some(modal))
        .and_then(|s| s.take_error())
}

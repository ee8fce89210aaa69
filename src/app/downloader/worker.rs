//! Range workers and their observable state
//!
//! Each worker repeatedly claims a range, fetches it with a ranged GET,
//! fills it into the range file and hands it back — on every exit path, so a
//! failed fetch still returns its range for another worker (or a later
//! resume) to pick up. The first fatal error stops the worker; transient
//! ones are recorded and left to the coordinator's arbitration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::app::classify::{classify_status, TransportError};
use crate::app::client::HttpClient;
use crate::app::control::ControlFlag;
use crate::app::interval::TrackedInterval;
use crate::app::range_file::RangeFile;
use crate::errors::{DownloadError, ErrorKind, Result};

const FLAG_NONE: u8 = 0;
const FLAG_RUNNING: u8 = 1;
const FLAG_FINISHED: u8 = 2;
const FLAG_INTERRUPTED: u8 = 3;

/// Lifecycle stage of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerFlag {
    /// Not started yet.
    None,
    /// Inside the allocation loop.
    Running,
    /// Ran out of ranges and exited normally.
    Finished,
    /// Stopped on a fatal error or cancellation.
    Interrupted,
}

/// State one worker exposes to the coordinator.
#[derive(Debug, Default)]
pub struct WorkerState {
    flag: AtomicU8,
    last_error: std::sync::Mutex<Option<DownloadError>>,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&self) -> WorkerFlag {
        match self.flag.load(Ordering::Acquire) {
            FLAG_RUNNING => WorkerFlag::Running,
            FLAG_FINISHED => WorkerFlag::Finished,
            FLAG_INTERRUPTED => WorkerFlag::Interrupted,
            _ => WorkerFlag::None,
        }
    }

    fn set_flag(&self, flag: WorkerFlag) {
        let raw = match flag {
            WorkerFlag::None => FLAG_NONE,
            WorkerFlag::Running => FLAG_RUNNING,
            WorkerFlag::Finished => FLAG_FINISHED,
            WorkerFlag::Interrupted => FLAG_INTERRUPTED,
        };
        self.flag.store(raw, Ordering::Release);
    }

    /// Category of the most recent error, if any.
    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        self.last_error.lock().unwrap().as_ref().map(|e| e.kind())
    }

    /// Move the stored error out, for reporting.
    pub fn take_error(&self) -> Option<DownloadError> {
        self.last_error.lock().unwrap().take()
    }

    fn record_error(&self, error: DownloadError) {
        *self.last_error.lock().unwrap() = Some(error);
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap() = None;
    }
}

/// One range-fetching worker.
pub struct RangeWorker {
    id: u32,
    url: String,
    headers: HashMap<String, String>,
    client: Arc<HttpClient>,
    range_file: Arc<RangeFile>,
    flag: ControlFlag,
    state: Arc<WorkerState>,
}

impl RangeWorker {
    pub fn new(
        id: u32,
        url: String,
        headers: HashMap<String, String>,
        client: Arc<HttpClient>,
        range_file: Arc<RangeFile>,
        flag: ControlFlag,
        state: Arc<WorkerState>,
    ) -> Self {
        Self {
            id,
            url,
            headers,
            client,
            range_file,
            flag,
            state,
        }
    }

    /// Claim and fetch ranges until none remain, the download leaves the
    /// Running state, or a fatal error occurs.
    pub async fn run(self) {
        self.state.set_flag(WorkerFlag::Running);
        debug!("worker {} starting", self.id);

        while self.flag.is_running() {
            let Some(mut range) = self.range_file.allocate().await else {
                break;
            };

            let outcome = self.fetch_range(&mut range).await;
            // the claim is handed back on every path; a partial fill keeps
            // its finished prefix
            self.range_file.deallocate(range).await;

            match outcome {
                Ok(()) => self.state.clear_error(),
                Err(error) => {
                    let fatal = error.is_fatal();
                    let kind = error.kind();
                    self.state.record_error(error);
                    if fatal {
                        debug!("worker {} stopping on fatal error: {kind}", self.id);
                        self.state.set_flag(WorkerFlag::Interrupted);
                        return;
                    }
                    debug!(
                        "worker {} range [{}, {}] failed with {kind}, reselecting",
                        self.id, range.span.start, range.span.end
                    );
                }
            }
        }

        debug!("worker {} finished", self.id);
        self.state.set_flag(WorkerFlag::Finished);
    }

    async fn fetch_range(&self, range: &mut TrackedInterval) -> Result<()> {
        let response = self
            .client
            .ranged_get(&self.url, &self.headers, range.span, &self.flag)
            .await
            .map_err(TransportError::into_download_error)?;

        if let Some(error) = classify_status(response.status, &self.url) {
            return Err(error);
        }

        // a 200 body may carry more than the range asked for; never write
        // past the claim
        let take = range.remaining().min(response.body.len() as i64) as usize;
        self.range_file.fill(range, &response.body[..take]).await
    }
}

/// Pick the most common error category across workers, breaking ties toward
/// the smaller enum value for determinism.
pub fn modal_error_kind(states: &[Arc<WorkerState>]) -> Option<ErrorKind> {
    let mut counts = std::collections::BTreeMap::new();
    for state in states {
        if let Some(kind) = state.last_error_kind() {
            *counts.entry(kind).or_insert(0usize) += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(kind, _)| kind)
}

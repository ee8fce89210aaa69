//! Thread-safe range allocator and partial-file writer
//!
//! [`RangeFile`] owns the temporary data file for one download and the three
//! interval sets describing its fill progress:
//!
//! - `available` — ranges no worker has claimed yet (Unfilled)
//! - `allocated` — ranges currently owned by exactly one worker
//!   (Pending/Partial)
//! - `finished` — ranges fully persisted to disk (Filled), kept coalesced
//!
//! Workers drive the `allocate` → `fill` → `deallocate` cycle concurrently;
//! the coordinator periodically `dump`s a metadata snapshot so an interrupted
//! download can resume, and finally `close`s the file, which promotes the
//! temp artifact to its final name only when every byte arrived.
//!
//! Locking: one mutex guards the interval sets, a second guards the file
//! handle (the seek-then-write pair must not interleave between workers), a
//! third serializes metadata writes. `processed` is an atomic so progress
//! reporting never touches a lock.

use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::app::interval::{FillState, Interval, TrackedInterval};
use crate::constants::{download, files};
use crate::errors::{DownloadError, Result};

pub mod metadata;

#[cfg(test)]
mod tests;

pub use metadata::Metadata;

/// Path of the partially-filled data file for `dest`.
pub fn temp_path(dest: &Path) -> PathBuf {
    let mut raw = dest.as_os_str().to_os_string();
    raw.push(".");
    raw.push(files::TEMP_SUFFIX);
    PathBuf::from(raw)
}

/// Path of the metadata side-file for `dest`.
pub fn meta_path(dest: &Path) -> PathBuf {
    let mut raw = dest.as_os_str().to_os_string();
    raw.push(".");
    raw.push(files::META_SUFFIX);
    PathBuf::from(raw)
}

fn meta_swap_path(dest: &Path) -> PathBuf {
    let mut raw = dest.as_os_str().to_os_string();
    raw.push(".");
    raw.push(files::META_SWAP_SUFFIX);
    PathBuf::from(raw)
}

#[derive(Debug, Default)]
struct RangeState {
    available: BTreeSet<TrackedInterval>,
    allocated: BTreeSet<TrackedInterval>,
    finished: BTreeSet<TrackedInterval>,
}

impl RangeState {
    fn clear(&mut self) {
        self.available.clear();
        self.allocated.clear();
        self.finished.clear();
    }

    fn is_untouched(&self) -> bool {
        self.available.is_empty() && self.allocated.is_empty() && self.finished.is_empty()
    }

    fn is_full(&self, bytes_total: i64) -> bool {
        if bytes_total <= 0 || self.finished.len() != 1 {
            return false;
        }
        let only = self.finished.iter().next().expect("len checked");
        only.span == Interval::new(0, bytes_total - 1)
    }
}

/// Thread-safe manager of one download's temp file and range bookkeeping.
///
/// `allocate`, `deallocate`, `fill`, `dump`, `is_full` and `processed` may be
/// called concurrently from any number of worker tasks plus the coordinator.
/// `reserve`, `open` and `close` are coordinator-only and must not race with
/// active workers.
#[derive(Debug)]
pub struct RangeFile {
    block_hint: AtomicI64,
    bytes_total: AtomicI64,
    processed: AtomicI64,
    state: Mutex<RangeState>,
    file: Mutex<Option<fs::File>>,
    meta_lock: Mutex<()>,
    path: std::sync::Mutex<Option<PathBuf>>,
}

impl Default for RangeFile {
    fn default() -> Self {
        Self::new(-1, download::DEFAULT_BLOCK_SIZE)
    }
}

impl RangeFile {
    pub fn new(bytes_total: i64, block_hint: i64) -> Self {
        Self {
            block_hint: AtomicI64::new(block_hint),
            bytes_total: AtomicI64::new(bytes_total),
            processed: AtomicI64::new(0),
            state: Mutex::new(RangeState::default()),
            file: Mutex::new(None),
            meta_lock: Mutex::new(()),
            path: std::sync::Mutex::new(None),
        }
    }

    /// Total resource size in bytes, `-1` when unknown.
    pub fn total(&self) -> i64 {
        self.bytes_total.load(Ordering::Relaxed)
    }

    /// Bytes written since this range file was opened (or restored).
    pub fn processed(&self) -> i64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Replace the sizing configuration before the file is opened.
    ///
    /// Must be called before `open` and before any allocation has happened.
    pub async fn reserve(&self, bytes_total: i64, block_hint: i64) -> Result<()> {
        if block_hint <= 0 {
            return Err(DownloadError::InvalidArgument(format!(
                "block hint must be positive, got {block_hint}"
            )));
        }
        let state = self.state.lock().await;
        if !state.is_untouched() || self.path.lock().unwrap().is_some() {
            return Err(DownloadError::Runtime(
                "reserve called on a range file already in use".into(),
            ));
        }
        self.bytes_total.store(bytes_total, Ordering::Relaxed);
        self.block_hint.store(block_hint, Ordering::Relaxed);
        Ok(())
    }

    /// Open (or create) the temp file backing destination `dest` and restore
    /// any resumable progress from the metadata side-file.
    ///
    /// A size change relative to the stored configuration invalidates prior
    /// progress: the temp file is resized and the stale metadata removed.
    pub async fn open(&self, dest: &Path) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut file_guard = self.file.lock().await;
        if file_guard.is_some() {
            return Err(DownloadError::Runtime("range file is already open".into()));
        }

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::filesystem(e, parent))?;
            }
        }

        let data_path = temp_path(dest);
        let side_path = meta_path(dest);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&data_path)
            .await
            .map_err(|e| DownloadError::filesystem(e, &data_path))?;

        let bytes_total = self.total();
        let on_disk = file
            .metadata()
            .await
            .map_err(|e| DownloadError::filesystem(e, &data_path))?
            .len() as i64;

        if on_disk != bytes_total {
            file.set_len(bytes_total.max(0) as u64)
                .await
                .map_err(|e| DownloadError::filesystem(e, &data_path))?;
            file.seek(SeekFrom::Start(0))
                .await
                .map_err(|e| DownloadError::filesystem(e, &data_path))?;

            // a size change invalidates any prior progress
            match fs::remove_file(&side_path).await {
                Ok(()) => debug!("removed stale metadata at {}", side_path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(DownloadError::filesystem(e, &side_path)),
            }
        } else if bytes_total > 0 {
            match fs::read(&side_path).await {
                Ok(bytes) => match Metadata::decode(&bytes) {
                    Some(meta) => self.restore(&mut state, meta),
                    None => warn!(
                        "unreadable metadata at {}, starting fresh",
                        side_path.display()
                    ),
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to read metadata: {e}, starting fresh"),
            }
        }

        *file_guard = Some(file);
        *self.path.lock().unwrap() = Some(dest.to_path_buf());
        debug!(
            "opened range file for {} ({} bytes, {} already processed)",
            dest.display(),
            bytes_total,
            self.processed()
        );
        Ok(())
    }

    /// Apply a decoded metadata snapshot to a freshly opened range file.
    ///
    /// Ranges a worker held when the snapshot was taken go back to
    /// `available` whole — an in-flight worker's write position cannot be
    /// trusted across crashes — and `processed` drops by the reserved
    /// prefixes accordingly.
    fn restore(&self, state: &mut RangeState, meta: Metadata) {
        if meta.bytes_total != self.total()
            || meta.block_hint != self.block_hint.load(Ordering::Relaxed)
        {
            warn!(
                "metadata was produced under a different configuration \
                 (total {} hint {}), starting fresh",
                meta.bytes_total, meta.block_hint
            );
            return;
        }

        let mut processed = meta.processed;
        let mut available: BTreeSet<TrackedInterval> = meta.available.iter().copied().collect();
        for held in &meta.allocated {
            processed -= held.position - held.span.start;
            available.insert(TrackedInterval::unfilled(held.span));
        }
        let finished: BTreeSet<TrackedInterval> = meta.finished.iter().copied().collect();

        let covered: i64 = available
            .iter()
            .chain(finished.iter())
            .map(|r| r.span.size())
            .sum();
        if covered != self.total() {
            warn!(
                "metadata covers {covered} of {} bytes, discarding snapshot",
                self.total()
            );
            return;
        }

        debug!(
            "restored {} finished / {} available ranges, {processed} bytes done",
            finished.len(),
            available.len()
        );
        state.available = available;
        state.finished = finished;
        self.processed.store(processed.max(0), Ordering::Relaxed);
    }

    /// Claim the lowest unclaimed range, or `None` when nothing is left.
    ///
    /// The first allocation tiles `[0, total - 1]` into contiguous chunks of
    /// at most `block_hint` bytes. A claimed range appears in `allocated`
    /// until the owning worker hands it back through [`RangeFile::deallocate`].
    pub async fn allocate(&self) -> Option<TrackedInterval> {
        let bytes_total = self.total();
        if bytes_total <= 0 {
            return None;
        }

        let mut state = self.state.lock().await;
        if state.is_untouched() {
            let hint = self.block_hint.load(Ordering::Relaxed);
            let mut start = 0;
            while start < bytes_total {
                let chunk = Interval::new(start, (start + hint - 1).min(bytes_total - 1));
                debug_assert!(chunk.size() <= hint);
                state.available.insert(TrackedInterval::unfilled(chunk));
                start = chunk.end + 1;
            }
        }

        let first = *state.available.iter().next()?;
        state.available.remove(&first);

        let mut claimed = first;
        claimed.state = FillState::Pending;
        claimed.position = claimed.span.start;
        state.allocated.insert(claimed);
        Some(claimed)
    }

    /// Write `bytes` at the range's fill cursor and advance it.
    ///
    /// The caller's copy and the canonical `allocated` entry both move to
    /// Partial, or Filled once the cursor passes `end`. Callers must not
    /// write more than the range has left.
    pub async fn fill(&self, range: &mut TrackedInterval, bytes: &[u8]) -> Result<()> {
        if !range.span.valid()
            || matches!(range.state, FillState::Unfilled | FillState::Filled)
        {
            return Err(DownloadError::Runtime(
                "fill on a range that is not fillable".into(),
            ));
        }
        let n = bytes.len() as i64;
        if n <= 0 {
            return Ok(());
        }
        debug_assert!(range.position >= range.span.start);
        debug_assert!(n <= range.remaining());

        {
            let mut guard = self.file.lock().await;
            let file = guard
                .as_mut()
                .ok_or_else(|| DownloadError::Runtime("range file is not open".into()))?;
            file.seek(SeekFrom::Start(range.position as u64))
                .await
                .map_err(|e| self.fs_error(e))?;
            file.write_all(bytes).await.map_err(|e| self.fs_error(e))?;
        }

        range.advance(n);

        let mut state = self.state.lock().await;
        if let Some(mut canonical) = state.allocated.take(&*range) {
            canonical.state = range.state;
            canonical.position = range.position;
            state.allocated.insert(canonical);
        }
        drop(state);

        self.processed.fetch_add(n, Ordering::Relaxed);
        Ok(())
    }

    /// Write `bytes` at the file's current position (single-connection
    /// streaming fallback; no range bookkeeping beyond the finished prefix).
    pub async fn fill_sequential(&self, bytes: &[u8]) -> Result<()> {
        let n = bytes.len() as i64;
        if n <= 0 {
            return Ok(());
        }

        {
            let mut guard = self.file.lock().await;
            let file = guard
                .as_mut()
                .ok_or_else(|| DownloadError::Runtime("range file is not open".into()))?;
            file.write_all(bytes).await.map_err(|e| self.fs_error(e))?;
        }

        let written = self.processed.fetch_add(n, Ordering::Relaxed) + n;
        let mut state = self.state.lock().await;
        state.finished.clear();
        state
            .finished
            .insert(TrackedInterval::filled(Interval::new(0, written - 1)));
        Ok(())
    }

    /// Reset the streaming fallback to offset zero for a fresh attempt.
    ///
    /// Already-written bytes stay on disk and are overwritten in place by the
    /// retried transfer; `processed` restarts from zero so it never exceeds
    /// the total.
    pub async fn rewind(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| DownloadError::Runtime("range file is not open".into()))?;
        file.seek(SeekFrom::Start(0))
            .await
            .map_err(|e| self.fs_error(e))?;
        state.finished.clear();
        self.processed.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Hand a claimed range back, dispatching on how far it got.
    ///
    /// Pending ranges return to `available` whole; Filled ranges join
    /// `finished` (coalescing neighbors); Partial ranges split into a
    /// finished prefix and an available tail. Returns `false` when the range
    /// was not allocated.
    pub async fn deallocate(&self, range: TrackedInterval) -> bool {
        debug_assert!(range.span.valid());
        let mut state = self.state.lock().await;
        if state.allocated.take(&range).is_none() {
            return false;
        }

        match range.state {
            FillState::Pending => {
                state.available.insert(TrackedInterval::unfilled(range.span));
                true
            }
            FillState::Filled => {
                debug_assert_eq!(range.position, range.span.end + 1);
                state.finished.insert(range);
                coalesce(&mut state.finished);
                true
            }
            FillState::Partial => {
                debug_assert!(
                    range.span.start <= range.position && range.position <= range.span.end
                );
                state.finished.insert(TrackedInterval::filled(Interval::new(
                    range.span.start,
                    range.position - 1,
                )));
                state
                    .available
                    .insert(TrackedInterval::unfilled(Interval::new(
                        range.position,
                        range.span.end,
                    )));
                coalesce(&mut state.finished);
                true
            }
            FillState::Unfilled => false,
        }
    }

    /// Atomically persist a metadata snapshot next to the data file.
    ///
    /// The snapshot is copied out under the state lock, encoded, written to a
    /// scratch file and renamed over the previous one, so a crash leaves
    /// either the old or the new snapshot, never a torn one.
    pub async fn dump(&self) -> Result<()> {
        let snapshot = {
            let state = self.state.lock().await;
            Metadata {
                block_hint: self.block_hint.load(Ordering::Relaxed),
                bytes_total: self.total(),
                processed: self.processed(),
                available: state.available.iter().copied().collect(),
                allocated: state.allocated.iter().copied().collect(),
                finished: state.finished.iter().copied().collect(),
            }
        };

        let dest = self
            .path
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DownloadError::Runtime("range file is not open".into()))?;
        let encoded = snapshot.encode()?;

        let side_path = meta_path(&dest);
        let swap_path = meta_swap_path(&dest);

        let _serialized = self.meta_lock.lock().await;
        fs::write(&swap_path, &encoded)
            .await
            .map_err(|e| DownloadError::filesystem(e, &swap_path))?;
        match fs::remove_file(&side_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DownloadError::filesystem(e, &side_path)),
        }
        fs::rename(&swap_path, &side_path)
            .await
            .map_err(|e| DownloadError::filesystem(e, &side_path))?;
        Ok(())
    }

    /// True when `finished` is exactly `[0, total - 1]`.
    pub async fn is_full(&self) -> bool {
        let state = self.state.lock().await;
        state.is_full(self.total())
    }

    /// Close the file and either promote the temp artifact to its final name
    /// (`finished == true` and every byte arrived) or keep temp and metadata
    /// on disk for a later resume.
    ///
    /// All bookkeeping resets regardless of the outcome; the coordinator must
    /// have joined every worker first.
    pub async fn close(&self, finished: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut file_guard = self.file.lock().await;
        debug_assert!(state.allocated.is_empty());

        let dest = self.path.lock().unwrap().take();
        let bytes_total = self.total();
        let full = state.is_full(bytes_total);

        let mut result = Ok(());
        if let Some(mut file) = file_guard.take() {
            if let Err(e) = file.flush().await {
                let path = dest.clone().unwrap_or_else(|| PathBuf::from("<unopened>"));
                result = Err(DownloadError::filesystem(e, path));
            }
            drop(file);

            if let Some(dest) = &dest {
                if finished && result.is_ok() {
                    if bytes_total > 0 && !full {
                        result = Err(DownloadError::Runtime(
                            "range file closed as finished while bytes are missing".into(),
                        ));
                    } else {
                        result = promote(dest).await;
                    }
                }
            }
        }

        state.clear();
        self.bytes_total.store(-1, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.block_hint
            .store(download::DEFAULT_BLOCK_SIZE, Ordering::Relaxed);
        result
    }

    fn fs_error(&self, source: std::io::Error) -> DownloadError {
        let path = self
            .path
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| PathBuf::from("<unopened>"));
        DownloadError::filesystem(source, path)
    }

    /// Snapshot of the three set sizes, for logging and tests.
    pub async fn set_sizes(&self) -> (usize, usize, usize) {
        let state = self.state.lock().await;
        (
            state.available.len(),
            state.allocated.len(),
            state.finished.len(),
        )
    }
}

/// Move the temp artifact over the destination and drop the metadata file.
async fn promote(dest: &Path) -> Result<()> {
    let data_path = temp_path(dest);
    fs::rename(&data_path, dest)
        .await
        .map_err(|e| DownloadError::filesystem(e, dest))?;
    match fs::remove_file(meta_path(dest)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(DownloadError::filesystem(e, meta_path(dest))),
    }
    debug!("promoted {} into place", dest.display());
    Ok(())
}

/// Fold mergeable neighbors of the ordered set into single Filled entries.
///
/// One pass over the set, keeping a running entry; whenever the running entry
/// can merge with the next, they collapse into their union with the larger of
/// the two cursors.
fn coalesce(finished: &mut BTreeSet<TrackedInterval>) {
    if finished.len() < 2 {
        return;
    }

    let mut merged = BTreeSet::new();
    let mut running: Option<TrackedInterval> = None;
    for entry in finished.iter() {
        match running {
            None => running = Some(*entry),
            Some(current) if current.span.mergeable(&entry.span) => {
                running = Some(TrackedInterval {
                    span: current.span.union(&entry.span),
                    position: current.position.max(entry.position),
                    state: FillState::Filled,
                });
            }
            Some(current) => {
                merged.insert(current);
                running = Some(*entry);
            }
        }
    }
    if let Some(current) = running {
        merged.insert(current);
    }

    if merged.len() != finished.len() {
        *finished = merged;
    }
}

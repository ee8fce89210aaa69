//! Serializable snapshot of a range file's progress
//!
//! The snapshot is written next to the data file (`<dest>.meta`) so an
//! interrupted download can resume. The encoding is a small versioned binary
//! format: a fixed magic, a format version, then a bincode payload. The
//! format is deliberately *not* a compatibility surface — any mismatch in
//! magic or version simply discards the snapshot and the download starts
//! fresh.

use serde::{Deserialize, Serialize};

use crate::app::interval::TrackedInterval;
use crate::constants::metadata as format;
use crate::errors::{DownloadError, Result};

/// Snapshot of the three interval sets plus the sizing configuration they
/// were produced under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Target size of each allocatable range.
    pub block_hint: i64,
    /// Total resource size in bytes.
    pub bytes_total: i64,
    /// Bytes written since the range file was opened.
    pub processed: i64,
    /// Intervals not yet claimed by any worker.
    pub available: Vec<TrackedInterval>,
    /// Intervals owned by a worker at snapshot time.
    pub allocated: Vec<TrackedInterval>,
    /// Intervals fully persisted to disk, in coalesced form.
    pub finished: Vec<TrackedInterval>,
}

impl Metadata {
    /// Encode as magic + version + bincode payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&format::MAGIC);
        buf.extend_from_slice(&format::FORMAT_VERSION.to_le_bytes());
        bincode::serialize_into(&mut buf, self)
            .map_err(|e| DownloadError::Runtime(format!("metadata encoding failed: {e}")))?;
        Ok(buf)
    }

    /// Decode a snapshot previously produced by [`Metadata::encode`].
    ///
    /// Returns `None` on any mismatch — wrong magic, unknown version,
    /// truncated or corrupt payload. Callers treat `None` as "no usable
    /// snapshot" and start fresh.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let header_len = format::MAGIC.len() + 2;
        if bytes.len() < header_len {
            return None;
        }
        if bytes[..format::MAGIC.len()] != format::MAGIC {
            return None;
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != format::FORMAT_VERSION {
            return None;
        }
        bincode::deserialize(&bytes[header_len..]).ok()
    }

    /// Total byte count covered by the three sets together.
    pub fn covered_bytes(&self) -> i64 {
        self.available
            .iter()
            .chain(self.allocated.iter())
            .chain(self.finished.iter())
            .map(|r| r.span.size())
            .sum()
    }
}

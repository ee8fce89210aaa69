//! Prelude module for the rangefetch library
//!
//! Re-exports the items most embedders need, so a single
//! `use rangefetch::prelude::*;` covers typical usage.

pub use crate::errors::{DownloadError, ErrorKind, Result};

pub use crate::app::{
    download_file,
    probe_attributes,
    request_content,
    // Configuration
    ClientConfig,
    Preferences,
    // Progress and status types
    DownloadStatus,
    ProbeAttributes,
    // Lower-level building blocks
    HttpClient,
    Interval,
    RangeFile,
    TrackedInterval,
};

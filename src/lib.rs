//! rangefetch library
//!
//! A resumable, multi-connection HTTP/HTTPS file downloader. Given a remote
//! URL and a local destination path, rangefetch fetches the resource using
//! several concurrent byte-range requests when the origin supports them,
//! persists partial progress so an interrupted download resumes on a later
//! invocation, and reports progress to — and honors cancellation from — the
//! embedding application.
//!
//! # Key Features
//!
//! - **Range-partitioned workers** claiming disjoint byte intervals from a
//!   shared allocator, so no byte is ever fetched twice concurrently
//! - **Crash-safe resume** via an atomically replaced metadata side-file
//! - **Atomic promotion**: the destination file appears only when complete
//! - **Single-connection fallback** for origins without range support or
//!   unknown content length
//! - **Cooperative cancellation** through the progress callback
//! - **Fault arbitration**: transient network errors are absorbed while any
//!   worker still makes progress; fatal errors stop the download at once
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rangefetch::prelude::*;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let preferences = Preferences::default();
//!     download_file(
//!         "https://example.com/archive.tar.gz",
//!         Path::new("archive.tar.gz"),
//!         |status| {
//!             eprintln!("{} / {} bytes", status.processed_bytes, status.total_bytes);
//!             true
//!         },
//!         &preferences,
//!     )
//!     .await
//! }
//! ```
//!
//! # On-disk artifacts
//!
//! For a destination `P`, the engine maintains `P.temp` (the data file,
//! pre-sized to the full resource length) and `P.meta` (a versioned binary
//! snapshot of the range bookkeeping). On success `P.temp` is renamed to `P`
//! and `P.meta` removed; on interruption both remain and a later call with
//! the same destination resumes from them.

pub mod app;
pub mod constants;
pub mod errors;

pub mod prelude;

// CLI module - public for main.rs access but contents not re-exported, so
// CLI dependencies stay out of library consumers.
pub mod cli;

pub use errors::{DownloadError, ErrorKind, Result};

pub use app::{
    download_file,
    probe_attributes,
    request_content,
    ClientConfig,
    ControlFlag,
    DownloadStatus,
    FillState,
    HttpClient,
    Interval,
    Metadata,
    Preferences,
    ProbeAttributes,
    RangeFile,
    TrackedInterval,
};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "rangefetch");
    }

    #[test]
    fn test_public_api_accessibility() {
        // Key types are reachable from the crate root
        let _preferences = Preferences::default();
        let _client_config = ClientConfig::default();
        let _range_file = RangeFile::default();
        let _flag = ControlFlag::new();
    }

    #[test]
    fn test_error_types() {
        let error = DownloadError::Interrupted;
        assert_eq!(error.kind(), ErrorKind::OperationInterrupted);
        assert!(error.is_fatal());
    }
}

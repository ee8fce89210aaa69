//! Error types for rangefetch
//!
//! The download engine reports every failure as a [`DownloadError`], which
//! carries context (paths, HTTP statuses, source errors) and collapses to a
//! flat [`ErrorKind`] for embedders that only need to branch on the category.
//! Each error also carries a fatal-vs-retriable verdict: fatal errors stop a
//! worker (or the whole download) immediately, retriable ones are absorbed by
//! the coordinator's arbitration logic.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::app::classify::TransportError;

/// Flat domain error category.
///
/// This is the stable vocabulary reported to embedders; [`DownloadError`]
/// values map onto it via [`DownloadError::kind`]. `Success` never appears in
/// an `Err` — it exists so callers counting worker outcomes can represent
/// "no error observed" without an `Option` wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Success,
    UnknownError,
    InvalidArgument,
    RuntimeError,
    OutOfMemory,
    PermissionDenied,
    OperationFailed,
    OperationInterrupted,
    FilesystemError,
    FilesystemIoError,
    FilesystemNotSupportLargeFiles,
    FilesystemUnavailable,
    FilesystemNoSpace,
    FilesystemNetworkError,
    FileNotFound,
    FileNotWritable,
    FilePathTooLong,
    FileWasUsedByOtherProcesses,
    NetworkError,
    ServerError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Success => "success",
            ErrorKind::UnknownError => "unknown error",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::RuntimeError => "runtime error",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::OperationFailed => "operation failed",
            ErrorKind::OperationInterrupted => "operation interrupted",
            ErrorKind::FilesystemError => "filesystem error",
            ErrorKind::FilesystemIoError => "filesystem I/O error",
            ErrorKind::FilesystemNotSupportLargeFiles => {
                "filesystem does not support large files"
            }
            ErrorKind::FilesystemUnavailable => "filesystem unavailable",
            ErrorKind::FilesystemNoSpace => "no space left on device",
            ErrorKind::FilesystemNetworkError => "filesystem network error",
            ErrorKind::FileNotFound => "file not found",
            ErrorKind::FileNotWritable => "file not writable",
            ErrorKind::FilePathTooLong => "file path too long",
            ErrorKind::FileWasUsedByOtherProcesses => "file is used by another process",
            ErrorKind::NetworkError => "network error",
            ErrorKind::ServerError => "server error",
        };
        f.write_str(name)
    }
}

/// Download engine error with context.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Caller passed something unusable (empty URL, zero connections, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal invariant did not hold.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The embedder's progress callback requested cancellation.
    #[error("operation interrupted")]
    Interrupted,

    /// The server answered with a non-success status outside the dedicated
    /// 404/503 categories.
    #[error("operation failed: HTTP status {status}")]
    OperationFailed { status: u16 },

    /// The remote resource does not exist (HTTP 404).
    #[error("remote file not found: {url}")]
    FileNotFound { url: String },

    /// The server is unable to serve the resource (HTTP 503).
    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    /// Transport-level failure (resolve, connect, TLS, timeout, stalled
    /// transfer, truncated body).
    #[error("network error")]
    Network(#[from] TransportError),

    /// A local filesystem operation failed, pre-classified into a domain kind.
    #[error("{} ({})", .kind, .path.display())]
    Filesystem {
        kind: ErrorKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    /// Collapse to the flat domain category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DownloadError::Runtime(_) => ErrorKind::RuntimeError,
            DownloadError::Interrupted => ErrorKind::OperationInterrupted,
            DownloadError::OperationFailed { .. } => ErrorKind::OperationFailed,
            DownloadError::FileNotFound { .. } => ErrorKind::FileNotFound,
            DownloadError::Server { .. } => ErrorKind::ServerError,
            DownloadError::Network(_) => ErrorKind::NetworkError,
            DownloadError::Filesystem { kind, .. } => *kind,
        }
    }

    /// Fatal errors terminate the worker (or download) that observed them;
    /// retriable ones leave recovery to other workers and the coordinator's
    /// timeout arbitration.
    pub fn is_fatal(&self) -> bool {
        match self {
            DownloadError::Filesystem { .. } => true,
            DownloadError::Interrupted => true,
            DownloadError::FileNotFound { .. } => true,
            DownloadError::Server { .. } => true,
            DownloadError::InvalidArgument(_) => true,
            DownloadError::Network(_) => false,
            DownloadError::OperationFailed { .. } => false,
            DownloadError::Runtime(_) => false,
        }
    }

    /// Wrap a filesystem error observed while touching `path`.
    pub fn filesystem(source: io::Error, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let kind = map_io_error(&source);
        DownloadError::Filesystem { kind, path, source }
    }
}

/// Result type alias for the download engine.
pub type Result<T> = std::result::Result<T, DownloadError>;

/// Map a native I/O error onto the domain filesystem categories.
///
/// Disk-full and file-too-large are distinguished so an embedder can tell a
/// genuinely full volume apart from a FAT-style 4 GiB file size ceiling.
pub fn map_io_error(error: &io::Error) -> ErrorKind {
    use io::ErrorKind as Io;

    match error.kind() {
        Io::NotFound => ErrorKind::FileNotFound,
        Io::PermissionDenied => ErrorKind::FileNotWritable,
        Io::StorageFull => ErrorKind::FilesystemNoSpace,
        Io::FileTooLarge => ErrorKind::FilesystemNotSupportLargeFiles,
        Io::InvalidFilename => ErrorKind::FilePathTooLong,
        Io::ResourceBusy => ErrorKind::FileWasUsedByOtherProcesses,
        Io::StaleNetworkFileHandle => ErrorKind::FilesystemNetworkError,
        Io::NetworkDown | Io::NetworkUnreachable | Io::HostUnreachable => {
            ErrorKind::FilesystemNetworkError
        }
        Io::NotADirectory | Io::IsADirectory | Io::DirectoryNotEmpty => {
            ErrorKind::FilesystemError
        }
        Io::WriteZero | Io::UnexpectedEof | Io::BrokenPipe | Io::Interrupted => {
            ErrorKind::FilesystemIoError
        }
        Io::OutOfMemory => ErrorKind::OutOfMemory,
        _ => match error.raw_os_error() {
            // ENAMETOOLONG (linux 36, macOS 63)
            Some(36) | Some(63) => ErrorKind::FilePathTooLong,
            // Windows sharing violation
            Some(32) => ErrorKind::FileWasUsedByOtherProcesses,
            // ENXIO / ENODEV: the volume went away under us
            Some(6) | Some(19) => ErrorKind::FilesystemUnavailable,
            _ => ErrorKind::FilesystemError,
        },
    }
}

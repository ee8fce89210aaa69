//! Core application logic for rangefetch
//!
//! The download engine is layered leaves-first:
//!
//! - [`interval`] — pure interval algebra and fill tracking
//! - [`range_file`] — the concurrent range allocator and partial-file writer
//! - [`client`] — the narrow HTTP capability set (probe, streaming GET,
//!   ranged GET, one-shot content)
//! - [`classify`] — fault classification onto the domain error set
//! - [`control`] — the shared three-state download flag
//! - [`downloader`] — the coordinator tying all of it together

pub mod classify;
pub mod client;
pub mod control;
pub mod downloader;
pub mod interval;
pub mod range_file;

pub use classify::{classify_status, TransportError, TransportKind};
pub use client::{ClientConfig, HttpClient, ProbeAttributes, RangedResponse, StreamingBody};
pub use control::{ControlFlag, FlagState};
pub use downloader::{
    download_file, modal_error_kind, probe_attributes, request_content, DownloadStatus,
    Preferences, RangeWorker, WorkerFlag, WorkerState,
};
pub use interval::{FillState, Interval, TrackedInterval};
pub use range_file::{meta_path, temp_path, Metadata, RangeFile};

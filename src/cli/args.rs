//! Command-line argument parsing
//!
//! The binary does exactly one thing — download a URL — so the interface is
//! a flat argument list rather than subcommands.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::constants::download;

/// rangefetch - resumable multi-connection downloader
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rangefetch",
    version,
    about = "Download a file over HTTP(S) with resumable range-partitioned connections",
    long_about = "Downloads a remote file into a local path using several concurrent \
byte-range requests when the server supports them. Interrupted downloads leave \
<dest>.temp and <dest>.meta behind and resume on the next invocation."
)]
pub struct Cli {
    /// URL to download
    pub url: String,

    /// Destination path; defaults to the last path segment of the URL
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Download-level retry/arbitration timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = download::DEFAULT_TIMEOUT.as_millis() as u64)]
    pub timeout: u64,

    /// Number of concurrent range connections
    #[arg(short, long, default_value_t = download::DEFAULT_CONNECTIONS)]
    pub connections: u32,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Resolve the destination path, deriving it from the URL when `--file`
    /// was not given.
    pub fn destination(&self) -> Result<PathBuf, String> {
        if let Some(path) = &self.file {
            return Ok(path.clone());
        }
        let name = filename_from_url(&self.url)
            .ok_or_else(|| format!("cannot derive a file name from '{}'", self.url))?;
        Ok(PathBuf::from(name))
    }
}

/// Last non-empty path segment of the URL, percent-decoding left alone.
fn filename_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let name = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()?
        .to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

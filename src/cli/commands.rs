//! The download command
//!
//! Wires the parsed arguments into the library, renders progress, maps
//! Ctrl-C onto cooperative cancellation, and prints the SHA-1 of the
//! finished file the way the classic downloader tools do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use tracing::info;

use super::args::Cli;
use super::progress::ProgressDisplay;
use crate::app::{download_file, Preferences};
use crate::errors::{DownloadError, Result};

/// Hashing read granularity for the post-download digest.
const DIGEST_BLOCK: usize = 512 * 1024;

/// Run one download to completion.
pub async fn handle_download(args: Cli) -> Result<()> {
    let destination = args
        .destination()
        .map_err(DownloadError::InvalidArgument)?;

    let preferences = Preferences::default()
        .with_connections(args.connections)
        .with_timeout(Duration::from_millis(args.timeout));

    info!(
        "downloading {} -> {} ({} connections, timeout {} ms)",
        args.url,
        destination.display(),
        args.connections,
        args.timeout
    );

    // Ctrl-C flips a flag the progress callback reports back as "stop"
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut display = ProgressDisplay::new();
    let result = download_file(
        &args.url,
        &destination,
        |status| {
            display.update(status);
            !interrupted.load(Ordering::SeqCst)
        },
        &preferences,
    )
    .await;

    match result {
        Ok(()) => {
            display.finish();
            let digest = file_sha1(&destination).await?;
            println!("SHA1: {digest}");
            Ok(())
        }
        Err(error) => {
            display.abandon();
            Err(error)
        }
    }
}

/// SHA-1 of a file, streamed block-wise.
async fn file_sha1(path: &std::path::Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::filesystem(e, path))?;

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; DIGEST_BLOCK];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| DownloadError::filesystem(e, path))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn sha1_of_known_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let digest = file_sha1(&path).await.unwrap();
        assert_eq!(digest, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[tokio::test]
    async fn sha1_of_missing_file_maps_to_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let result = file_sha1(&dir.path().join("absent")).await;
        assert!(result.is_err());
    }
}

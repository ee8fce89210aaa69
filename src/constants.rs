//! Application constants for rangefetch
//!
//! Centralizes the tunables used throughout the crate, organized by
//! functional domain.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("rangefetch/", env!("CARGO_PKG_VERSION"));

    /// Connection establishment timeout for download requests
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Connection establishment timeout for one-shot content requests
    pub const CONTENT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

    /// Low-speed watchdog: abort a transfer that stays below this rate...
    pub const LOW_SPEED_LIMIT: u64 = 1024;

    /// ...for this long
    pub const LOW_SPEED_WINDOW: Duration = Duration::from_secs(8);

    /// Hard ceiling on waiting for a single body chunk
    pub const CHUNK_READ_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Download coordination defaults
pub mod download {
    use super::Duration;

    /// Default number of concurrent range connections
    pub const DEFAULT_CONNECTIONS: u32 = 4;

    /// Default size of one allocatable range
    pub const DEFAULT_BLOCK_SIZE: i64 = 1024 * 1024;

    /// Default coordinator polling period
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    /// Default download-level retry/arbitration timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

    /// Resources smaller than this are fetched with a single connection
    pub const MULTI_MODE_THRESHOLD: i64 = 10 * 1024 * 1024;

    /// Minimum gap between two metadata dumps
    pub const DUMP_INTERVAL: Duration = Duration::from_secs(5);
}

/// On-disk artifact naming
pub mod files {
    /// Suffix of the partially-filled data file
    pub const TEMP_SUFFIX: &str = "temp";

    /// Suffix of the serialized range metadata
    pub const META_SUFFIX: &str = "meta";

    /// Scratch name used while atomically replacing the metadata file
    pub const META_SWAP_SUFFIX: &str = "meta.temp";
}

/// Range metadata binary format
pub mod metadata {
    /// File magic for the metadata side-file
    pub const MAGIC: [u8; 4] = *b"RFMD";

    /// Current metadata format version; older or newer files are discarded
    pub const FORMAT_VERSION: u16 = 1;
}

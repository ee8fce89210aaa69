//! Download preferences

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::client::ClientConfig;
use crate::constants::download;

/// Caller-facing knobs for one download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// Number of concurrent range connections. Values of 1 or less force
    /// direct (single-connection) mode.
    pub connections: u32,
    /// Coordinator polling period; also the progress callback granularity.
    /// Ignored in direct mode beyond throttling progress reports.
    pub interval: Duration,
    /// Size of one allocatable range. Ignored in direct mode.
    pub block_size: i64,
    /// Download-level retry and failure-arbitration timeout.
    pub timeout: Duration,
    /// Extra request headers sent with every request.
    pub headers: HashMap<String, String>,
    /// HTTP adapter configuration.
    pub client: ClientConfig,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            connections: download::DEFAULT_CONNECTIONS,
            interval: download::DEFAULT_INTERVAL,
            block_size: download::DEFAULT_BLOCK_SIZE,
            timeout: download::DEFAULT_TIMEOUT,
            headers: HashMap::new(),
            client: ClientConfig::default(),
        }
    }
}

impl Preferences {
    pub fn with_connections(mut self, connections: u32) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_block_size(mut self, block_size: i64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), String> {
        if self.connections == 0 {
            return Err("connections must be at least 1".to_string());
        }
        if self.block_size <= 0 {
            return Err("block_size must be positive".to_string());
        }
        if self.interval.is_zero() {
            return Err("interval must be non-zero".to_string());
        }
        Ok(())
    }
}

//! HTTP client configuration and construction

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app::classify::TransportError;
use crate::constants::http;

/// Configuration of the HTTP adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connection establishment timeout for download requests.
    pub connect_timeout: Duration,
    /// Connection establishment timeout for one-shot content requests.
    pub content_connect_timeout: Duration,
    /// Low-speed watchdog: minimum sustained throughput in bytes/second...
    pub low_speed_limit: u64,
    /// ...measured over this window; slower transfers are aborted.
    pub low_speed_window: Duration,
    /// Hard ceiling on waiting for a single body chunk.
    pub chunk_read_timeout: Duration,
    /// Skip TLS certificate verification. Verification is on by default;
    /// only flip this for origins with known-broken certificates.
    pub danger_accept_invalid_certs: bool,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: http::CONNECT_TIMEOUT,
            content_connect_timeout: http::CONTENT_CONNECT_TIMEOUT,
            low_speed_limit: http::LOW_SPEED_LIMIT,
            low_speed_window: http::LOW_SPEED_WINDOW,
            chunk_read_timeout: http::CHUNK_READ_TIMEOUT,
            danger_accept_invalid_certs: false,
            user_agent: http::USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Build the reqwest client used for probe, streaming and ranged GETs.
    pub fn build_http_client(&self) -> Result<Client, TransportError> {
        self.builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(TransportError::from)
    }

    /// Build the client used for one-shot content requests, which allows the
    /// origin more time to answer.
    pub fn build_content_client(&self) -> Result<Client, TransportError> {
        self.builder()
            .connect_timeout(self.content_connect_timeout)
            .build()
            .map_err(TransportError::from)
    }

    fn builder(&self) -> reqwest::ClientBuilder {
        Client::builder()
            .user_agent(self.user_agent.clone())
            .danger_accept_invalid_certs(self.danger_accept_invalid_certs)
            .tcp_nodelay(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_verify_tls() {
        let config = ClientConfig::default();
        assert!(!config.danger_accept_invalid_certs);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.content_connect_timeout, Duration::from_secs(8));
        assert_eq!(config.low_speed_limit, 1024);
        assert_eq!(config.low_speed_window, Duration::from_secs(8));
    }

    #[test]
    fn clients_build_from_defaults() {
        let config = ClientConfig::default();
        assert!(config.build_http_client().is_ok());
        assert!(config.build_content_client().is_ok());
    }
}

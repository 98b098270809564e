//! Server configuration module
//! Handles the listening parameters for the relay server

use crate::constants::{
    DEFAULT_ACCEPT_BACKOFF_MS, DEFAULT_BACKLOG, DEFAULT_HOST, DEFAULT_PORT, RECEIVE_BUFFER_SIZE,
};
use crate::error::{Result, RustyRelayError};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Pending-connection queue length passed to `listen`
    pub backlog: u32,
    /// Maximum bytes delivered by a single receive
    pub buffer_size: usize,
    /// Delay before retrying after a failed accept
    pub accept_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            buffer_size: RECEIVE_BUFFER_SIZE,
            accept_backoff: Duration::from_millis(DEFAULT_ACCEPT_BACKOFF_MS),
        }
    }
}

impl ServerConfig {
    /// Loopback configuration on an ephemeral port
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables if available
    ///
    /// A `.env` file in the working directory is loaded first when present.
    /// Numeric values that fail to parse fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("RUSTY_RELAY_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("RUSTY_RELAY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let backlog = env::var("RUSTY_RELAY_BACKLOG")
            .ok()
            .and_then(|b| b.parse().ok())
            .unwrap_or(DEFAULT_BACKLOG);

        let buffer_size = env::var("RUSTY_RELAY_BUFFER")
            .ok()
            .and_then(|b| b.parse().ok())
            .unwrap_or(RECEIVE_BUFFER_SIZE);

        let backoff_ms = env::var("RUSTY_RELAY_ACCEPT_BACKOFF_MS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_ACCEPT_BACKOFF_MS);

        let config = Self {
            host,
            port,
            backlog,
            buffer_size,
            accept_backoff: Duration::from_millis(backoff_ms),
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject values the listener cannot work with
    pub fn validate(&self) -> Result<()> {
        self.host.parse::<IpAddr>().map_err(|_| {
            RustyRelayError::ConfigError(format!(
                "host must be an IPv4 or IPv6 address, got '{}'",
                self.host
            ))
        })?;

        if self.backlog == 0 {
            return Err(RustyRelayError::ConfigError(
                "backlog must be greater than zero".to_string(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(RustyRelayError::ConfigError(
                "buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Address the listener binds to; its family selects IPv4 or IPv6
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            RustyRelayError::ConfigError(format!("invalid host address: {}", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

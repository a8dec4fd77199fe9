//! Server configuration loaded from environment variables
//!
//! All configuration comes from the environment at startup (12-factor
//! style). `dotenvy` loads a local `.env` file in development.
//!
//! Required: `API_TOKEN`, `REDIS_URL`, `RATE_API_URL`.
//! Optional: `HOST` (default "0.0.0.0"), `PORT` (default 3000), `RUST_LOG`.

use std::env;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Runtime configuration of the pricing service
#[derive(Debug, Clone)]
pub struct Config {
    /// Token header sent to the upstream oracle
    pub api_token: String,

    /// Store connection string
    pub redis_url: String,

    /// Upstream oracle endpoint
    pub rate_api_url: String,

    /// Bind address
    pub host: IpAddr,

    /// Bind port
    pub port: u16,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let host = match lookup("HOST") {
            Some(raw) => raw
                .parse::<IpAddr>()
                .map_err(|e| ConfigError::Invalid("HOST", e.to_string()))?,
            None => IpAddr::from([0, 0, 0, 0]),
        };
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| ConfigError::Invalid("PORT", e.to_string()))?,
            None => 3000,
        };

        Ok(Self {
            api_token: require("API_TOKEN")?,
            redis_url: require("REDIS_URL")?,
            rate_api_url: require("RATE_API_URL")?,
            host,
            port,
        })
    }

    /// Socket address the server binds to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

use crate::{env_or_default, ConfigError, FromEnv};
use std::net::Ipv4Addr;

/// Bind address for a side-channel HTTP server (health, metrics).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    /// Load from a custom pair of variables, e.g. a worker's health port.
    pub fn from_env_with(host_key: &str, port_key: &str, default_port: u16) -> Result<Self, ConfigError> {
        let host = env_or_default(host_key, &Ipv4Addr::UNSPECIFIED.to_string());
        let port = env_or_default(port_key, &default_port.to_string())
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: port_key.to_string(),
                details: format!("{}", e),
            })?;

        Ok(Self { host, port })
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    /// Reads HOST (default 0.0.0.0) and PORT (default 8080).
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with("HOST", "PORT", 8080)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED.to_string(),
            port: 8080,
        }
    }
}

//! Listen address configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::ConfigError;

/// Where [`App::listen`](crate::App::listen) binds.
///
/// Read from the environment:
///
/// | Variable | Default   | Meaning                                  |
/// |----------|-----------|------------------------------------------|
/// | `PORT`   | `0`       | listen port; `0` picks an ephemeral port |
/// | `HOST`   | `0.0.0.0` | bind address                             |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self { host: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: 0 }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = lookup("PORT").filter(|v| !v.trim().is_empty()) {
            config.port = raw.trim().parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "PORT", value: raw.clone() })?;
        }
        if let Some(raw) = lookup("HOST").filter(|v| !v.trim().is_empty()) {
            config.host = raw.trim().parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "HOST", value: raw.clone() })?;
        }
        Ok(config)
    }

    /// Replaces the port when `port` is given.
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

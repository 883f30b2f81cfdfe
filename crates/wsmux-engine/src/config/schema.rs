use std::time::Duration;

use serde::Deserialize;
use wsmux_core::error::{Result, WsMuxError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(WsMuxError::UnsupportedVersion);
        }
        self.server.validate()?;
        self.connection.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// HTTP route that upgrades to WebSocket.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(WsMuxError::BadRequest(
                "server.path must start with '/'".into(),
            ));
        }
        if self.path == "/healthz" || self.path == "/metrics" {
            return Err(WsMuxError::BadRequest(
                "server.path collides with an ops route".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_path() -> String {
    "/echo".into()
}

/// Per-connection tuning shared by server and client connections.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Socket read timeout; 0 blocks indefinitely.
    #[serde(default)]
    pub read_timeout_ms: u64,

    /// Socket write timeout; 0 blocks indefinitely.
    #[serde(default)]
    pub write_timeout_ms: u64,

    /// Capacity of the outbound frame queue.
    #[serde(default = "default_write_queue")]
    pub write_queue: usize,

    /// Upper bound for delivering one broadcast to one connection.
    #[serde(default = "default_broadcast_timeout_ms")]
    pub broadcast_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            write_queue: default_write_queue(),
            broadcast_timeout_ms: default_broadcast_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=65536).contains(&self.write_queue) {
            return Err(WsMuxError::BadRequest(
                "connection.write_queue must be between 1 and 65536".into(),
            ));
        }
        if !(1..=60000).contains(&self.broadcast_timeout_ms) {
            return Err(WsMuxError::BadRequest(
                "connection.broadcast_timeout_ms must be between 1 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }
}

fn default_write_queue() -> usize {
    1024
}
fn default_broadcast_timeout_ms() -> u64 {
    1000
}

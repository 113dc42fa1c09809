use error::ConfigError;
use rudpnet::EngineOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

pub mod error;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub peer: PeerConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Local bind address; consecutive ports are tried when taken.
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerConfig {
    /// Remote endpoint to talk to. Without one the peer only answers.
    pub remote: Option<String>,
    /// Logical channel (0-15) used for outbound traffic.
    pub channel: u8,
    /// Answer every received payload with the same bytes.
    pub echo: bool,
    /// Interval between outbound messages when a remote is configured.
    pub message_interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransportConfig {
    /// Silence before the first keep-alive ping, milliseconds.
    pub keepalive_first_ping_ms: u64,
    /// Interval between subsequent keep-alive pings, milliseconds.
    pub keepalive_next_ping_ms: u64,
    /// Silence after which a channel is torn down, milliseconds.
    pub disconnect_timeout_ms: u64,
    /// Buffer egress in per-channel write queues instead of sending
    /// immediately.
    pub use_write_queue: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            remote: None,
            channel: 0,
            echo: true,
            message_interval_ms: 1000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        let options = EngineOptions::default();
        Self {
            keepalive_first_ping_ms: options.keepalive_first_ping_us / 1000,
            keepalive_next_ping_ms: options.keepalive_next_ping_us / 1000,
            disconnect_timeout_ms: options.disconnect_timeout_us / 1000,
            use_write_queue: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            peer: PeerConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl TransportConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            keepalive_first_ping_us: self.keepalive_first_ping_ms * 1000,
            keepalive_next_ping_us: self.keepalive_next_ping_ms * 1000,
            disconnect_timeout_us: self.disconnect_timeout_ms * 1000,
            use_write_queue: self.use_write_queue,
            ..EngineOptions::default()
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(&self.network.address).is_err() {
            return Err(ConfigError::Validation(format!(
                "invalid network address '{}', expected IP:PORT",
                self.network.address
            )));
        }

        if let Some(remote) = &self.peer.remote {
            if SocketAddr::from_str(remote).is_err() {
                return Err(ConfigError::Validation(format!(
                    "invalid remote address '{remote}', expected IP:PORT"
                )));
            }
        }

        if self.peer.channel >= 16 {
            return Err(ConfigError::Validation(format!(
                "channel {} out of range, channels are 0-15",
                self.peer.channel
            )));
        }

        if self.peer.message_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "message interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Loads `config.toml` from the working directory. A missing file is not an
/// error: the defaults are written out so operators have something to edit,
/// and the peer starts with them.
pub fn handle() -> Result<Config, ConfigError> {
    load_or_create(Path::new(CONFIG_FILE_NAME))
}

fn load_or_create(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        let defaults = Config::default();
        fs::write(path, toml::to_string_pretty(&defaults)?)?;
        return Ok(defaults);
    }

    let config: Config = toml::from_str(&fs::read_to_string(path)?)?;
    config.validate()?;
    Ok(config)
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::connection::DEFAULT_READ_BUFFER;
use crate::server::registry::DEFAULT_MAX_CLIENTS;
use crate::server::session::SessionSettings;

/// Complete broker configuration loaded from TOML.
///
/// # Example TOML
///
/// ```toml
/// [broker]
/// address = "0.0.0.0:5000"
/// max_clients = 10
///
/// [device]
/// path = "/dev/ledkey"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub broker: BrokerInfo,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Listener and session tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerInfo {
    /// Address to listen on (e.g., "0.0.0.0:5000")
    pub address: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Bytes per socket read; every read is one message
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Frames queued per client before broadcasts to it are dropped
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

/// LED character device. Without a path the broker runs in simulation mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub path: Option<PathBuf>,
}

fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}

fn default_handshake_timeout_ms() -> u64 {
    2000
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER
}

fn default_outbound_buffer() -> usize {
    64
}

impl BrokerConfig {
    /// Configuration listening on `address` with every other field defaulted.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            broker: BrokerInfo {
                address: address.into(),
                max_clients: default_max_clients(),
                handshake_timeout_ms: default_handshake_timeout_ms(),
                read_buffer_size: default_read_buffer_size(),
                outbound_buffer: default_outbound_buffer(),
            },
            device: DeviceConfig::default(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            handshake_timeout: Duration::from_millis(self.broker.handshake_timeout_ms),
            handshake_limit: self.broker.read_buffer_size,
            outbound_buffer: self.broker.outbound_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: BrokerConfig = toml::from_str(
            r#"
            [broker]
            address = "0.0.0.0:5000"
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.max_clients, 10);
        assert_eq!(config.broker.read_buffer_size, 1024);
        assert!(config.device.path.is_none());
        assert_eq!(
            config.session_settings().handshake_timeout,
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_device_path() {
        let config: BrokerConfig = toml::from_str(
            r#"
            [broker]
            address = "0.0.0.0:5000"
            max_clients = 3

            [device]
            path = "/dev/ledkey"
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.max_clients, 3);
        assert_eq!(config.device.path, Some(PathBuf::from("/dev/ledkey")));
    }
}

//! Gateway configuration types.
//!
//! Plain serde structs loaded from a JSON file by the server binary. Every
//! field has a default so a minimal config only needs to list the protocols
//! it wants enabled.

use serde::{Deserialize, Serialize};

/// Default cap on buffered bytes per connection before the connection is
/// considered hostile and dropped.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8192;

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Listener configuration for one protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolConfig {
    /// Protocol name; must match a registered plugin (e.g. "gt06")
    pub name: String,

    /// TCP port to listen on
    pub port: u16,

    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Per-connection buffered-frame size cap in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl ProtocolConfig {
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            port,
            host: default_host(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A device pre-registered with the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownDevice {
    /// Internal device id
    pub id: u64,

    /// Declared unique identifier, usually an IMEI
    pub unique_id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Enabled protocol listeners
    #[serde(default)]
    pub protocols: Vec<ProtocolConfig>,

    /// Devices to seed the directory with
    #[serde(default)]
    pub devices: Vec<KnownDevice>,

    /// Register unseen unique ids on the fly instead of rejecting them
    #[serde(default)]
    pub register_unknown: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let json = r#"{
            "protocols": [{"name": "gt06", "port": 5023}],
            "devices": [{"id": 1, "uniqueId": "123456789012345"}]
        }"#;

        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.protocols.len(), 1);
        assert_eq!(config.protocols[0].bind_addr(), "0.0.0.0:5023");
        assert_eq!(config.protocols[0].max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.devices[0].unique_id, "123456789012345");
        assert!(!config.register_unknown);
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "protocols": [
                {"name": "meiligao", "port": 5009, "host": "127.0.0.1", "maxFrameSize": 65536}
            ],
            "registerUnknown": true
        }"#;

        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.protocols[0].bind_addr(), "127.0.0.1:5009");
        assert_eq!(config.protocols[0].max_frame_size, 65536);
        assert!(config.register_unknown);
        assert!(config.devices.is_empty());
    }
}

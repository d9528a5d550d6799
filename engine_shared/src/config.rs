//! Configuration system.
//!
//! Loads engine configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// TCP listen/connect address, e.g. `127.0.0.1:9183`.
    #[serde(default = "default_tcp_addr")]
    pub tcp_addr: String,
    /// UDP listen/connect address, e.g. `127.0.0.1:9184`.
    #[serde(default = "default_udp_addr")]
    pub udp_addr: String,
    /// Server-side fixed simulation tick rate.
    #[serde(default = "default_server_tick_hz")]
    pub server_tick_hz: u32,
    /// Client-side render/pump tick rate.
    #[serde(default = "default_client_tick_hz")]
    pub client_tick_hz: u32,
}

fn default_tcp_addr() -> String {
    "127.0.0.1:9183".to_string()
}

fn default_udp_addr() -> String {
    "127.0.0.1:9184".to_string()
}

fn default_server_tick_hz() -> u32 {
    20
}

fn default_client_tick_hz() -> u32 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tcp_addr: default_tcp_addr(),
            udp_addr: default_udp_addr(),
            server_tick_hz: default_server_tick_hz(),
            client_tick_hz: default_client_tick_hz(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_ports() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.tcp_addr, "127.0.0.1:9183");
        assert_eq!(cfg.udp_addr, "127.0.0.1:9184");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg.server_tick_hz, 20);
        assert_eq!(cfg.client_tick_hz, 60);
    }
}

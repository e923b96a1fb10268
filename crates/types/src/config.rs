//! Node configuration: the TOML-loaded settings shared by every
//! component.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_min_trusted() -> usize {
    3
}

fn default_max_trusted() -> usize {
    5
}

fn default_meta_capacity() -> usize {
    16
}

fn default_max_packet_request_size() -> u64 {
    1000
}

fn default_stage_request_ms() -> u64 {
    4000
}

fn default_state_expiry_ms() -> u64 {
    5000
}

fn default_post_consensus_timeout_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub listen_addr: SocketAddr,
    #[serde(default)]
    pub seed_peers: Vec<SocketAddr>,
    pub public_key_path: PathBuf,
    pub private_key_path: PathBuf,
    pub data_dir: PathBuf,

    #[serde(default = "default_min_trusted")]
    pub min_trusted_nodes: usize,
    #[serde(default = "default_max_trusted")]
    pub max_trusted_nodes: usize,
    #[serde(default = "default_meta_capacity")]
    pub meta_capacity: usize,
    #[serde(default = "default_max_packet_request_size")]
    pub max_packet_request_size: u64,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Reproduces the upstream's accidental single-pass validator
    /// behavior for compatibility testing (spec §9, iterative
    /// validator flag). Defaults to the corrected, iterative
    /// behavior.
    #[serde(default)]
    pub single_pass_validation: bool,

    /// Base58-encoded public key trusted to sign big-bang round-table
    /// resets. `None` means this node rejects every big-bang message.
    #[serde(default)]
    pub big_bang_authority: Option<String>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_stage_request_ms")]
    pub stage_request_ms: u64,
    #[serde(default = "default_state_expiry_ms")]
    pub state_expiry_ms: u64,
    #[serde(default = "default_post_consensus_timeout_ms")]
    pub post_consensus_timeout_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            stage_request_ms: default_stage_request_ms(),
            state_expiry_ms: default_state_expiry_ms(),
            post_consensus_timeout_ms: default_post_consensus_timeout_ms(),
        }
    }
}

impl TimeoutsConfig {
    pub fn stage_request(&self) -> Duration {
        Duration::from_millis(self.stage_request_ms)
    }

    pub fn state_expiry(&self) -> Duration {
        Duration::from_millis(self.state_expiry_ms)
    }

    pub fn post_consensus_timeout(&self) -> Duration {
        Duration::from_millis(self.post_consensus_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default)]
    pub metrics_bind_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            log_level: default_log_level(),
            json_logs: false,
            metrics_bind_addr: None,
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_in_defaults() {
        let toml_src = r#"
            listen_addr = "127.0.0.1:9000"
            public_key_path = "NodePublic.txt"
            private_key_path = "NodePrivate.txt"
            data_dir = "./data"
        "#;
        let cfg = NodeConfig::from_toml_str(toml_src).expect("parses");
        assert_eq!(cfg.min_trusted_nodes, 3);
        assert_eq!(cfg.max_trusted_nodes, 5);
        assert_eq!(cfg.timeouts.stage_request_ms, 4000);
        assert!(!cfg.single_pass_validation);
    }
}

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime tunables for a single node.
///
/// Construction order is: code defaults (`Default`), optionally overlaid by
/// a TOML file (`NodeConfig::load_toml`), then overlaid by environment
/// variables (`NodeConfig::apply_env_overrides`) at the binary entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub ack_timeout_ms: u64,
    pub max_ack_retries: u32,
    pub max_hop_count: u8,
    pub rx_base: u16,
    pub tx_base: u16,
    pub loss_percentage: u8,
    pub pow_max_workers: usize,
    pub pow_max_attempts: u64,
    pub data_dir: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 1000,
            max_ack_retries: 3,
            max_hop_count: 50,
            rx_base: 8000,
            tx_base: 9000,
            loss_percentage: 0,
            pow_max_workers: default_pow_max_workers(),
            pow_max_attempts: 1_000_000,
            data_dir: "./data".to_string(),
        }
    }
}

fn default_pow_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

impl NodeConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Loads a config from a TOML file, falling back silently to defaults
    /// when the file does not exist; returns an error only on a malformed
    /// file that does exist.
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.display().to_string(), e))
    }

    /// Applies `HOPWIRE_*` environment overrides on top of whatever values
    /// are already set, mirroring the env-var-driven wiring the rest of
    /// this codebase's binaries use.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("HOPWIRE_ACK_TIMEOUT_MS") {
            self.ack_timeout_ms = v;
        }
        if let Some(v) = env_u64("HOPWIRE_MAX_ACK_RETRIES") {
            self.max_ack_retries = v as u32;
        }
        if let Some(v) = env_u64("HOPWIRE_MAX_HOP_COUNT") {
            self.max_hop_count = v as u8;
        }
        if let Some(v) = env_u64("HOPWIRE_RX_BASE") {
            self.rx_base = v as u16;
        }
        if let Some(v) = env_u64("HOPWIRE_TX_BASE") {
            self.tx_base = v as u16;
        }
        if let Some(v) = env_u64("HOPWIRE_LOSS_PERCENTAGE") {
            self.loss_percentage = v as u8;
        }
        if let Some(v) = env_u64("HOPWIRE_POW_MAX_WORKERS") {
            self.pow_max_workers = v as usize;
        }
        if let Some(v) = env_u64("HOPWIRE_POW_MAX_ATTEMPTS") {
            self.pow_max_attempts = v;
        }
        if let Ok(v) = std::env::var("HOPWIRE_DATA_DIR") {
            self.data_dir = v;
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(String, toml::de::Error),
}

//! Runtime configuration, loaded from a TOML file.
//!
//! Every section has serde defaults, so a partial (or empty) file yields a
//! fully usable configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Load a configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("malformed config {}", path.display()))?;
    Ok(config)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub detectors: DetectorConfig,
    #[serde(default)]
    pub ml: MlConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Capture device name; `None` selects the first non-loopback interface.
    #[serde(default)]
    pub interface: Option<String>,
    /// Raw packet queue capacity. The producer drops on overflow.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: None,
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            topic: default_topic(),
        }
    }
}

/// Per-plugin activation flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    #[serde(default = "default_true")]
    pub ai_domain: bool,
    #[serde(default = "default_true")]
    pub unusual_port: bool,
    #[serde(default = "default_true")]
    pub dns_tunneling: bool,
    #[serde(default = "default_true")]
    pub data_exfiltration: bool,
    #[serde(default = "default_true")]
    pub cidr_intel: bool,
    #[serde(default = "default_true")]
    pub ja3_fingerprint: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            ai_domain: true,
            unusual_port: true,
            dns_tunneling: true,
            data_exfiltration: true,
            cidr_intel: true,
            ja3_fingerprint: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MlConfig {
    fn default() -> Self {
        MlConfig { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            window_minutes: default_window_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    #[serde(default = "default_centrality_interval")]
    pub centrality_interval_s: f64,
    #[serde(default = "default_centrality_threshold")]
    pub centrality_threshold: f64,
    #[serde(default = "default_min_connections")]
    pub min_connections: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            centrality_interval_s: default_centrality_interval(),
            centrality_threshold: default_centrality_threshold(),
            min_connections: default_min_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: usize,
    #[serde(default = "default_cooldown")]
    pub cooldown_s: f64,
    #[serde(default = "default_probe_timeout")]
    pub timeout_s: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            enabled: true,
            max_per_minute: default_max_per_minute(),
            cooldown_s: default_cooldown(),
            timeout_s: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_blocked")]
    pub max_blocked: usize,
    #[serde(default = "default_block_ttl")]
    pub ttl_s: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        ResponseConfig {
            enabled: true,
            max_blocked: default_max_blocked(),
            ttl_s: default_block_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite database path. `None` keeps the graph in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Static key required on write endpoints via `X-API-Key`.
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            listen: default_listen(),
            key: None,
        }
    }
}

fn default_buffer_size() -> usize {
    1000
}

fn default_topic() -> String {
    "sh.telemetry.traffic.v1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_window_minutes() -> i64 {
    30
}

fn default_centrality_interval() -> f64 {
    60.0
}

fn default_centrality_threshold() -> f64 {
    0.3
}

fn default_min_connections() -> usize {
    3
}

fn default_max_per_minute() -> usize {
    10
}

fn default_cooldown() -> f64 {
    300.0
}

fn default_probe_timeout() -> f64 {
    5.0
}

fn default_max_blocked() -> usize {
    500
}

fn default_block_ttl() -> f64 {
    3600.0
}

fn default_listen() -> String {
    "127.0.0.1:8787".to_string()
}

//! Configuration loading and validation

use anyhow::{bail, Context, Result};
use rokubridge_discovery::{ScannerConfig, StaticDevice};
use rokubridge_ecp::{DEFAULT_TIMEOUT_MS, ECP_PORT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the REST API
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Seconds between discovery cycles
    #[serde(default = "default_interval")]
    pub polling_interval_secs: u64,
    /// Where registered accessories are persisted
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            polling_interval_secs: default_interval(),
            cache_path: default_cache_path(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_interval() -> u64 {
    60
}

fn default_cache_path() -> String {
    "./accessories.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Sweep the local network for players each cycle
    #[serde(default)]
    pub auto_discover: bool,
    /// Addresses never probed
    #[serde(default)]
    pub excluded_devices: Vec<String>,
    /// App ids or names hidden from accessories
    #[serde(default)]
    pub excluded_apps: Vec<String>,
    /// ECP port
    #[serde(default = "default_ecp_port")]
    pub ecp_port: u16,
    /// Per-device probe timeout
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// How long a sweep listens for responses
    #[serde(default = "default_sweep_timeout")]
    pub sweep_timeout_ms: u64,
    /// Cap on concurrent probes
    #[serde(default)]
    pub max_concurrent_probes: Option<usize>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            auto_discover: false,
            excluded_devices: Vec::new(),
            excluded_apps: Vec::new(),
            ecp_port: default_ecp_port(),
            probe_timeout_ms: default_probe_timeout(),
            sweep_timeout_ms: default_sweep_timeout(),
            max_concurrent_probes: None,
        }
    }
}

fn default_ecp_port() -> u16 {
    ECP_PORT
}

fn default_probe_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_sweep_timeout() -> u64 {
    3000
}

/// A statically configured player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Name used when the device reports none
    #[serde(default)]
    pub name: String,
    /// IP address or hostname
    pub ip: String,
}

impl Config {
    /// Reject settings the scheduler can't run with
    pub fn validate(&self) -> Result<()> {
        if self.daemon.polling_interval_secs == 0 {
            bail!("daemon.polling_interval_secs must be positive");
        }
        if self.discovery.max_concurrent_probes == Some(0) {
            bail!("discovery.max_concurrent_probes must be positive when set");
        }
        Ok(())
    }

    /// Convert to ScannerConfig
    pub fn to_scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            auto_discover: self.discovery.auto_discover,
            excluded_devices: self.discovery.excluded_devices.clone(),
            excluded_apps: self.discovery.excluded_apps.clone(),
            devices: self
                .devices
                .iter()
                .map(|d| StaticDevice {
                    name: d.name.clone(),
                    ip: d.ip.clone(),
                })
                .collect(),
            ecp_port: self.discovery.ecp_port,
            interval_secs: self.daemon.polling_interval_secs,
            probe_timeout_ms: self.discovery.probe_timeout_ms,
            sweep_timeout_ms: self.discovery.sweep_timeout_ms,
            max_concurrent_probes: self.discovery.max_concurrent_probes,
        }
    }
}

/// Parse and validate configuration text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config =
            parse_config(&content).with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

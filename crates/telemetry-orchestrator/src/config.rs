//! Bridge configuration.
//!
//! Loaded from an optional YAML or JSON file; command-line flags are applied
//! on top by the binary before [`BridgeConfig::validate`] runs.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ssp_telemetry_adapters::{
    DEFAULT_AMS2_PORT, DEFAULT_BEAMNG_PORT, SourceOptions, available_plugin_ids,
    default_process_query, find_plugin,
};
use ssp_telemetry_core::DEFAULT_PUBLISH_MIN_RPM;
use ssp_telemetry_sinks::{DEFAULT_SERIAL_BAUD, DEFAULT_SERIAL_RATE_HZ, SerialSettings};
use thiserror::Error;
use tracing::debug;

/// Game id that selects auto-detection instead of a fixed plugin.
pub const AUTO_GAME: &str = "auto";

const MIN_HZ: f64 = 0.01;
const MAX_HZ: f64 = 1_000.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
    /// Lines per second; 0 disables limiting.
    pub rate_hz: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: DEFAULT_SERIAL_BAUD,
            rate_hz: DEFAULT_SERIAL_RATE_HZ,
        }
    }
}

impl SerialConfig {
    pub fn settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.port.clone(),
            baud: self.baud,
            rate_hz: self.rate_hz,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Plugin id, or `auto`.
    pub game: String,
    /// Emission rate in Hz.
    pub hz: f64,
    pub ws_host: String,
    pub ws_port: u16,
    pub logs_dir: PathBuf,
    pub reconnect_delay_ms: u64,
    /// Treat the first source failure as fatal.
    pub fail_fast: bool,
    pub publish_min_rpm: i64,
    pub probe_window_ms: u64,
    pub probe_interval_ms: u64,
    pub ams2_port: u16,
    pub beamng_port: u16,
    /// Local address UDP sources bind to.
    pub bind_host: String,
    pub serial: Option<SerialConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            game: "ac".to_string(),
            hz: 60.0,
            ws_host: "127.0.0.1".to_string(),
            ws_port: 8765,
            logs_dir: PathBuf::from("logs"),
            reconnect_delay_ms: 2000,
            fail_fast: false,
            publish_min_rpm: DEFAULT_PUBLISH_MIN_RPM,
            probe_window_ms: 800,
            probe_interval_ms: 20,
            ams2_port: DEFAULT_AMS2_PORT,
            beamng_port: DEFAULT_BEAMNG_PORT,
            bind_host: "0.0.0.0".to_string(),
            serial: None,
        }
    }
}

impl BridgeConfig {
    /// Load a configuration file. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn load_from_path(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed: Result<Self, String> = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        let config = parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        debug!(path = %path.display(), "loaded bridge config");
        Ok(config)
    }

    /// Load `path` if given, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load_from_path)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.hz.is_finite() || self.hz <= 0.0 {
            return Err(ConfigError::Invalid(format!("hz must be > 0, got {}", self.hz)));
        }
        if !self.is_auto() && find_plugin(&self.game).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown game '{}'; expected '{AUTO_GAME}' or one of: {}",
                self.game,
                available_plugin_ids().join(", ")
            )));
        }
        if self.probe_window_ms == 0 {
            return Err(ConfigError::Invalid("probe_window_ms must be > 0".to_string()));
        }
        if self.probe_interval_ms == 0 {
            return Err(ConfigError::Invalid("probe_interval_ms must be > 0".to_string()));
        }
        if self.publish_min_rpm < 0 {
            return Err(ConfigError::Invalid(format!(
                "publish_min_rpm must be >= 0, got {}",
                self.publish_min_rpm
            )));
        }
        self.bind_ip()?;
        if let Some(serial) = &self.serial {
            if serial.port.trim().is_empty() {
                return Err(ConfigError::Invalid("serial.port must not be empty".to_string()));
            }
            if serial.baud == 0 {
                return Err(ConfigError::Invalid("serial.baud must be > 0".to_string()));
            }
        }
        Ok(())
    }

    pub fn is_auto(&self) -> bool {
        self.game.trim().eq_ignore_ascii_case(AUTO_GAME)
    }

    /// Interval between emissions.
    pub fn emit_period(&self) -> Duration {
        let hz = if self.hz.is_finite() {
            self.hz.clamp(MIN_HZ, MAX_HZ)
        } else {
            MIN_HZ
        };
        Duration::from_secs_f64(1.0 / hz)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn probe_window(&self) -> Duration {
        Duration::from_millis(self.probe_window_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn bind_ip(&self) -> ConfigResult<IpAddr> {
        self.bind_host.trim().parse().map_err(|e| {
            ConfigError::Invalid(format!("bind_host '{}' is not an IP address: {e}", self.bind_host))
        })
    }

    /// Construction parameters for the source plugins.
    pub fn source_options(&self) -> ConfigResult<SourceOptions> {
        Ok(SourceOptions {
            bind_ip: self.bind_ip()?,
            ams2_port: self.ams2_port,
            beamng_port: self.beamng_port,
            process_query: default_process_query(),
        })
    }

    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }
}

//! Command implementations for ssp-bridge

pub mod capabilities;
pub mod plugins;
pub mod run;

use std::path::PathBuf;

use clap::Args;
use ssp_telemetry_orchestrator::{BridgeConfig, SerialConfig};

/// Flags for `ssp-bridge run`. Every flag overrides the config file value.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// YAML or JSON configuration file
    #[arg(short, long, env = "SSP_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Plugin id, or `auto` to detect the running simulator
    #[arg(short, long)]
    pub game: Option<String>,

    /// Emission rate in Hz
    #[arg(long)]
    pub hz: Option<f64>,

    /// WebSocket listen host
    #[arg(long)]
    pub ws_host: Option<String>,

    /// WebSocket listen port
    #[arg(long)]
    pub ws_port: Option<u16>,

    /// Directory for the session log and capability documents
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// Serial port for the line sink (e.g. COM3, /dev/ttyUSB0)
    #[arg(long)]
    pub serial_port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    pub serial_baud: Option<u32>,

    /// Serial lines per second (0 disables limiting)
    #[arg(long)]
    pub serial_rate: Option<u32>,

    /// Delay before retrying a failed connection
    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    /// Exit on the first source failure instead of reconnecting
    #[arg(long)]
    pub fail_fast: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(game) = &self.game {
            config.game.clone_from(game);
        }
        if let Some(hz) = self.hz {
            config.hz = hz;
        }
        if let Some(host) = &self.ws_host {
            config.ws_host.clone_from(host);
        }
        if let Some(port) = self.ws_port {
            config.ws_port = port;
        }
        if let Some(dir) = &self.logs_dir {
            config.logs_dir.clone_from(dir);
        }
        if let Some(delay) = self.reconnect_delay_ms {
            config.reconnect_delay_ms = delay;
        }
        if self.fail_fast {
            config.fail_fast = true;
        }

        if self.serial_port.is_some() || self.serial_baud.is_some() || self.serial_rate.is_some() {
            let serial = config.serial.get_or_insert_with(SerialConfig::default);
            if let Some(port) = &self.serial_port {
                serial.port.clone_from(port);
            }
            if let Some(baud) = self.serial_baud {
                serial.baud = baud;
            }
            if let Some(rate) = self.serial_rate {
                serial.rate_hz = rate;
            }
        }
    }
}

/// Flags for `ssp-bridge capabilities`.
#[derive(Args, Debug)]
pub struct CapabilitiesArgs {
    /// Plugin id
    #[arg(short, long)]
    pub game: String,

    /// Output directory
    #[arg(short, long, default_value = "logs")]
    pub out: PathBuf,
}

//! Bridge orchestration for SSP Bridge.
//!
//! Connects a telemetry source (fixed or auto-detected), polls it faster than
//! it emits, enriches frames with derived signals, deduplicates them and fans
//! them out to the configured sinks. Source failures drive the
//! `waiting -> active -> lost -> waiting` session cycle; only configuration
//! errors (or any failure in fail-fast mode) stop the loop.

#![deny(static_mut_refs)]

pub mod config;
pub mod connector;
pub mod emission;
pub mod scheduler;
pub mod status;

pub use config::{AUTO_GAME, BridgeConfig, ConfigError, ConfigResult, SerialConfig};
pub use connector::{
    AutoConnector, Connection, FixedConnector, PluginConnector, connector_from_config,
};
pub use emission::{EmissionGate, MAX_POLL_INTERVAL, poll_interval_for};
pub use scheduler::{BridgeScheduler, BridgeStats, SchedulerSettings, StopSignal};
pub use status::StatusTracker;

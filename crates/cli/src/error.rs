//! Error types for ssp-bridge

use ssp_telemetry_core::TelemetryError;
use ssp_telemetry_orchestrator::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{0}")]
    UnknownPlugin(String),

    #[error("Cannot listen on {address}: {source}")]
    ServerBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Bridge stopped: {0}")]
    Bridge(TelemetryError),
}

impl CliError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidConfiguration(_) => 2,
            Self::UnknownPlugin(_) => 3,
            Self::ServerBind { .. } => 4,
            Self::Bridge(_) => 5,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::Invalid(reason) => Self::InvalidConfiguration(reason),
            other => Self::InvalidConfiguration(other.to_string()),
        }
    }
}

impl From<TelemetryError> for CliError {
    fn from(error: TelemetryError) -> Self {
        match error {
            TelemetryError::UnknownPlugin { .. } => Self::UnknownPlugin(error.to_string()),
            TelemetryError::InvalidConfiguration(reason) => Self::InvalidConfiguration(reason),
            other => Self::Bridge(other),
        }
    }
}

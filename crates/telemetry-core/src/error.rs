//! Error taxonomy for telemetry acquisition.
//!
//! "No data yet" is never an error: decoders and plugins report it as `None`.
//! Only conditions that need a reconnection (or a fatal startup problem) are
//! expressed as [`TelemetryError`].

use thiserror::Error;

/// Errors raised by telemetry sources, the registry and the bridge loop.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The backing resource (mapping, socket, first packet) is not there yet.
    #[error("{source_id} not available: {reason}")]
    NotAvailable {
        /// Plugin that failed to open.
        source_id: String,
        /// Human readable cause.
        reason: String,
    },

    /// The source stopped producing fresh data and must be reopened.
    #[error("{source_id} telemetry stale: {reason}")]
    Stale {
        /// Plugin that went stale.
        source_id: String,
        /// Human readable cause.
        reason: String,
    },

    /// The owning simulator process disappeared.
    #[error("{source_id} source lost: {reason}")]
    SourceLost {
        /// Plugin whose process went away.
        source_id: String,
        /// Human readable cause.
        reason: String,
    },

    /// A plugin id that the registry does not know.
    #[error("Unknown plugin id '{id}'. Available: {available}")]
    UnknownPlugin {
        /// Requested id.
        id: String,
        /// Comma separated list of registered ids.
        available: String,
    },

    /// Every auto-detect candidate failed.
    #[error("Auto-detect failed. Tried: {}", attempts.join(", "))]
    AutoDetectFailed {
        /// One diagnostic line per candidate.
        attempts: Vec<String>,
    },

    /// Invalid bridge configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TelemetryError {
    #[must_use]
    pub fn not_available(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotAvailable {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn stale(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Stale {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn source_lost(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceLost {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// True for failures that the bridge recovers from by reconnecting.
    #[must_use]
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::NotAvailable { .. }
                | Self::Stale { .. }
                | Self::SourceLost { .. }
                | Self::AutoDetectFailed { .. }
        )
    }
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

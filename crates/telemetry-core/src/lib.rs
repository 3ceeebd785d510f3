//! Core telemetry types for SSP Bridge.
//!
//! This crate holds the canonical data model shared by sources, sinks and the
//! bridge loop.
//!
//! ## Modules
//! - `frame` - [`TelemetryFrame`] and the namespaced signal map
//! - `capabilities` - per-plugin [`CapabilitySpec`]
//! - `events` - `status` / `capabilities` envelope events
//! - `derived` - stateful derived signals ([`RpmMaxTracker`])
//! - `rate_limiter` - rate limiting for best-effort outputs
//! - `error` - [`TelemetryError`] taxonomy

#![deny(static_mut_refs)]

pub mod capabilities;
pub mod derived;
pub mod error;
pub mod events;
pub mod frame;
pub mod rate_limiter;

pub use capabilities::{CapabilitySpec, SignalSpec, SignalType};
pub use derived::{DEFAULT_PUBLISH_MIN_RPM, RpmMaxTracker, apply_rpm_derivation, round_to};
pub use error::{TelemetryError, TelemetryResult};
pub use events::{BridgeEvent, CapabilitiesEvent, EventKind, SessionState, StatusEvent};
pub use frame::{SignalValue, Signals, TelemetryFrame, VehicleInfo, signal};
pub use rate_limiter::RateLimiter;

/// Frame schema version (`v` field).
pub const SCHEMA_VERSION: &str = "0.2";

/// Schema identifier used by capability maps and events.
pub const SCHEMA_ID: &str = "ssp/0.2";

/// Current wall-clock time as Unix seconds.
pub fn unix_timestamp() -> f64 {
    let micros = chrono::Utc::now().timestamp_micros();
    micros as f64 / 1_000_000.0
}

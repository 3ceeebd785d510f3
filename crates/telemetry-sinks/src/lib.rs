//! Output sinks for SSP Bridge.
//!
//! The bridge loop fans every emitted frame and session event out to a set of
//! [`TelemetrySink`]s. Sink failures are isolated: the loop logs them and keeps
//! going, so no sink may block indefinitely.
//!
//! ## Sinks
//! - `ndjson` - append-only session log, one frame per line
//! - `broadcast` - live WebSocket fan-out with sticky status/capabilities
//! - `serial` - rate-limited line transport for microcontrollers
//! - `capabilities_export` - per-plugin capability documents on disk

#![deny(static_mut_refs)]

pub mod broadcast;
pub mod capabilities_export;
pub mod ndjson;
pub mod serial;

pub use broadcast::{DEFAULT_CHANNEL_CAPACITY, LiveBroadcaster, StickyCache, Subscription};
pub use capabilities_export::{CapabilityExportSink, capabilities_path, write_capabilities};
pub use ndjson::{NdjsonSink, SESSION_FILE_NAME};
pub use serial::{DEFAULT_SERIAL_BAUD, DEFAULT_SERIAL_RATE_HZ, SerialLineSink, SerialSettings};

use ssp_telemetry_core::{BridgeEvent, TelemetryFrame};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Sink '{0}' is closed")]
    Closed(&'static str),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for emitted frames and session events.
pub trait TelemetrySink: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Record one emitted frame.
    fn record_frame(&mut self, frame: &TelemetryFrame) -> SinkResult<()>;

    /// Deliver a session event. Sinks that only log frames ignore events.
    fn publish_event(&mut self, _event: &BridgeEvent) -> SinkResult<()> {
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        Ok(())
    }

    /// Release the sink. Called once on every bridge exit path.
    fn close(&mut self) -> SinkResult<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_error_names_the_sink() {
        assert_eq!(SinkError::Closed("ndjson").to_string(), "Sink 'ndjson' is closed");
    }
}

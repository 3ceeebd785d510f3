//! The source plugin contract.

use ssp_telemetry_core::{CapabilitySpec, TelemetryFrame, TelemetryResult};

/// One simulator telemetry source.
///
/// `open` either fully acquires the backing resource or fails with
/// `NotAvailable`. `read_frame` returns `Ok(None)` when there is simply no
/// new data; an `Err` means the caller must close and reconnect.
pub trait SourcePlugin: Send {
    /// Stable registry id (`"ac"`, `"acc"`, ...).
    fn id(&self) -> &'static str;

    /// Human readable name.
    fn name(&self) -> &'static str;

    fn open(&mut self) -> TelemetryResult<()>;

    fn read_frame(&mut self) -> TelemetryResult<Option<TelemetryFrame>>;

    fn capabilities(&self) -> CapabilitySpec;

    /// Release the backing resource. Safe to call repeatedly.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Nominal rate advertised in capability maps.
pub const DEFAULT_SAMPLE_HZ: u32 = 60;

//! Rate-limited serial line sink.
//!
//! Sends one compact JSON frame per line to a microcontroller. The sink is
//! strictly best effort: an unopenable port disables it, denied lines are
//! dropped and write failures are counted, never propagated.

use std::io::Write;
use std::time::Duration;

use ssp_telemetry_core::{RateLimiter, TelemetryFrame};
use tracing::{debug, info, warn};

use crate::{SinkResult, TelemetrySink};

pub const DEFAULT_SERIAL_BAUD: u32 = 115_200;
pub const DEFAULT_SERIAL_RATE_HZ: u32 = 60;

const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub port: String,
    pub baud: u32,
    /// Maximum lines per second; 0 disables limiting.
    pub rate_hz: u32,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud: DEFAULT_SERIAL_BAUD,
            rate_hz: DEFAULT_SERIAL_RATE_HZ,
        }
    }
}

pub struct SerialLineSink {
    port_name: String,
    writer: Option<Box<dyn Write + Send>>,
    limiter: RateLimiter,
    write_errors: u64,
}

impl std::fmt::Debug for SerialLineSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLineSink")
            .field("port_name", &self.port_name)
            .field("enabled", &self.is_enabled())
            .field("rate_hz", &self.limiter.max_rate_hz())
            .field("write_errors", &self.write_errors)
            .finish()
    }
}

impl SerialLineSink {
    /// Open the configured port. Failure yields a disabled sink.
    pub fn open(settings: &SerialSettings) -> Self {
        match serialport::new(&settings.port, settings.baud)
            .timeout(WRITE_TIMEOUT)
            .open()
        {
            Ok(port) => {
                info!(port = %settings.port, baud = settings.baud, "serial output enabled");
                Self::with_writer(&settings.port, port, settings.rate_hz)
            }
            Err(e) => {
                warn!(port = %settings.port, error = %e, "failed to open serial port; serial output disabled");
                Self::disabled(&settings.port, settings.rate_hz)
            }
        }
    }

    /// Sink over an arbitrary byte transport.
    pub fn with_writer(port_name: &str, writer: Box<dyn Write + Send>, rate_hz: u32) -> Self {
        Self {
            port_name: port_name.to_string(),
            writer: Some(writer),
            limiter: RateLimiter::new(rate_hz),
            write_errors: 0,
        }
    }

    fn disabled(port_name: &str, rate_hz: u32) -> Self {
        Self {
            port_name: port_name.to_string(),
            writer: None,
            limiter: RateLimiter::new(rate_hz),
            write_errors: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Lines denied by the rate limiter.
    pub fn dropped_lines(&self) -> u64 {
        self.limiter.dropped_count()
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    /// Send `line` plus a newline. Returns whether it was written.
    pub fn send_line(&mut self, line: &str) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };
        if !self.limiter.should_process() {
            return false;
        }

        let result = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        match result {
            Ok(()) => true,
            Err(e) => {
                self.write_errors = self.write_errors.saturating_add(1);
                debug!(port = %self.port_name, error = %e, "serial write failed; line dropped");
                false
            }
        }
    }
}

impl TelemetrySink for SerialLineSink {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn record_frame(&mut self, frame: &TelemetryFrame) -> SinkResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let line = serde_json::to_string(frame)?;
        self.send_line(&line);
        Ok(())
    }

    fn close(&mut self) -> SinkResult<()> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                debug!(port = %self.port_name, error = %e, "serial flush on close failed");
            }
        }
        Ok(())
    }
}

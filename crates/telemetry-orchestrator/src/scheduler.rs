//! The bridge loop.
//!
//! A single control loop owns polling, derived signals, the emission gate and
//! sink fan-out. It sleeps only between polls, through [`StopSignal`], so a
//! stop request is honoured within one poll interval.
//!
//! Session state machine:
//!
//! ```text
//! waiting --connect--> active (+ capabilities)
//! active --source failure--> lost --> waiting --connect--> active ...
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use ssp_telemetry_core::{
    BridgeEvent, CapabilitiesEvent, CapabilitySpec, DEFAULT_PUBLISH_MIN_RPM, RpmMaxTracker,
    SessionState, TelemetryError, TelemetryFrame, TelemetryResult, apply_rpm_derivation,
};
use ssp_telemetry_sinks::{SinkResult, TelemetrySink};
use tracing::{debug, error, info, trace, warn};

use crate::config::BridgeConfig;
use crate::connector::{Connection, PluginConnector};
use crate::emission::EmissionGate;
use crate::status::StatusTracker;

/// Cooperative stop flag with an interruptible sleep.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.inner.stopped.lock() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleep up to `timeout`. Returns true if a stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self.inner.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub emit_period: Duration,
    pub reconnect_delay: Duration,
    pub fail_fast: bool,
    pub publish_min_rpm: i64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            emit_period: Duration::from_secs_f64(1.0 / 60.0),
            reconnect_delay: Duration::from_secs(2),
            fail_fast: false,
            publish_min_rpm: DEFAULT_PUBLISH_MIN_RPM,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            emit_period: config.emit_period(),
            reconnect_delay: config.reconnect_delay(),
            fail_fast: config.fail_fast,
            publish_min_rpm: config.publish_min_rpm,
        }
    }
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub sessions: u64,
    pub frames_emitted: u64,
    pub source_failures: u64,
    pub connect_failures: u64,
}

struct SinkSlot {
    sink: Box<dyn TelemetrySink>,
    failures: u64,
}

impl SinkSlot {
    fn report(&mut self, result: SinkResult<()>, what: &str) {
        let Err(e) = result else {
            return;
        };
        self.failures = self.failures.saturating_add(1);
        if self.failures == 1 {
            warn!(sink = self.sink.name(), error = %e, "sink failed to accept {what}");
        } else {
            debug!(sink = self.sink.name(), failures = self.failures, error = %e, "sink failure");
        }
    }
}

enum SessionEnd {
    Stopped,
    Lost(TelemetryError),
}

pub struct BridgeScheduler {
    connector: Box<dyn PluginConnector>,
    sinks: Vec<SinkSlot>,
    settings: SchedulerSettings,
    status: StatusTracker,
    rpm: RpmMaxTracker,
    gate: EmissionGate,
    stop: StopSignal,
    stats: BridgeStats,
    sinks_closed: bool,
}

impl std::fmt::Debug for BridgeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeScheduler")
            .field("connector", &self.connector.describe())
            .field("sinks", &self.sinks.len())
            .field("settings", &self.settings)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl BridgeScheduler {
    pub fn new(connector: Box<dyn PluginConnector>, settings: SchedulerSettings) -> Self {
        Self {
            connector,
            sinks: Vec::new(),
            rpm: RpmMaxTracker::new(settings.publish_min_rpm),
            gate: EmissionGate::new(settings.emit_period),
            settings,
            status: StatusTracker::new(),
            stop: StopSignal::new(),
            stats: BridgeStats::default(),
            sinks_closed: false,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn TelemetrySink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn TelemetrySink>) {
        self.sinks.push(SinkSlot { sink, failures: 0 });
    }

    /// Share an existing stop signal, e.g. one wired to Ctrl-C.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Handle used to stop the loop from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Run until stopped. Sinks are closed on every exit path.
    ///
    /// Returns an error only for fatal conditions: configuration problems, or
    /// any source failure in fail-fast mode.
    pub fn run(&mut self) -> TelemetryResult<BridgeStats> {
        let result = self.run_loop();
        self.close_sinks();
        info!(
            sessions = self.stats.sessions,
            frames = self.stats.frames_emitted,
            failures = self.stats.source_failures,
            "bridge loop finished"
        );
        result.map(|()| self.stats.clone())
    }

    fn run_loop(&mut self) -> TelemetryResult<()> {
        self.emit_status(SessionState::Waiting, None);
        let mut failed_attempts: u64 = 0;

        while !self.stop.is_stopped() {
            let connection = match self.connector.connect() {
                Ok(connection) => connection,
                Err(e) if e.requires_reconnect() && !self.settings.fail_fast => {
                    self.stats.connect_failures = self.stats.connect_failures.saturating_add(1);
                    failed_attempts = failed_attempts.saturating_add(1);
                    if failed_attempts == 1 {
                        warn!(
                            source = %self.connector.describe(),
                            error = %e,
                            retry_in = ?self.settings.reconnect_delay,
                            "telemetry source unavailable; retrying"
                        );
                    } else {
                        debug!(source = %self.connector.describe(), attempt = failed_attempts, error = %e, "reconnect failed");
                    }
                    self.stop.wait_timeout(self.settings.reconnect_delay);
                    continue;
                }
                Err(e) => {
                    error!(source = %self.connector.describe(), error = %e, "cannot start telemetry source");
                    return Err(e);
                }
            };
            failed_attempts = 0;

            match self.run_session(connection) {
                SessionEnd::Stopped => break,
                SessionEnd::Lost(e) if self.settings.fail_fast => return Err(e),
                SessionEnd::Lost(_) => {}
            }
        }
        Ok(())
    }

    fn run_session(&mut self, connection: Connection) -> SessionEnd {
        let Connection {
            mut plugin,
            first_frame,
        } = connection;
        let source_id = plugin.id();
        let capabilities = plugin.capabilities();

        self.rpm.reset();
        self.gate.reset();
        self.stats.sessions = self.stats.sessions.saturating_add(1);
        info!(source_id, name = plugin.name(), "telemetry source active");
        self.emit_status(SessionState::Active, Some(source_id));
        self.publish(&CapabilitiesEvent::new(capabilities.clone()).into());

        let mut latest = first_frame.map(|frame| self.prepare(frame, &capabilities));
        let poll_interval = self.gate.poll_interval();

        let end = loop {
            if self.stop.is_stopped() {
                break SessionEnd::Stopped;
            }
            match plugin.read_frame() {
                Ok(Some(frame)) => {
                    let is_new = latest
                        .as_ref()
                        .is_none_or(|last: &TelemetryFrame| !last.same_sample_as(frame.timestamp));
                    if is_new {
                        latest = Some(self.prepare(frame, &capabilities));
                    }
                }
                Ok(None) => {}
                Err(e) => break SessionEnd::Lost(e),
            }

            if let Some(frame) = &latest
                && self.gate.try_emit(frame.timestamp, Instant::now())
            {
                self.record(frame);
            }

            if self.stop.wait_timeout(poll_interval) {
                break SessionEnd::Stopped;
            }
        };

        plugin.close();
        if let SessionEnd::Lost(e) = &end {
            self.stats.source_failures = self.stats.source_failures.saturating_add(1);
            warn!(source_id, error = %e, "telemetry source lost");
            self.emit_status(SessionState::Lost, Some(source_id));
            self.emit_status(SessionState::Waiting, None);
        }
        end
    }

    /// Derive signals and drop anything the capability map does not declare.
    fn prepare(&mut self, mut frame: TelemetryFrame, capabilities: &CapabilitySpec) -> TelemetryFrame {
        apply_rpm_derivation(&mut frame.signals, &mut self.rpm);
        let dropped = capabilities.retain_declared(&mut frame);
        if dropped > 0 {
            trace!(source_id = %frame.source_id, dropped, "undeclared signals removed");
        }
        frame
    }

    fn emit_status(&mut self, state: SessionState, source_id: Option<&str>) {
        if let Some(event) = self.status.transition(state, source_id) {
            debug!(%state, source_id, "status");
            self.publish(&event.into());
        }
    }

    fn publish(&mut self, event: &BridgeEvent) {
        for slot in &mut self.sinks {
            let result = slot.sink.publish_event(event);
            slot.report(result, "event");
        }
    }

    fn record(&mut self, frame: &TelemetryFrame) {
        self.stats.frames_emitted = self.stats.frames_emitted.saturating_add(1);
        for slot in &mut self.sinks {
            let result = slot.sink.record_frame(frame);
            slot.report(result, "frame");
        }
    }

    fn close_sinks(&mut self) {
        if self.sinks_closed {
            return;
        }
        self.sinks_closed = true;
        for slot in &mut self.sinks {
            let result = slot.sink.close();
            slot.report(result, "close");
        }
    }
}

impl Drop for BridgeScheduler {
    fn drop(&mut self) {
        self.close_sinks();
    }
}

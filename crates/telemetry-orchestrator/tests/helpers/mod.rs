//! Scripted sources and a recording sink for bridge loop tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use ssp_telemetry_adapters::SourcePlugin;
use ssp_telemetry_core::{
    BridgeEvent, CapabilitySpec, SessionState, TelemetryError, TelemetryFrame, TelemetryResult,
};
use ssp_telemetry_orchestrator::{Connection, PluginConnector, StopSignal};
use ssp_telemetry_sinks::{SinkResult, TelemetrySink};

pub const SCRIPTED_ID: &str = "scripted";

/// What a scripted plugin does once its frames are used up.
#[derive(Debug, Clone, Copy)]
pub enum Then {
    /// Fail with `Stale`, forcing a reconnection.
    Fail,
    /// Keep returning the last frame unchanged.
    Hold,
}

#[derive(Debug, Clone)]
pub struct SessionScript {
    pub frames: Vec<TelemetryFrame>,
    pub then: Then,
}

impl SessionScript {
    pub fn new(frames: Vec<TelemetryFrame>, then: Then) -> Self {
        Self { frames, then }
    }
}

struct ScriptedPlugin {
    pending: VecDeque<TelemetryFrame>,
    last: Option<TelemetryFrame>,
    then: Then,
    open: bool,
}

impl SourcePlugin for ScriptedPlugin {
    fn id(&self) -> &'static str {
        SCRIPTED_ID
    }

    fn name(&self) -> &'static str {
        "Scripted source"
    }

    fn open(&mut self) -> TelemetryResult<()> {
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> TelemetryResult<Option<TelemetryFrame>> {
        if let Some(frame) = self.pending.pop_front() {
            self.last = Some(frame.clone());
            return Ok(Some(frame));
        }
        match self.then {
            Then::Fail => Err(TelemetryError::stale(SCRIPTED_ID, "script finished")),
            Then::Hold => Ok(self.last.clone()),
        }
    }

    fn capabilities(&self) -> CapabilitySpec {
        CapabilitySpec::standard(SCRIPTED_ID, 60)
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Hands out one scripted session per connect, then stops the bridge.
pub struct ScriptedConnector {
    sessions: VecDeque<SessionScript>,
    stop: StopSignal,
}

impl ScriptedConnector {
    pub fn new(sessions: Vec<SessionScript>, stop: StopSignal) -> Self {
        Self {
            sessions: sessions.into(),
            stop,
        }
    }
}

impl PluginConnector for ScriptedConnector {
    fn describe(&self) -> String {
        SCRIPTED_ID.to_string()
    }

    fn connect(&mut self) -> TelemetryResult<Connection> {
        let Some(script) = self.sessions.pop_front() else {
            self.stop.stop();
            return Err(TelemetryError::not_available(SCRIPTED_ID, "no more sessions"));
        };
        let mut plugin = ScriptedPlugin {
            pending: script.frames.into(),
            last: None,
            then: script.then,
            open: false,
        };
        plugin.open()?;
        Ok(Connection {
            plugin: Box::new(plugin),
            first_frame: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub frames: Vec<TelemetryFrame>,
    pub events: Vec<BridgeEvent>,
    pub closed: u32,
}

impl Recorded {
    /// Status transitions as `(state, source)` pairs.
    pub fn statuses(&self) -> Vec<(SessionState, Option<String>)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                BridgeEvent::Status(status) => Some((status.state, status.source_id.clone())),
                BridgeEvent::Capabilities(_) => None,
            })
            .collect()
    }

    pub fn capabilities_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, BridgeEvent::Capabilities(_)))
            .count()
    }

    /// Event kinds in order, for sequence assertions.
    pub fn event_labels(&self) -> Vec<String> {
        self.events
            .iter()
            .map(|event| match event {
                BridgeEvent::Status(status) => match &status.source_id {
                    Some(source) => format!("{}:{source}", status.state),
                    None => status.state.to_string(),
                },
                BridgeEvent::Capabilities(caps) => format!("capabilities:{}", caps.source_id),
            })
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink(pub Arc<Mutex<Recorded>>);

impl TelemetrySink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn record_frame(&mut self, frame: &TelemetryFrame) -> SinkResult<()> {
        self.0.lock().frames.push(frame.clone());
        Ok(())
    }

    fn publish_event(&mut self, event: &BridgeEvent) -> SinkResult<()> {
        self.0.lock().events.push(event.clone());
        Ok(())
    }

    fn close(&mut self) -> SinkResult<()> {
        self.0.lock().closed += 1;
        Ok(())
    }
}

/// Hand-built AMS2 car-physics packet (559 bytes, packet type 0).
pub fn ams2_packet(rpm: u16, max_rpm: u16, speed_ms: f32, throttle: u8, gear_byte: u8) -> Vec<u8> {
    let mut pkt = vec![0u8; 559];
    put(&mut pkt, 30, &[throttle]);
    put(&mut pkt, 36, &speed_ms.to_le_bytes());
    put(&mut pkt, 40, &rpm.to_le_bytes());
    put(&mut pkt, 42, &max_rpm.to_le_bytes());
    put(&mut pkt, 45, &[gear_byte]);
    pkt
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    if let Some(slot) = buf.get_mut(offset..offset + bytes.len()) {
        slot.copy_from_slice(bytes);
    }
}

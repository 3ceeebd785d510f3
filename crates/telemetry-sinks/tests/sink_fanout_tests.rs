//! Fan-out of one session through every file-backed and live sink.

use ssp_telemetry_core::{
    BridgeEvent, CapabilitiesEvent, CapabilitySpec, EventKind, SessionState, StatusEvent,
    TelemetryFrame, signal,
};
use ssp_telemetry_sinks::{
    CapabilityExportSink, LiveBroadcaster, NdjsonSink, SESSION_FILE_NAME, TelemetrySink,
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn session_sinks(
    logs: &std::path::Path,
    live: &LiveBroadcaster,
) -> Result<Vec<Box<dyn TelemetrySink>>, Box<dyn std::error::Error>> {
    Ok(vec![
        Box::new(NdjsonSink::in_dir(logs)?),
        Box::new(live.clone()),
        Box::new(CapabilityExportSink::new(logs)),
    ])
}

#[test]
fn session_reaches_every_sink() -> TestResult {
    let dir = TempDir::new()?;
    let logs = dir.path().join("logs");
    let live = LiveBroadcaster::default();
    let mut watcher = live.subscribe();
    let mut sinks = session_sinks(&logs, &live)?;

    let events: [BridgeEvent; 2] = [
        StatusEvent::new(SessionState::Active, Some("ams2")).into(),
        CapabilitiesEvent::new(CapabilitySpec::standard("ams2", 60)).into(),
    ];
    let frame = TelemetryFrame::new("ams2", 10.0)
        .with_signal(signal::ENGINE_RPM, 5200)
        .with_signal(signal::DRIVETRAIN_GEAR, 3);

    for sink in &mut sinks {
        for event in &events {
            sink.publish_event(event)?;
        }
        sink.record_frame(&frame)?;
    }
    for sink in &mut sinks {
        sink.close()?;
    }

    let log = std::fs::read_to_string(logs.join(SESSION_FILE_NAME))?;
    assert_eq!(log.lines().count(), 1, "events never reach the session log");
    assert!(logs.join("capabilities.ams2.json").exists());

    let mut live_kinds = Vec::new();
    while let Ok(message) = watcher.live.try_recv() {
        let value: serde_json::Value = serde_json::from_str(&message)?;
        live_kinds.push(
            value
                .get("type")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("frame")
                .to_string(),
        );
    }
    assert_eq!(live_kinds, vec!["status", "capabilities", "frame"]);
    Ok(())
}

#[test]
fn late_joiner_sees_current_session_state() -> TestResult {
    let mut live = LiveBroadcaster::default();
    live.publish_event(&BridgeEvent::Status(StatusEvent {
        timestamp: 100.0,
        state: SessionState::Lost,
        source_id: Some("beamng".to_string()),
    }))?;
    live.publish_event(&BridgeEvent::Status(StatusEvent {
        timestamp: 100.5,
        state: SessionState::Waiting,
        source_id: None,
    }))?;
    live.record_frame(&TelemetryFrame::new("beamng", 99.0))?;

    let replay = live.subscribe().replay;
    let first = replay.first().ok_or("no sticky replay")?;
    insta::assert_snapshot!(first.to_string(), @r#"{"type":"status","ts":100.5,"state":"waiting","source":null}"#);
    assert_eq!(replay.len(), 1);
    match live.sticky(EventKind::Status) {
        Some(BridgeEvent::Status(status)) => {
            assert_eq!(status.state, SessionState::Waiting);
            assert_eq!(status.source_id, None);
        }
        other => return Err(format!("unexpected sticky status: {other:?}").into()),
    }
    assert!(live.sticky(EventKind::Capabilities).is_none());
    Ok(())
}

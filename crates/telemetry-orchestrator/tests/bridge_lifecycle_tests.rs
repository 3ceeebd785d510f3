//! Bridge loop lifecycle tests.
//!
//! Scripted sources exercise the session state machine, emission dedup and
//! derived signals deterministically; the AMS2 section drives the real UDP
//! source over loopback through a silence-induced reconnection.

mod helpers;

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use helpers::{RecordingSink, SCRIPTED_ID, ScriptedConnector, SessionScript, Then, ams2_packet};
use ssp_telemetry_adapters::{AssumeRunning, SourceOptions};
use ssp_telemetry_core::{SessionState, SignalValue, TelemetryFrame, signal};
use ssp_telemetry_orchestrator::{
    BridgeScheduler, BridgeStats, FixedConnector, PluginConnector, SchedulerSettings, StopSignal,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn fast_settings() -> SchedulerSettings {
    SchedulerSettings {
        emit_period: Duration::from_millis(1),
        reconnect_delay: Duration::from_millis(20),
        ..SchedulerSettings::default()
    }
}

fn frame(ts: f64, rpm: i64) -> TelemetryFrame {
    TelemetryFrame::new(SCRIPTED_ID, ts)
        .with_signal(signal::ENGINE_RPM, rpm)
        .with_signal(signal::DRIVETRAIN_GEAR, 2)
}

fn run_scripted(
    sessions: Vec<SessionScript>,
    sink: &RecordingSink,
) -> Result<BridgeStats, Box<dyn std::error::Error>> {
    let stop = StopSignal::new();
    let connector = ScriptedConnector::new(sessions, stop.clone());
    let mut scheduler = BridgeScheduler::new(Box::new(connector), fast_settings())
        .with_stop_signal(stop)
        .with_sink(Box::new(sink.clone()));
    Ok(scheduler.run()?)
}

fn approx(value: Option<&SignalValue>, expected: f64) -> bool {
    value
        .and_then(SignalValue::as_f64)
        .is_some_and(|v| (v - expected).abs() < 1e-9)
}

// ─── Session state machine ───────────────────────────────────────────────────

#[test]
fn failure_cycles_through_lost_and_waiting() -> TestResult {
    let sink = RecordingSink::default();
    let stats = run_scripted(
        vec![
            SessionScript::new(vec![frame(1.0, 4000), frame(2.0, 4100)], Then::Fail),
            SessionScript::new(vec![frame(3.0, 4200)], Then::Fail),
        ],
        &sink,
    )?;

    let recorded = sink.0.lock();
    assert_eq!(
        recorded.event_labels(),
        vec![
            "waiting",
            "active:scripted",
            "capabilities:scripted",
            "lost:scripted",
            "waiting",
            "active:scripted",
            "capabilities:scripted",
            "lost:scripted",
            "waiting",
        ]
    );
    assert_eq!(recorded.capabilities_count(), 2);
    assert_eq!(recorded.frames.len(), 3);
    assert_eq!(recorded.closed, 1);
    assert_eq!(stats.sessions, 2);
    assert_eq!(stats.source_failures, 2);
    Ok(())
}

#[test]
fn status_pairs_are_never_repeated() -> TestResult {
    let sink = RecordingSink::default();
    run_scripted(
        vec![
            SessionScript::new(vec![], Then::Fail),
            SessionScript::new(vec![], Then::Fail),
        ],
        &sink,
    )?;

    let statuses = sink.0.lock().statuses();
    for pair in statuses.windows(2) {
        if let [previous, next] = pair {
            assert_ne!(previous, next);
        }
    }
    assert_eq!(statuses.first(), Some(&(SessionState::Waiting, None)));
    Ok(())
}

// ─── Emission ────────────────────────────────────────────────────────────────

#[test]
fn unchanged_frame_is_emitted_once() -> TestResult {
    let sink = RecordingSink::default();
    let stop = StopSignal::new();
    let connector = ScriptedConnector::new(
        vec![SessionScript::new(vec![frame(7.0, 5000)], Then::Hold)],
        stop.clone(),
    );
    let mut scheduler = BridgeScheduler::new(Box::new(connector), fast_settings())
        .with_stop_signal(stop.clone())
        .with_sink(Box::new(sink.clone()));

    let runner = thread::spawn(move || scheduler.run());
    thread::sleep(Duration::from_millis(80));
    stop.stop();
    let stats = runner
        .join()
        .map_err(|panic| format!("bridge panicked: {panic:?}"))??;

    assert_eq!(stats.frames_emitted, 1);
    assert_eq!(sink.0.lock().frames.len(), 1);
    Ok(())
}

#[test]
fn stop_closes_sinks_promptly() -> TestResult {
    let sink = RecordingSink::default();
    let stop = StopSignal::new();
    let connector = ScriptedConnector::new(
        vec![SessionScript::new(vec![frame(1.0, 3000)], Then::Hold)],
        stop.clone(),
    );
    let mut scheduler = BridgeScheduler::new(
        Box::new(connector),
        SchedulerSettings {
            emit_period: Duration::from_millis(100),
            ..SchedulerSettings::default()
        },
    )
    .with_stop_signal(stop.clone())
    .with_sink(Box::new(sink.clone()));

    let runner = thread::spawn(move || scheduler.run());
    thread::sleep(Duration::from_millis(30));
    let stopped_at = Instant::now();
    stop.stop();
    runner
        .join()
        .map_err(|panic| format!("bridge panicked: {panic:?}"))??;

    assert!(stopped_at.elapsed() < Duration::from_millis(500));
    assert_eq!(sink.0.lock().closed, 1);
    Ok(())
}

// ─── Derived signals ─────────────────────────────────────────────────────────

#[test]
fn rpm_pct_appears_once_ceiling_is_believable() -> TestResult {
    let sink = RecordingSink::default();
    run_scripted(
        vec![SessionScript::new(
            vec![
                frame(1.0, 1000),
                frame(2.0, 2500),
                frame(3.0, 3200),
                frame(4.0, 1600),
            ],
            Then::Fail,
        )],
        &sink,
    )?;

    let recorded = sink.0.lock();
    let [first, second, third, fourth] = recorded.frames.as_slice() else {
        return Err(format!("expected 4 frames, got {}", recorded.frames.len()).into());
    };
    assert!(first.signal(signal::ENGINE_RPM_PCT).is_none());
    assert!(second.signal(signal::ENGINE_RPM_PCT).is_none());
    assert!(approx(third.signal(signal::ENGINE_RPM_PCT), 1.0));
    assert_eq!(third.signal(signal::ENGINE_RPM_MAX), Some(&SignalValue::Integer(3200)));
    assert!(approx(fourth.signal(signal::ENGINE_RPM_PCT), 0.5));
    assert_eq!(fourth.signal(signal::ENGINE_RPM), Some(&SignalValue::Integer(1600)));
    Ok(())
}

#[test]
fn vehicle_swap_resets_ceiling() -> TestResult {
    let sink = RecordingSink::default();
    run_scripted(
        vec![SessionScript::new(
            vec![
                frame(1.0, 7000).with_signal(signal::VEHICLE_CAR_ID, "scripted:0"),
                frame(2.0, 3500).with_signal(signal::VEHICLE_CAR_ID, "scripted:1"),
            ],
            Then::Fail,
        )],
        &sink,
    )?;

    let recorded = sink.0.lock();
    let last = recorded.frames.last().ok_or("no frames")?;
    assert_eq!(last.signal(signal::ENGINE_RPM_MAX), Some(&SignalValue::Integer(3500)));
    assert!(approx(last.signal(signal::ENGINE_RPM_PCT), 1.0));
    Ok(())
}

#[test]
fn undeclared_signals_are_removed() -> TestResult {
    let sink = RecordingSink::default();
    run_scripted(
        vec![SessionScript::new(
            vec![frame(1.0, 4000).with_signal("engine.oil_temp_c", 96.5)],
            Then::Fail,
        )],
        &sink,
    )?;

    let recorded = sink.0.lock();
    let emitted = recorded.frames.first().ok_or("no frames")?;
    assert!(emitted.signal("engine.oil_temp_c").is_none());
    assert!(emitted.signal(signal::ENGINE_RPM).is_some());
    Ok(())
}

// ─── AMS2 over loopback ──────────────────────────────────────────────────────

fn send_for(socket: &UdpSocket, target: SocketAddr, duration: Duration) -> std::io::Result<()> {
    let packet = ams2_packet(6200, 8000, 30.0, 180, 0x63);
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        socket.send_to(&packet, target)?;
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}

#[test]
fn udp_silence_triggers_reconnect_cycle() -> TestResult {
    let port = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?.local_addr()?.port();
    let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let options = SourceOptions {
        bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        ams2_port: port,
        beamng_port: 0,
        process_query: Arc::new(AssumeRunning),
    };
    let connector = FixedConnector::new("ams2", options)?;
    assert_eq!(connector.describe(), "ams2");

    let sink = RecordingSink::default();
    let stop = StopSignal::new();
    let mut scheduler = BridgeScheduler::new(
        Box::new(connector),
        SchedulerSettings {
            emit_period: Duration::from_secs_f64(1.0 / 60.0),
            reconnect_delay: Duration::from_millis(100),
            ..SchedulerSettings::default()
        },
    )
    .with_stop_signal(stop.clone())
    .with_sink(Box::new(sink.clone()));
    let runner = thread::spawn(move || scheduler.run());

    let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
    send_for(&sender, target, Duration::from_millis(900))?;
    thread::sleep(Duration::from_secs(3));
    send_for(&sender, target, Duration::from_millis(1500))?;

    stop.stop();
    let stats = runner
        .join()
        .map_err(|panic| format!("bridge panicked: {panic:?}"))??;

    let recorded = sink.0.lock();
    assert_eq!(
        recorded.event_labels(),
        vec![
            "waiting",
            "active:ams2",
            "capabilities:ams2",
            "lost:ams2",
            "waiting",
            "active:ams2",
            "capabilities:ams2",
        ]
    );
    assert_eq!(stats.sessions, 2);
    assert!(!recorded.frames.is_empty());
    let gear = recorded
        .frames
        .first()
        .and_then(|f| f.signal(signal::DRIVETRAIN_GEAR).cloned());
    assert_eq!(gear, Some(SignalValue::Integer(3)));
    Ok(())
}

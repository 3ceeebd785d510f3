//! `ssp-bridge run`: the long-running bridge.
//!
//! The bridge loop is synchronous and owns its sinks, so it runs on a
//! blocking thread. The WebSocket server runs on the async runtime and shares
//! the broadcaster with the loop. Ctrl-C stops the loop; the server is shut
//! down once the loop has closed every sink.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ssp_telemetry_orchestrator::{
    BridgeConfig, BridgeScheduler, SchedulerSettings, StopSignal, connector_from_config,
};
use ssp_telemetry_sinks::{CapabilityExportSink, LiveBroadcaster, NdjsonSink, SerialLineSink};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::commands::RunArgs;
use crate::error::CliError;

const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Load the config file (if any), apply flag overrides and validate.
pub fn resolve_config(args: &RunArgs) -> Result<BridgeConfig, CliError> {
    let mut config = BridgeConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

pub async fn execute(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let connector = connector_from_config(&config).map_err(CliError::from)?;

    let address = config.ws_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| CliError::ServerBind {
            address: address.clone(),
            source,
        })?;

    let broadcaster = LiveBroadcaster::default();
    let session_log = NdjsonSink::in_dir(&config.logs_dir).with_context(|| {
        format!("Failed to open session log in {}", config.logs_dir.display())
    })?;
    let mut scheduler =
        BridgeScheduler::new(connector, SchedulerSettings::from_config(&config))
            .with_sink(Box::new(session_log))
            .with_sink(Box::new(broadcaster.clone()))
            .with_sink(Box::new(CapabilityExportSink::new(&config.logs_dir)));
    if let Some(serial) = &config.serial {
        scheduler.add_sink(Box::new(SerialLineSink::open(&serial.settings())));
    }

    let shutdown = Arc::new(Notify::new());
    let server_shutdown = Arc::clone(&shutdown);
    let mut server = tokio::spawn(
        broadcaster.serve(listener, async move { server_shutdown.notified().await }),
    );

    spawn_interrupt_handler(scheduler.stop_signal());
    info!(
        game = %config.game,
        hz = config.hz,
        ws = %format!("ws://{address}/"),
        logs_dir = %config.logs_dir.display(),
        "bridge started"
    );

    let outcome = tokio::task::spawn_blocking(move || scheduler.run())
        .await
        .context("bridge loop panicked")?;

    shutdown.notify_one();
    match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, &mut server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "WebSocket server failed"),
        Ok(Err(e)) => warn!(error = %e, "WebSocket server task failed"),
        Err(_elapsed) => {
            warn!("WebSocket clients did not disconnect in time; closing server");
            server.abort();
        }
    }

    let stats = outcome.map_err(CliError::from)?;
    info!(
        sessions = stats.sessions,
        frames = stats.frames_emitted,
        source_failures = stats.source_failures,
        connect_failures = stats.connect_failures,
        "bridge stopped"
    );
    Ok(())
}

fn spawn_interrupt_handler(stop: StopSignal) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping bridge");
                stop.stop();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C; stop the process externally"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn flags_win_over_file() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("bridge.yaml");
        std::fs::write(&path, "game: ams2\nhz: 30\nws_port: 9001\n")?;

        let args = RunArgs {
            config: Some(path),
            ws_port: Some(9002),
            ..RunArgs::default()
        };
        let config = resolve_config(&args)?;
        assert_eq!(config.game, "ams2");
        assert_eq!(config.ws_port, 9002);
        assert!((config.hz - 30.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn invalid_override_is_rejected_before_start() {
        let args = RunArgs {
            hz: Some(0.0),
            ..RunArgs::default()
        };
        assert!(matches!(
            resolve_config(&args),
            Err(CliError::InvalidConfiguration(_))
        ));

        let args = RunArgs {
            game: Some("rfactor2".to_string()),
            ..RunArgs::default()
        };
        let err = resolve_config(&args).err();
        assert!(matches!(err, Some(CliError::InvalidConfiguration(ref m)) if m.contains("rfactor2")));
    }

    #[test]
    fn missing_config_file_is_invalid_configuration() {
        let args = RunArgs {
            config: Some("/nonexistent/ssp-bridge.yaml".into()),
            ..RunArgs::default()
        };
        assert!(matches!(
            resolve_config(&args),
            Err(CliError::InvalidConfiguration(_))
        ));
    }
}

//! ssp-bridge - simulator telemetry bridge
//!
//! Reads live telemetry from a racing simulator, normalizes it into SSP
//! frames and streams them to an NDJSON session log, WebSocket clients and
//! an optional serial device.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{CapabilitiesArgs, RunArgs};
use crate::error::CliError;

/// Crates whose log level follows `-v`.
const LOG_TARGETS: [&str; 5] = [
    "ssp_bridge",
    "ssp_telemetry_core",
    "ssp_telemetry_adapters",
    "ssp_telemetry_sinks",
    "ssp_telemetry_orchestrator",
];

#[derive(Parser)]
#[command(name = "ssp-bridge")]
#[command(about = "Stream normalized simulator telemetry to files, WebSocket clients and serial devices")]
#[command(version)]
#[command(long_about = "
ssp-bridge reads live telemetry from Assetto Corsa, Assetto Corsa Competizione,
Automobilista 2 and BeamNG.drive, normalizes it into SSP frames and fans it out
to an NDJSON session log, a WebSocket stream and an optional serial device.

The bridge never exits on its own when a game closes: it reports the session
as lost and waits for the game to come back.
")]
struct Cli {
    /// Output format for `plugins` and `capabilities`
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until interrupted
    Run(RunArgs),

    /// List registered telemetry sources in probe order
    Plugins,

    /// Write the capability document of one source
    Capabilities(CapabilitiesArgs),
}

fn log_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_logging(verbose: u8) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter(verbose).into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute_command(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Plugins => commands::plugins::execute(cli.json),
        Commands::Capabilities(args) => commands::capabilities::execute(args, cli.json),
    }
}

fn print_error(error: &anyhow::Error) {
    eprintln!("Error: {error}");
    for cause in error.chain().skip(1) {
        eprintln!("  Caused by: {cause}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn run_defaults_to_config_values() -> TestResult {
        let cli = Cli::try_parse_from(["ssp-bridge", "run"])?;
        assert!(!cli.json);
        assert_eq!(cli.verbose, 0);
        let Commands::Run(args) = cli.command else {
            return Err("expected run".into());
        };
        assert!(args.game.is_none());
        assert!(args.hz.is_none());
        assert!(!args.fail_fast);
        Ok(())
    }

    #[test]
    fn run_accepts_every_override() -> TestResult {
        let cli = Cli::try_parse_from([
            "ssp-bridge",
            "run",
            "--config",
            "bridge.yaml",
            "--game",
            "auto",
            "--hz",
            "30",
            "--ws-host",
            "0.0.0.0",
            "--ws-port",
            "9000",
            "--logs-dir",
            "/tmp/ssp",
            "--serial-port",
            "COM3",
            "--serial-baud",
            "57600",
            "--serial-rate",
            "20",
            "--reconnect-delay-ms",
            "500",
            "--fail-fast",
        ])?;
        let Commands::Run(args) = cli.command else {
            return Err("expected run".into());
        };
        assert_eq!(args.game.as_deref(), Some("auto"));
        assert_eq!(args.ws_port, Some(9000));
        assert_eq!(args.serial_port.as_deref(), Some("COM3"));
        assert_eq!(args.serial_baud, Some(57_600));
        assert_eq!(args.serial_rate, Some(20));
        assert_eq!(args.reconnect_delay_ms, Some(500));
        assert!(args.fail_fast);
        Ok(())
    }

    #[test]
    fn negative_serial_rate_is_a_parse_error() {
        let result = Cli::try_parse_from(["ssp-bridge", "run", "--serial-rate", "-5"]);
        assert!(result.is_err());
    }

    #[test]
    fn capabilities_requires_game() -> TestResult {
        assert!(Cli::try_parse_from(["ssp-bridge", "capabilities"]).is_err());

        let cli = Cli::try_parse_from(["ssp-bridge", "capabilities", "--game", "ams2"])?;
        let Commands::Capabilities(args) = cli.command else {
            return Err("expected capabilities".into());
        };
        assert_eq!(args.game, "ams2");
        assert_eq!(args.out, std::path::PathBuf::from("logs"));
        Ok(())
    }

    #[test]
    fn verbosity_is_global_and_counted() -> TestResult {
        let cli = Cli::try_parse_from(["ssp-bridge", "plugins", "-vv", "--json"])?;
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Plugins));
        Ok(())
    }

    #[test]
    fn filter_covers_bridge_crates() {
        let filter = log_filter(1);
        assert!(filter.contains("ssp_telemetry_orchestrator=info"));
        assert!(filter.contains("ssp_bridge=info"));
        assert_eq!(log_filter(9).matches("=trace").count(), LOG_TARGETS.len());
    }
}

//! `ssp-bridge capabilities`: write one plugin's capability document.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;
use ssp_telemetry_adapters::{SourceOptions, create_plugin};
use ssp_telemetry_sinks::write_capabilities;

use crate::commands::CapabilitiesArgs;
use crate::error::CliError;

pub fn execute(args: &CapabilitiesArgs, json: bool) -> Result<()> {
    let path = export(&args.game, &args.out)?;
    if json {
        println!("{}", json!({ "success": true, "path": path }));
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

/// Build the plugin (without opening it) and write its capability map.
fn export(game: &str, out: &Path) -> Result<PathBuf> {
    let plugin = create_plugin(game, &SourceOptions::default()).map_err(CliError::from)?;
    let spec = plugin.capabilities();
    write_capabilities(out, &spec)
        .with_context(|| format!("Failed to write capabilities to {}", out.display()))
}

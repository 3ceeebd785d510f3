//! Capability documents for external tooling.
//!
//! Each (re)connection rewrites `capabilities.{plugin}.json` in the logs
//! directory. The file is metadata only and not part of the live stream.

use std::path::{Path, PathBuf};

use ssp_telemetry_core::{BridgeEvent, CapabilitySpec, TelemetryFrame};
use tracing::info;

use crate::{SinkResult, TelemetrySink};

pub fn capabilities_path(dir: &Path, plugin_id: &str) -> PathBuf {
    dir.join(format!("capabilities.{plugin_id}.json"))
}

/// Write `spec` as indented JSON into `dir` and return the file path.
pub fn write_capabilities(dir: &Path, spec: &CapabilitySpec) -> SinkResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = capabilities_path(dir, &spec.plugin_id);
    let mut text = serde_json::to_string_pretty(spec)?;
    text.push('\n');
    std::fs::write(&path, text)?;
    Ok(path)
}

/// Sink that exports the capability map carried by every capabilities event.
#[derive(Debug)]
pub struct CapabilityExportSink {
    dir: PathBuf,
    last_written: Option<PathBuf>,
}

impl CapabilityExportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_written: None,
        }
    }

    pub fn last_written(&self) -> Option<&Path> {
        self.last_written.as_deref()
    }
}

impl TelemetrySink for CapabilityExportSink {
    fn name(&self) -> &'static str {
        "capabilities"
    }

    fn record_frame(&mut self, _frame: &TelemetryFrame) -> SinkResult<()> {
        Ok(())
    }

    fn publish_event(&mut self, event: &BridgeEvent) -> SinkResult<()> {
        if let BridgeEvent::Capabilities(event) = event {
            let path = write_capabilities(&self.dir, &event.capabilities)?;
            info!(source_id = %event.source_id, path = %path.display(), "capabilities exported");
            self.last_written = Some(path);
        }
        Ok(())
    }
}

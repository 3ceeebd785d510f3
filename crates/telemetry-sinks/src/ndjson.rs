//! Append-only NDJSON session log.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ssp_telemetry_core::TelemetryFrame;
use tracing::debug;

use crate::{SinkError, SinkResult, TelemetrySink};

/// File name of the session log inside the logs directory.
pub const SESSION_FILE_NAME: &str = "session.ndjson";

/// Writes one compact JSON frame per line, flushed per line.
#[derive(Debug)]
pub struct NdjsonSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    lines_written: u64,
}

impl NdjsonSink {
    /// Open `path` in append mode, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> SinkResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "NDJSON session log opened");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            lines_written: 0,
        })
    }

    /// Open `session.ndjson` inside `logs_dir`.
    pub fn in_dir(logs_dir: &Path) -> SinkResult<Self> {
        Self::open(logs_dir.join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

impl TelemetrySink for NdjsonSink {
    fn name(&self) -> &'static str {
        "ndjson"
    }

    fn record_frame(&mut self, frame: &TelemetryFrame) -> SinkResult<()> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed("ndjson"))?;
        serde_json::to_writer(&mut *writer, frame)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        self.lines_written = self.lines_written.saturating_add(1);
        Ok(())
    }

    fn flush(&mut self) -> SinkResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> SinkResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

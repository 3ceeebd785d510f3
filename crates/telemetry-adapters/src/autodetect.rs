//! Auto-detection: probe candidate sources and keep the one that is live.
//!
//! At most one candidate is open at any time; every loser is closed before
//! the next candidate is tried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ssp_telemetry_core::{TelemetryError, TelemetryFrame, TelemetryResult};
use tracing::{debug, info, warn};

use crate::plugin::SourcePlugin;
use crate::process::{ProcessQuery, ProcessSnapshot};

pub const DEFAULT_PROBE_WINDOW: Duration = Duration::from_millis(800);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(20);

/// Executables that identify one plugin (lower case).
pub const PROCESS_HINTS: [(&str, &str); 4] = [
    ("ac2-win64-shipping.exe", "acc"),
    ("acs.exe", "ac"),
    ("assettocorsa.exe", "ac"),
    ("beamng.drive.x64.exe", "beamng"),
];

/// The winning plugin, already open.
pub struct Detection {
    pub plugin: Box<dyn SourcePlugin>,
    /// Frame read during the probe, if the win came from live data.
    pub first_frame: Option<TelemetryFrame>,
}

impl std::fmt::Debug for Detection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detection")
            .field("plugin", &self.plugin.id())
            .field("first_frame", &self.first_frame.is_some())
            .finish()
    }
}

pub struct AutoDetector {
    probe_window: Duration,
    probe_interval: Duration,
    process_query: Arc<dyn ProcessQuery>,
}

impl std::fmt::Debug for AutoDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoDetector")
            .field("probe_window", &self.probe_window)
            .field("probe_interval", &self.probe_interval)
            .finish_non_exhaustive()
    }
}

impl AutoDetector {
    pub fn new(process_query: Arc<dyn ProcessQuery>) -> Self {
        Self {
            probe_window: DEFAULT_PROBE_WINDOW,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            process_query,
        }
    }

    #[must_use]
    pub fn with_probe_window(mut self, window: Duration) -> Self {
        self.probe_window = window;
        self
    }

    #[must_use]
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Plugin ids hinted by the running processes, in hint-table order.
    pub fn hinted_ids(snapshot: &ProcessSnapshot) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = Vec::new();
        for (image, id) in PROCESS_HINTS {
            if snapshot.contains(image) && !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    fn process_hints(&self) -> Vec<&'static str> {
        match self.process_query.running_images() {
            Ok(snapshot) => Self::hinted_ids(&snapshot),
            Err(e) => {
                debug!(error = %e, "process snapshot unavailable; probing without hints");
                Vec::new()
            }
        }
    }

    /// Probe `candidates` (already in priority order) and return the winner.
    pub fn detect(&self, candidates: Vec<Box<dyn SourcePlugin>>) -> TelemetryResult<Detection> {
        let hints = self.process_hints();
        let (mut ordered, rest): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|plugin| hints.contains(&plugin.id()));
        ordered.extend(rest);

        let mut attempts = Vec::with_capacity(ordered.len());
        for mut plugin in ordered {
            let id = plugin.id();
            if let Err(e) = plugin.open() {
                debug!(source_id = id, error = %e, "auto-detect: open failed");
                plugin.close();
                attempts.push(format!("{id}: {e}"));
                continue;
            }

            if hints.contains(&id) {
                info!(source_id = id, "auto-detect: simulator process running, accepting");
                return Ok(Detection {
                    plugin,
                    first_frame: None,
                });
            }

            match self.probe(plugin.as_mut()) {
                Ok(Some(frame)) => {
                    info!(source_id = id, "auto-detect: live telemetry found");
                    return Ok(Detection {
                        plugin,
                        first_frame: Some(frame),
                    });
                }
                Ok(None) => {
                    plugin.close();
                    attempts.push(format!(
                        "{id}: no frames within {}ms",
                        self.probe_window.as_millis()
                    ));
                }
                Err(e) => {
                    plugin.close();
                    attempts.push(format!("{id}: {e}"));
                }
            }
        }

        warn!(attempts = attempts.len(), "auto-detect found no live source");
        Err(TelemetryError::AutoDetectFailed { attempts })
    }

    /// Poll an open plugin until it yields a frame or the window closes.
    fn probe(&self, plugin: &mut dyn SourcePlugin) -> TelemetryResult<Option<TelemetryFrame>> {
        let deadline = Instant::now() + self.probe_window;
        loop {
            if let Some(frame) = plugin.read_frame()? {
                return Ok(Some(frame));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(self.probe_interval.min(deadline.saturating_duration_since(now)));
        }
    }
}

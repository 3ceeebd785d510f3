//! Process presence queries used by the process-liveness watchdog and by
//! auto-detect hints.

use std::collections::HashSet;
use std::sync::Arc;

use sysinfo::{ProcessesToUpdate, System};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessQueryError {
    #[error("process list unavailable: {0}")]
    Unavailable(String),
}

/// Lower-cased image names of the running processes.
pub type ProcessSnapshot = HashSet<String>;

/// Lists running process images. Implementations must be cheap enough to
/// call a few times per second.
pub trait ProcessQuery: Send + Sync {
    fn running_images(&self) -> Result<ProcessSnapshot, ProcessQueryError>;

    fn is_running(&self, image_name: &str) -> Result<bool, ProcessQueryError> {
        Ok(self
            .running_images()?
            .contains(&image_name.to_ascii_lowercase()))
    }
}

/// Process list backed by `sysinfo`.
#[derive(Debug, Default)]
pub struct SystemProcessQuery {
    system: parking_lot::Mutex<System>,
}

impl SystemProcessQuery {
    pub fn new() -> Self {
        Self {
            system: parking_lot::Mutex::new(System::new()),
        }
    }
}

impl ProcessQuery for SystemProcessQuery {
    fn running_images(&self) -> Result<ProcessSnapshot, ProcessQueryError> {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let images: ProcessSnapshot = system
            .processes()
            .values()
            .map(|process| process.name().to_string_lossy().to_ascii_lowercase())
            .collect();
        // An empty table means the query itself failed; some process (us) always exists.
        if images.is_empty() {
            return Err(ProcessQueryError::Unavailable(
                "empty process table".to_string(),
            ));
        }
        Ok(images)
    }
}

/// Query for platforms without a meaningful simulator process list:
/// every image is reported as running.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeRunning;

impl ProcessQuery for AssumeRunning {
    fn running_images(&self) -> Result<ProcessSnapshot, ProcessQueryError> {
        Ok(ProcessSnapshot::new())
    }

    fn is_running(&self, _image_name: &str) -> Result<bool, ProcessQueryError> {
        Ok(true)
    }
}

/// Platform default: the real process list on Windows, [`AssumeRunning`]
/// elsewhere since the supported simulators are Windows-only.
pub fn default_process_query() -> Arc<dyn ProcessQuery> {
    if cfg!(windows) {
        Arc::new(SystemProcessQuery::new())
    } else {
        Arc::new(AssumeRunning)
    }
}

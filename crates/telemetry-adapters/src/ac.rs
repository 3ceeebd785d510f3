//! Assetto Corsa via the `acpmf_physics` shared-memory page.
//!
//! The mapping outlives the game, so a page that is neither advancing nor
//! alive for longer than the grace period is treated as a leftover from a
//! previous session and forces a reconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ssp_telemetry_core::{
    CapabilitySpec, TelemetryError, TelemetryFrame, TelemetryResult, unix_timestamp,
};
use tracing::{debug, info};

use crate::decode::{PlausibilityFilter, Verdict};
use crate::physics_page::{PHYSICS_MAPPINGS, PhysicsPage};
use crate::plugin::{DEFAULT_SAMPLE_HZ, SourcePlugin};
use crate::process::ProcessQuery;
use crate::shm::SharedMemoryView;
use crate::watchdog::{ProcessWatch, SequenceStallWatchdog};

pub const AC_PROCESS: &str = "acs.exe";
const READ_PREFIX: usize = 128;
const STALL_GRACE: Duration = Duration::from_secs(2);

/// Physics page to canonical frame; also used by the ACC source.
pub(crate) fn physics_frame(source_id: &str, page: &PhysicsPage, timestamp: f64) -> TelemetryFrame {
    page.core_sample().to_frame(source_id, timestamp)
}

pub struct AssettoCorsaSource {
    view: Option<SharedMemoryView>,
    process: ProcessWatch,
    stall: SequenceStallWatchdog,
    filter: PlausibilityFilter,
    sample_ts: f64,
}

impl AssettoCorsaSource {
    pub const ID: &'static str = "ac";

    pub fn new(process_query: Arc<dyn ProcessQuery>) -> Self {
        Self {
            view: None,
            process: ProcessWatch::new(AC_PROCESS, process_query),
            stall: SequenceStallWatchdog::new(STALL_GRACE),
            filter: PlausibilityFilter::STANDARD,
            sample_ts: 0.0,
        }
    }

    /// Evaluate one physics prefix read at `now`.
    fn process_page(&mut self, data: &[u8], now: Instant) -> TelemetryResult<Option<TelemetryFrame>> {
        let Some(page) = PhysicsPage::parse(data) else {
            return Ok(None);
        };

        if self.stall.observe(i64::from(page.packet_id), now) {
            self.sample_ts = unix_timestamp();
        }

        if page.verdict(&self.filter) != Verdict::Alive {
            if self.stall.is_stalled(now) {
                return Err(TelemetryError::stale(
                    Self::ID,
                    "packetId not advancing; mapping left over from a previous session",
                ));
            }
            return Ok(None);
        }

        Ok(Some(physics_frame(Self::ID, &page, self.sample_ts)))
    }
}

impl SourcePlugin for AssettoCorsaSource {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Assetto Corsa"
    }

    fn open(&mut self) -> TelemetryResult<()> {
        self.close();
        let view = SharedMemoryView::open(Self::ID, &PHYSICS_MAPPINGS, READ_PREFIX)?;
        info!(mapping = view.name(), "Connected to Assetto Corsa shared memory");
        self.view = Some(view);
        self.stall.reset();
        self.process.reset();
        Ok(())
    }

    fn read_frame(&mut self) -> TelemetryResult<Option<TelemetryFrame>> {
        let now = Instant::now();
        if !self.process.running_at(now) {
            return Err(TelemetryError::source_lost(Self::ID, "acs.exe is no longer running"));
        }
        let data = match &self.view {
            Some(view) => view.read_prefix(READ_PREFIX),
            None => return Err(TelemetryError::not_available(Self::ID, "source is not open")),
        };
        self.process_page(&data, now)
    }

    fn capabilities(&self) -> CapabilitySpec {
        CapabilitySpec::standard(Self::ID, DEFAULT_SAMPLE_HZ)
    }

    fn close(&mut self) {
        if self.view.take().is_some() {
            debug!("Assetto Corsa shared memory released");
        }
        self.stall.reset();
    }

    fn is_open(&self) -> bool {
        self.view.is_some()
    }
}

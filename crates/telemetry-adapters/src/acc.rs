//! Assetto Corsa Competizione via the AC-family shared-memory pages.
//!
//! The physics page is polled every read; the static page (car model and
//! rev limit) is re-read on a slower cadence. ACC leaves the physics page
//! frozen in menus and pauses, so a stalled page is "no data", never a
//! failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ssp_telemetry_core::{
    CapabilitySpec, SignalSpec, SignalType, TelemetryError, TelemetryFrame, TelemetryResult,
    VehicleInfo, round_to, signal, unix_timestamp,
};
use tracing::{debug, info};

use crate::ac::physics_frame;
use crate::decode::{PlausibilityFilter, Verdict};
use crate::physics_page::{
    PHYSICS_MAPPINGS, PhysicsPage, STATIC_MAPPINGS, STATIC_MIN_LEN, StaticPage,
};
use crate::plugin::{DEFAULT_SAMPLE_HZ, SourcePlugin};
use crate::shm::SharedMemoryView;
use crate::watchdog::SequenceStallWatchdog;

const READ_PREFIX: usize = 256;
const STALL_GRACE: Duration = Duration::from_secs(6);
const STATIC_INTERVAL_UNKNOWN: Duration = Duration::from_millis(150);
const STATIC_INTERVAL_KNOWN: Duration = Duration::from_millis(500);

/// Car identity and rev limit from the static page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct StaticInfo {
    car_model: Option<String>,
    max_rpm: Option<i32>,
}

impl StaticInfo {
    /// Merge a fresh static page. A new car model forgets the old rev limit.
    fn update(&mut self, page: &StaticPage) {
        if !page.car_model.is_empty() && self.car_model.as_deref() != Some(&page.car_model) {
            debug!(car_model = %page.car_model, "ACC car model changed");
            self.car_model = Some(page.car_model.clone());
            self.max_rpm = None;
        }
        if let Some(max_rpm) = page.plausible_max_rpm() {
            self.max_rpm = Some(max_rpm);
        }
    }
}

pub struct AccSource {
    physics: Option<SharedMemoryView>,
    static_page: Option<SharedMemoryView>,
    stall: SequenceStallWatchdog,
    filter: PlausibilityFilter,
    info: StaticInfo,
    static_read_at: Option<Instant>,
    sample_ts: f64,
}

impl Default for AccSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AccSource {
    pub const ID: &'static str = "acc";

    pub fn new() -> Self {
        Self {
            physics: None,
            static_page: None,
            stall: SequenceStallWatchdog::new(STALL_GRACE),
            filter: PlausibilityFilter::STANDARD,
            info: StaticInfo::default(),
            static_read_at: None,
            sample_ts: 0.0,
        }
    }

    fn static_due(&self, now: Instant) -> bool {
        let interval = if self.info.max_rpm.is_some() {
            STATIC_INTERVAL_KNOWN
        } else {
            STATIC_INTERVAL_UNKNOWN
        };
        self.static_read_at
            .is_none_or(|read_at| now.saturating_duration_since(read_at) >= interval)
    }

    fn refresh_static(&mut self, now: Instant) {
        if !self.static_due(now) {
            return;
        }
        self.static_read_at = Some(now);
        let Some(view) = &self.static_page else {
            return;
        };
        // An unreadable static page keeps the previous identity.
        if let Some(page) = StaticPage::parse(&view.read_prefix(STATIC_MIN_LEN)) {
            self.info.update(&page);
        }
    }

    fn process_page(&mut self, data: &[u8], now: Instant) -> Option<TelemetryFrame> {
        let page = PhysicsPage::parse(data)?;

        if self.stall.observe(i64::from(page.packet_id), now) {
            self.sample_ts = unix_timestamp();
        }

        if page.verdict(&self.filter) != Verdict::Alive {
            if self.stall.is_stalled(now) {
                debug!(packet_id = page.packet_id, "ACC physics page stalled (menu or pause)");
            }
            return None;
        }

        let mut frame = physics_frame(Self::ID, &page, self.sample_ts);
        if let Some(model) = &self.info.car_model {
            frame.insert_signal(signal::VEHICLE_CAR_ID, model.as_str());
            frame = frame.with_vehicle(VehicleInfo {
                name: Some(model.clone()),
                class: None,
            });
        }
        if let Some(max_rpm) = self.info.max_rpm {
            let ratio = (f64::from(page.rpm) / f64::from(max_rpm)).clamp(0.0, 1.0);
            frame.insert_signal(signal::ENGINE_RPM_MAX, max_rpm);
            frame.insert_signal(signal::ENGINE_RPM_PCT, round_to(ratio, 3));
        }
        Some(frame)
    }
}

impl SourcePlugin for AccSource {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "Assetto Corsa Competizione"
    }

    fn open(&mut self) -> TelemetryResult<()> {
        self.close();
        let physics = SharedMemoryView::open(Self::ID, &PHYSICS_MAPPINGS, READ_PREFIX)?;
        info!(mapping = physics.name(), "Connected to ACC shared memory");
        // The static page is optional; without it frames carry no identity.
        self.static_page = match SharedMemoryView::open(Self::ID, &STATIC_MAPPINGS, STATIC_MIN_LEN)
        {
            Ok(view) => Some(view),
            Err(e) => {
                debug!(error = %e, "ACC static page unavailable");
                None
            }
        };
        self.physics = Some(physics);
        Ok(())
    }

    fn read_frame(&mut self) -> TelemetryResult<Option<TelemetryFrame>> {
        let now = Instant::now();
        let data = match &self.physics {
            Some(view) => view.read_prefix(READ_PREFIX),
            None => return Err(TelemetryError::not_available(Self::ID, "source is not open")),
        };
        self.refresh_static(now);
        Ok(self.process_page(&data, now))
    }

    fn capabilities(&self) -> CapabilitySpec {
        CapabilitySpec::standard(Self::ID, DEFAULT_SAMPLE_HZ).with_signal(
            signal::ENGINE_RPM_MAX,
            SignalSpec::new(SignalType::Integer, "rpm", DEFAULT_SAMPLE_HZ)
                .range(1000.0, 25_000.0)
                .description("Rev limit reported by the static page"),
        )
    }

    fn close(&mut self) {
        if self.physics.take().is_some() {
            debug!("ACC shared memory released");
        }
        self.static_page = None;
        self.stall.reset();
        self.info = StaticInfo::default();
        self.static_read_at = None;
    }

    fn is_open(&self) -> bool {
        self.physics.is_some()
    }
}

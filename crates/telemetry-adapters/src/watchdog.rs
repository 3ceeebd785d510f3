//! Liveness watchdogs shared by the sources.
//!
//! - [`SequenceStallWatchdog`] - a producer sequence counter that stops moving
//! - [`ProcessWatch`] - the owning simulator process disappearing
//! - [`IdleEpochTracker`] - idle-to-active transitions used as an implicit
//!   vehicle identity by sources that do not report one

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::process::ProcessQuery;

/// Tracks when a monotonically updated sequence counter last changed.
#[derive(Debug, Clone)]
pub struct SequenceStallWatchdog {
    grace: Duration,
    last_seq: Option<i64>,
    last_change: Option<Instant>,
}

impl SequenceStallWatchdog {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            last_seq: None,
            last_change: None,
        }
    }

    /// Record the counter value read at `now`. Returns true when it moved.
    pub fn observe(&mut self, seq: i64, now: Instant) -> bool {
        if self.last_seq == Some(seq) {
            return false;
        }
        self.last_seq = Some(seq);
        self.last_change = Some(now);
        true
    }

    /// Time since the counter last changed; `None` before the first sample.
    pub fn stalled_for(&self, now: Instant) -> Option<Duration> {
        self.last_change
            .map(|changed| now.saturating_duration_since(changed))
    }

    pub fn is_stalled(&self, now: Instant) -> bool {
        self.stalled_for(now)
            .is_some_and(|elapsed| elapsed > self.grace)
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn reset(&mut self) {
        self.last_seq = None;
        self.last_change = None;
    }
}

pub const PROCESS_CACHE_TTL: Duration = Duration::from_millis(750);
pub const PROCESS_MISS_THRESHOLD: u32 = 3;

/// Cached, debounced "is the simulator still running" check.
///
/// The process list is consulted at most once per cache period, and the
/// process is only declared gone after several consecutive misses. A failing
/// query counts as "running".
pub struct ProcessWatch {
    image_name: String,
    query: Arc<dyn ProcessQuery>,
    cache_ttl: Duration,
    miss_threshold: u32,
    last_check: Option<Instant>,
    cached_running: bool,
    misses: u32,
}

impl std::fmt::Debug for ProcessWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessWatch")
            .field("image_name", &self.image_name)
            .field("cached_running", &self.cached_running)
            .field("misses", &self.misses)
            .finish_non_exhaustive()
    }
}

impl ProcessWatch {
    pub fn new(image_name: impl Into<String>, query: Arc<dyn ProcessQuery>) -> Self {
        Self {
            image_name: image_name.into(),
            query,
            cache_ttl: PROCESS_CACHE_TTL,
            miss_threshold: PROCESS_MISS_THRESHOLD,
            last_check: None,
            cached_running: true,
            misses: 0,
        }
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_miss_threshold(mut self, threshold: u32) -> Self {
        self.miss_threshold = threshold.max(1);
        self
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn running_at(&mut self, now: Instant) -> bool {
        let fresh = self
            .last_check
            .is_some_and(|checked| now.saturating_duration_since(checked) < self.cache_ttl);
        if fresh {
            return self.cached_running;
        }
        self.last_check = Some(now);

        match self.query.is_running(&self.image_name) {
            Ok(true) => {
                self.misses = 0;
                self.cached_running = true;
            }
            Ok(false) => {
                self.misses = self.misses.saturating_add(1);
                debug!(image = %self.image_name, misses = self.misses, "process not found");
                self.cached_running = self.misses < self.miss_threshold;
            }
            Err(e) => {
                warn!(image = %self.image_name, error = %e, "process query failed; assuming running");
                self.misses = 0;
                self.cached_running = true;
            }
        }
        self.cached_running
    }

    pub fn reset(&mut self) {
        self.last_check = None;
        self.cached_running = true;
        self.misses = 0;
    }
}

/// Per-sample inputs of the idle detector, in the source's native units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleProbe {
    pub rpm: f64,
    pub speed_ms: f64,
    pub throttle_pct: f64,
    pub brake_pct: f64,
}

pub const IDLE_RPM: f64 = 150.0;
pub const IDLE_SPEED_MS: f64 = 0.2;
pub const IDLE_PEDAL_PCT: f64 = 1.0;
pub const IDLE_EPOCH_AFTER: Duration = Duration::from_millis(1200);

/// Counts "parked long enough to have swapped the car" periods.
///
/// The epoch is bumped once per sustained idle period, and only after some
/// activity has been seen since the previous bump.
#[derive(Debug, Clone)]
pub struct IdleEpochTracker {
    epoch: u64,
    idle_since: Option<Instant>,
    had_activity: bool,
    idle_after: Duration,
}

impl Default for IdleEpochTracker {
    fn default() -> Self {
        Self::new(IDLE_EPOCH_AFTER)
    }
}

impl IdleEpochTracker {
    pub fn new(idle_after: Duration) -> Self {
        Self {
            epoch: 0,
            idle_since: None,
            had_activity: false,
            idle_after,
        }
    }

    pub fn is_idle(probe: &IdleProbe) -> bool {
        probe.rpm < IDLE_RPM
            && probe.speed_ms.abs() < IDLE_SPEED_MS
            && probe.throttle_pct < IDLE_PEDAL_PCT
            && probe.brake_pct < IDLE_PEDAL_PCT
    }

    /// Feed one sample. Returns true when this sample bumped the epoch.
    pub fn observe(&mut self, probe: &IdleProbe, now: Instant) -> bool {
        if !Self::is_idle(probe) {
            self.idle_since = None;
            return false;
        }
        if !self.had_activity {
            self.idle_since = None;
            return false;
        }
        let since = *self.idle_since.get_or_insert(now);
        if now.saturating_duration_since(since) < self.idle_after {
            return false;
        }
        self.epoch = self.epoch.saturating_add(1);
        self.had_activity = false;
        self.idle_since = None;
        debug!(epoch = self.epoch, "idle period detected; vehicle epoch advanced");
        true
    }

    /// Mark that a live sample was accepted.
    pub fn mark_activity(&mut self) {
        self.had_activity = true;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Synthetic vehicle identity `"{source}:{epoch}"`.
    pub fn car_id(&self, source_id: &str) -> String {
        format!("{source_id}:{}", self.epoch)
    }

    pub fn reset(&mut self) {
        self.epoch = 0;
        self.idle_since = None;
        self.had_activity = false;
    }
}

//! Fixed-rate, deduplicated emission gate.
//!
//! The bridge polls sources faster than it emits. The gate owns the emission
//! deadline, which advances by exactly one period per emission. After a stall
//! the deadline restarts from `now` instead of bursting to catch up.

use std::time::{Duration, Instant};

/// Upper bound on the poll interval.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(5);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Poll interval for an emission period: `min(5ms, period / 4)`.
pub fn poll_interval_for(emit_period: Duration) -> Duration {
    (emit_period / 4).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

#[derive(Debug, Clone)]
pub struct EmissionGate {
    emit_period: Duration,
    next_deadline: Option<Instant>,
    last_emitted_ts: Option<f64>,
    suppressed: u64,
}

impl EmissionGate {
    pub fn new(emit_period: Duration) -> Self {
        Self {
            emit_period: emit_period.max(MIN_POLL_INTERVAL),
            next_deadline: None,
            last_emitted_ts: None,
            suppressed: 0,
        }
    }

    pub fn emit_period(&self) -> Duration {
        self.emit_period
    }

    pub fn poll_interval(&self) -> Duration {
        poll_interval_for(self.emit_period)
    }

    /// True once the emission deadline has passed.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_deadline.is_none_or(|deadline| now >= deadline)
    }

    /// Decide whether the frame sampled at `frame_ts` is emitted at `now`.
    ///
    /// A frame is emitted only when the deadline has passed and its timestamp
    /// differs from the last emitted one. A duplicate leaves the deadline in
    /// place so the next fresh frame goes out immediately.
    pub fn try_emit(&mut self, frame_ts: f64, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        if self
            .last_emitted_ts
            .is_some_and(|last| last.to_bits() == frame_ts.to_bits())
        {
            self.suppressed = self.suppressed.saturating_add(1);
            return false;
        }

        self.last_emitted_ts = Some(frame_ts);
        let mut next = self.next_deadline.unwrap_or(now) + self.emit_period;
        if next <= now {
            next = now + self.emit_period;
        }
        self.next_deadline = Some(next);
        true
    }

    /// Forget the deadline and the last emitted sample (new connection).
    pub fn reset(&mut self) {
        self.next_deadline = None;
        self.last_emitted_ts = None;
    }

    /// Due polls skipped because the frame was already emitted.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PERIOD: Duration = Duration::from_millis(16);

    #[test]
    fn poll_interval_is_capped() {
        assert_eq!(poll_interval_for(Duration::from_millis(16)), Duration::from_millis(4));
        assert_eq!(poll_interval_for(Duration::from_millis(100)), MAX_POLL_INTERVAL);
        assert_eq!(poll_interval_for(Duration::from_micros(100)), MIN_POLL_INTERVAL);
    }

    #[test]
    fn identical_timestamps_emit_once() {
        let mut gate = EmissionGate::new(PERIOD);
        let start = Instant::now();
        assert!(gate.try_emit(10.0, start));
        assert!(!gate.try_emit(10.0, start + PERIOD));
        assert!(!gate.try_emit(10.0, start + PERIOD * 3));
        assert_eq!(gate.suppressed(), 2);
    }

    #[test]
    fn fresh_frame_waits_for_deadline() {
        let mut gate = EmissionGate::new(PERIOD);
        let start = Instant::now();
        assert!(gate.try_emit(1.0, start));
        assert!(!gate.try_emit(2.0, start + PERIOD / 2));
        assert!(gate.try_emit(2.0, start + PERIOD));
    }

    #[test]
    fn deadline_advances_one_period_per_emission() {
        let mut gate = EmissionGate::new(PERIOD);
        let start = Instant::now();
        assert!(gate.try_emit(1.0, start));
        // Slightly late: the next deadline keeps the original cadence.
        assert!(gate.try_emit(2.0, start + PERIOD + Duration::from_millis(3)));
        assert!(!gate.try_emit(3.0, start + PERIOD * 2 - Duration::from_millis(1)));
        assert!(gate.try_emit(3.0, start + PERIOD * 2));
    }

    #[test]
    fn stall_does_not_cause_burst() {
        let mut gate = EmissionGate::new(PERIOD);
        let start = Instant::now();
        assert!(gate.try_emit(1.0, start));

        let resumed = start + PERIOD * 20;
        assert!(gate.try_emit(2.0, resumed));
        assert!(!gate.try_emit(3.0, resumed + Duration::from_millis(1)));
        assert!(gate.try_emit(3.0, resumed + PERIOD));
    }

    #[test]
    fn reset_allows_same_timestamp_again() {
        let mut gate = EmissionGate::new(PERIOD);
        let start = Instant::now();
        assert!(gate.try_emit(5.0, start));
        gate.reset();
        assert!(gate.try_emit(5.0, start + Duration::from_millis(1)));
    }

    proptest! {
        #[test]
        fn emissions_never_exceed_rate(offsets in proptest::collection::vec(0u64..2_000, 1..200)) {
            let mut gate = EmissionGate::new(PERIOD);
            let start = Instant::now();
            let mut sorted = offsets;
            sorted.sort_unstable();

            let mut emitted = 0u64;
            for (i, offset) in sorted.iter().enumerate() {
                let ts = i as f64;
                if gate.try_emit(ts, start + Duration::from_millis(*offset)) {
                    emitted += 1;
                }
            }
            let span = sorted.last().copied().unwrap_or(0);
            prop_assert!(emitted <= span / 16 + 1);
        }
    }
}

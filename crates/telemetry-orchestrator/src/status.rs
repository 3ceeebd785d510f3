//! Deduplicated session status.

use ssp_telemetry_core::{SessionState, StatusEvent};

/// Remembers the last emitted `(state, source)` pair and suppresses repeats.
#[derive(Debug, Default, Clone)]
pub struct StatusTracker {
    last: Option<(SessionState, Option<String>)>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The event to emit for this transition, or `None` if it repeats the
    /// previous one.
    pub fn transition(&mut self, state: SessionState, source_id: Option<&str>) -> Option<StatusEvent> {
        let unchanged = self
            .last
            .as_ref()
            .is_some_and(|(last_state, last_source)| {
                *last_state == state && last_source.as_deref() == source_id
            });
        if unchanged {
            return None;
        }
        self.last = Some((state, source_id.map(str::to_string)));
        Some(StatusEvent::new(state, source_id))
    }

    pub fn current(&self) -> Option<SessionState> {
        self.last.as_ref().map(|(state, _)| *state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_transition_emits_once() {
        let mut tracker = StatusTracker::new();
        let emitted = (0..3)
            .filter_map(|_| tracker.transition(SessionState::Active, Some("ac")))
            .count();
        assert_eq!(emitted, 1);
    }

    #[test]
    fn source_change_is_a_new_transition() {
        let mut tracker = StatusTracker::new();
        assert!(tracker.transition(SessionState::Active, Some("ac")).is_some());
        assert!(tracker.transition(SessionState::Active, Some("acc")).is_some());
        assert!(tracker.transition(SessionState::Waiting, None).is_some());
        assert!(tracker.transition(SessionState::Waiting, None).is_none());
        assert_eq!(tracker.current(), Some(SessionState::Waiting));
    }

    #[test]
    fn independent_trackers_do_not_interfere() {
        let mut first = StatusTracker::new();
        let mut second = StatusTracker::new();
        assert!(first.transition(SessionState::Lost, Some("beamng")).is_some());
        assert!(second.transition(SessionState::Lost, Some("beamng")).is_some());
    }
}

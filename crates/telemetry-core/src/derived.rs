//! Derived signals computed from accumulated state.
//!
//! [`RpmMaxTracker`] follows the highest engine speed seen for the current
//! vehicle and publishes `engine.rpm_max` / `engine.rpm_pct` once the observed
//! ceiling is believable.

use tracing::trace;

use crate::frame::{SignalValue, Signals, signal};

/// Observed ceilings below this are not published.
pub const DEFAULT_PUBLISH_MIN_RPM: i64 = 3000;

#[derive(Debug, Clone)]
pub struct RpmMaxTracker {
    observed_max_rpm: i64,
    vehicle_identity: Option<String>,
    publish_min_rpm: i64,
}

impl Default for RpmMaxTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLISH_MIN_RPM)
    }
}

impl RpmMaxTracker {
    pub fn new(publish_min_rpm: i64) -> Self {
        Self {
            observed_max_rpm: 0,
            vehicle_identity: None,
            publish_min_rpm,
        }
    }

    /// Forget the ceiling and the vehicle identity (used on reconnection).
    pub fn reset(&mut self) {
        self.observed_max_rpm = 0;
        self.vehicle_identity = None;
    }

    /// Track the vehicle identity; a different id resets the ceiling.
    /// `None` leaves the current identity untouched.
    pub fn observe_vehicle(&mut self, car_id: Option<&str>) {
        let Some(car_id) = car_id else {
            return;
        };
        if self.vehicle_identity.as_deref() != Some(car_id) {
            trace!(car_id, previous = ?self.vehicle_identity, "vehicle identity changed");
            self.vehicle_identity = Some(car_id.to_string());
            self.observed_max_rpm = 0;
        }
    }

    pub fn observe_rpm(&mut self, rpm: i64) {
        self.observed_max_rpm = self.observed_max_rpm.max(rpm);
    }

    pub fn is_ready(&self) -> bool {
        self.observed_max_rpm > 0 && self.observed_max_rpm >= self.publish_min_rpm
    }

    pub fn observed_max_rpm(&self) -> i64 {
        self.observed_max_rpm
    }

    pub fn vehicle_identity(&self) -> Option<&str> {
        self.vehicle_identity.as_deref()
    }

    pub fn publish_min_rpm(&self) -> i64 {
        self.publish_min_rpm
    }
}

/// Enrich `signals` with `engine.rpm_max` and `engine.rpm_pct`.
///
/// Additive only: `engine.rpm` is never touched, and a source that already
/// reports a native `engine.rpm_max` keeps its own pair.
pub fn apply_rpm_derivation(signals: &mut Signals, tracker: &mut RpmMaxTracker) {
    let car_id = signals
        .get(signal::VEHICLE_CAR_ID)
        .and_then(SignalValue::as_str)
        .filter(|id| !id.is_empty());
    tracker.observe_vehicle(car_id);

    let Some(rpm) = signals.get(signal::ENGINE_RPM).and_then(SignalValue::as_i64) else {
        return;
    };
    tracker.observe_rpm(rpm);

    if !tracker.is_ready() || signals.contains_key(signal::ENGINE_RPM_MAX) {
        return;
    }

    let max = tracker.observed_max_rpm();
    let ratio = (rpm as f64 / max as f64).clamp(0.0, 1.0);
    signals.insert(signal::ENGINE_RPM_MAX.to_string(), SignalValue::Integer(max));
    signals.insert(
        signal::ENGINE_RPM_PCT.to_string(),
        SignalValue::Number(round_to(ratio, 3)),
    );
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals_with_rpm(rpm: i64) -> Signals {
        let mut signals = Signals::new();
        signals.insert(signal::ENGINE_RPM.to_string(), SignalValue::Integer(rpm));
        signals
    }

    fn pct(signals: &Signals) -> Option<f64> {
        signals.get(signal::ENGINE_RPM_PCT).and_then(SignalValue::as_f64)
    }

    #[test]
    fn publishes_only_after_believable_ceiling() {
        let mut tracker = RpmMaxTracker::new(3000);

        let mut s = signals_with_rpm(1000);
        apply_rpm_derivation(&mut s, &mut tracker);
        assert!(pct(&s).is_none());

        let mut s = signals_with_rpm(2500);
        apply_rpm_derivation(&mut s, &mut tracker);
        assert!(pct(&s).is_none());
        assert!(!s.contains_key(signal::ENGINE_RPM_MAX));

        let mut s = signals_with_rpm(3200);
        apply_rpm_derivation(&mut s, &mut tracker);
        assert_eq!(s.get(signal::ENGINE_RPM_MAX), Some(&SignalValue::Integer(3200)));
        assert!((pct(&s).unwrap_or_default() - 1.0).abs() < 1e-9);

        let mut s = signals_with_rpm(1600);
        apply_rpm_derivation(&mut s, &mut tracker);
        assert!((pct(&s).unwrap_or_default() - 0.5).abs() < 1e-9);
        assert_eq!(s.get(signal::ENGINE_RPM), Some(&SignalValue::Integer(1600)));
    }

    #[test]
    fn car_change_resets_ceiling() {
        let mut tracker = RpmMaxTracker::default();
        let mut s = signals_with_rpm(8000);
        s.insert(signal::VEHICLE_CAR_ID.to_string(), "gt3".into());
        apply_rpm_derivation(&mut s, &mut tracker);
        assert_eq!(tracker.observed_max_rpm(), 8000);

        let mut s = signals_with_rpm(4000);
        s.insert(signal::VEHICLE_CAR_ID.to_string(), "mx5".into());
        apply_rpm_derivation(&mut s, &mut tracker);
        assert_eq!(tracker.observed_max_rpm(), 4000);
        assert_eq!(tracker.vehicle_identity(), Some("mx5"));
    }

    #[test]
    fn missing_car_id_keeps_identity() {
        let mut tracker = RpmMaxTracker::default();
        tracker.observe_vehicle(Some("gt3"));
        tracker.observe_rpm(7000);
        tracker.observe_vehicle(None);
        assert_eq!(tracker.observed_max_rpm(), 7000);
    }

    #[test]
    fn unparsable_rpm_is_skipped() {
        let mut tracker = RpmMaxTracker::default();
        let mut s = Signals::new();
        s.insert(signal::ENGINE_RPM.to_string(), "redline".into());
        apply_rpm_derivation(&mut s, &mut tracker);
        assert_eq!(tracker.observed_max_rpm(), 0);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn native_rpm_max_is_not_overwritten() {
        let mut tracker = RpmMaxTracker::default();
        let mut s = signals_with_rpm(6000);
        s.insert(signal::ENGINE_RPM_MAX.to_string(), SignalValue::Integer(9000));
        s.insert(signal::ENGINE_RPM_PCT.to_string(), SignalValue::Number(0.667));
        apply_rpm_derivation(&mut s, &mut tracker);
        assert_eq!(s.get(signal::ENGINE_RPM_MAX), Some(&SignalValue::Integer(9000)));
        assert_eq!(tracker.observed_max_rpm(), 6000);
    }

    #[test]
    fn ratio_is_rounded_to_three_decimals() {
        let mut tracker = RpmMaxTracker::default();
        tracker.observe_rpm(9000);
        let mut s = signals_with_rpm(1000);
        apply_rpm_derivation(&mut s, &mut tracker);
        assert!((pct(&s).unwrap_or_default() - 0.111).abs() < 1e-12);
    }
}

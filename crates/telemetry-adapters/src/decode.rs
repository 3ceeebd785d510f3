//! Fixed-offset binary readers and the shared plausibility filter.
//!
//! Offsets are a contract with the external producer. Every read is bounds
//! checked; a short or corrupt buffer yields [`Decoded::Invalid`], never a
//! panic or an error.

use ssp_telemetry_core::{TelemetryFrame, signal};

/// Outcome of decoding one raw buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<R> {
    Reading(R),
    /// Too short, out of range, or not showing any sign of life.
    Invalid,
}

impl<R> Decoded<R> {
    pub fn reading(self) -> Option<R> {
        match self {
            Self::Reading(r) => Some(r),
            Self::Invalid => None,
        }
    }

    pub fn is_reading(&self) -> bool {
        matches!(self, Self::Reading(_))
    }
}

pub fn read_u8(data: &[u8], offset: usize) -> Option<u8> {
    data.get(offset).copied()
}

pub fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset.checked_add(2)?)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
}

pub fn read_i32_le(data: &[u8], offset: usize) -> Option<i32> {
    data.get(offset..offset.checked_add(4)?)
        .and_then(|b| b.try_into().ok())
        .map(i32::from_le_bytes)
}

/// Little-endian `f32`; non-finite values read as `None`.
pub fn read_f32_le(data: &[u8], offset: usize) -> Option<f32> {
    data.get(offset..offset.checked_add(4)?)
        .and_then(|b| b.try_into().ok())
        .map(f32::from_le_bytes)
        .filter(|v| v.is_finite())
}

/// NUL-terminated UTF-16LE string of at most `max_chars` code units.
pub fn read_wide_string(data: &[u8], offset: usize, max_chars: usize) -> Option<String> {
    let len = max_chars.checked_mul(2)?;
    let bytes = data.get(offset..offset.checked_add(len)?)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .filter_map(|pair| <[u8; 2]>::try_from(pair).ok().map(u16::from_le_bytes))
        .take_while(|unit| *unit != 0)
        .collect();
    Some(String::from_utf16_lossy(&units).trim().to_string())
}

/// Source-agnostic view of the fields the plausibility filter checks.
/// Pedals are ratios (nominally 0..1), gear is already canonical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreSample {
    pub rpm: f64,
    pub speed_kmh: f64,
    pub gear: i32,
    pub throttle: f64,
    pub brake: f64,
}

impl CoreSample {
    /// Build a frame carrying the five core signals.
    ///
    /// Speed is reported as a magnitude and pedals as clamped percentages.
    pub fn to_frame(&self, source_id: &str, timestamp: f64) -> TelemetryFrame {
        TelemetryFrame::new(source_id, timestamp)
            .with_signal(signal::ENGINE_RPM, self.rpm.max(0.0).trunc() as i64)
            .with_signal(signal::VEHICLE_SPEED_KMH, self.speed_kmh.abs())
            .with_signal(signal::DRIVETRAIN_GEAR, i64::from(self.gear))
            .with_signal(signal::CONTROLS_THROTTLE_PCT, ratio_to_pct(self.throttle))
            .with_signal(signal::CONTROLS_BRAKE_PCT, ratio_to_pct(self.brake))
    }
}

/// Ratio 0..1 to a percentage clamped to 0..100.
pub fn ratio_to_pct(ratio: f64) -> f64 {
    (ratio.clamp(0.0, 1.0) * 100.0).clamp(0.0, 100.0)
}

/// Result of the plausibility filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// In range and showing life.
    Alive,
    /// In range but idle (engine off, stationary, no pedal input).
    Idle,
    /// At least one field outside its physical envelope.
    OutOfRange,
}

/// Physical envelope and liveness thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityFilter {
    pub rpm_max: f64,
    pub speed_kmh_min: f64,
    pub speed_kmh_max: f64,
    pub gear_min: i32,
    pub gear_max: i32,
    /// Pedal ratios tolerate this much float noise beyond 0..1.
    pub pedal_tolerance: f64,
    pub alive_rpm: f64,
    pub alive_speed_kmh: f64,
    pub alive_pedal: f64,
}

impl PlausibilityFilter {
    pub const STANDARD: Self = Self {
        rpm_max: 25_000.0,
        speed_kmh_min: -10.0,
        speed_kmh_max: 700.0,
        gear_min: -1,
        gear_max: 10,
        pedal_tolerance: 0.10,
        alive_rpm: 200.0,
        alive_speed_kmh: 1.0,
        alive_pedal: 0.05,
    };

    pub fn in_range(&self, s: &CoreSample) -> bool {
        let pedal_range = -self.pedal_tolerance..=1.0 + self.pedal_tolerance;
        (0.0..=self.rpm_max).contains(&s.rpm)
            && (self.speed_kmh_min..=self.speed_kmh_max).contains(&s.speed_kmh)
            && (self.gear_min..=self.gear_max).contains(&s.gear)
            && pedal_range.contains(&s.throttle)
            && pedal_range.contains(&s.brake)
    }

    pub fn is_alive(&self, s: &CoreSample) -> bool {
        s.rpm > self.alive_rpm
            || s.speed_kmh.abs() > self.alive_speed_kmh
            || s.throttle > self.alive_pedal
            || s.brake > self.alive_pedal
    }

    pub fn verdict(&self, s: &CoreSample) -> Verdict {
        if !self.in_range(s) {
            Verdict::OutOfRange
        } else if self.is_alive(s) {
            Verdict::Alive
        } else {
            Verdict::Idle
        }
    }
}

impl Default for PlausibilityFilter {
    fn default() -> Self {
        Self::STANDARD
    }
}

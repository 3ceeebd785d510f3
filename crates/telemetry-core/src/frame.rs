//! Canonical telemetry frame.
//!
//! One [`TelemetryFrame`] is one normalized sample. Signals are keyed by
//! namespaced names (see [`signal`]) so that every source implementing the
//! same capability publishes the same key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::SCHEMA_VERSION;

/// Well-known signal names.
pub mod signal {
    pub const ENGINE_RPM: &str = "engine.rpm";
    pub const ENGINE_RPM_MAX: &str = "engine.rpm_max";
    pub const ENGINE_RPM_PCT: &str = "engine.rpm_pct";
    pub const VEHICLE_SPEED_KMH: &str = "vehicle.speed_kmh";
    pub const VEHICLE_CAR_ID: &str = "vehicle.car_id";
    pub const DRIVETRAIN_GEAR: &str = "drivetrain.gear";
    pub const CONTROLS_THROTTLE_PCT: &str = "controls.throttle_pct";
    pub const CONTROLS_BRAKE_PCT: &str = "controls.brake_pct";

    /// Signals every source is expected to provide.
    pub const CORE: [&str; 5] = [
        ENGINE_RPM,
        VEHICLE_SPEED_KMH,
        DRIVETRAIN_GEAR,
        CONTROLS_THROTTLE_PCT,
        CONTROLS_BRAKE_PCT,
    ];
}

/// A single signal value. Serialized untagged so frames stay plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl SignalValue {
    /// Integer view of the value, truncating numbers and parsing text.
    ///
    /// Returns `None` for non-finite numbers and unparsable text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Number(v) if v.is_finite() => Some(v.trunc() as i64),
            Self::Number(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Number(v) => Some(*v).filter(|v| v.is_finite()),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for SignalValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SignalValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u16> for SignalValue {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Signal map of a frame. Ordered so serialized frames are stable.
pub type Signals = BTreeMap<String, SignalValue>;

/// Optional vehicle descriptor attached to a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

/// One normalized telemetry sample.
///
/// Wire names follow the bridge protocol: `v`, `ts`, `source`, `signals`,
/// and the optional `car` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(rename = "v")]
    pub schema_version: String,

    /// Unix time in seconds.
    #[serde(rename = "ts")]
    pub timestamp: f64,

    #[serde(rename = "source")]
    pub source_id: String,

    #[serde(default)]
    pub signals: Signals,

    #[serde(rename = "car", default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleInfo>,
}

impl TelemetryFrame {
    pub fn new(source_id: impl Into<String>, timestamp: f64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp,
            source_id: source_id.into(),
            signals: Signals::new(),
            vehicle: None,
        }
    }

    #[must_use]
    pub fn with_signal(mut self, key: &str, value: impl Into<SignalValue>) -> Self {
        self.insert_signal(key, value);
        self
    }

    #[must_use]
    pub fn with_vehicle(mut self, vehicle: VehicleInfo) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    pub fn insert_signal(&mut self, key: &str, value: impl Into<SignalValue>) {
        self.signals.insert(key.to_string(), value.into());
    }

    pub fn signal(&self, key: &str) -> Option<&SignalValue> {
        self.signals.get(key)
    }

    /// Native or synthesized vehicle identity. Empty ids count as absent.
    pub fn car_id(&self) -> Option<&str> {
        self.signal(signal::VEHICLE_CAR_ID)
            .and_then(SignalValue::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Two frames carry the same sample when their timestamps are bit-identical.
    pub fn same_sample_as(&self, timestamp: f64) -> bool {
        self.timestamp.to_bits() == timestamp.to_bits()
    }
}

//! Capability maps.
//!
//! A [`CapabilitySpec`] declares every signal a source may put into a frame,
//! with its type, unit and nominal sample rate. It is immutable per plugin and
//! is sent to consumers on every (re)connection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::SCHEMA_ID;
use crate::frame::{TelemetryFrame, signal};

/// JSON type of a signal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Integer,
    Number,
    String,
}

/// Metadata for one declared signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub unit: String,
    #[serde(rename = "hz")]
    pub sample_hz: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SignalSpec {
    pub fn new(signal_type: SignalType, unit: impl Into<String>, sample_hz: u32) -> Self {
        Self {
            signal_type,
            unit: unit.into(),
            sample_hz,
            min: None,
            max: None,
            precision: None,
            description: None,
        }
    }

    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn precision(mut self, digits: u32) -> Self {
        self.precision = Some(digits);
        self
    }

    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// Capability map of one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    #[serde(rename = "plugin")]
    pub plugin_id: String,
    #[serde(rename = "schema")]
    pub schema_version: String,
    pub signals: BTreeMap<String, SignalSpec>,
}

impl CapabilitySpec {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            schema_version: SCHEMA_ID.to_string(),
            signals: BTreeMap::new(),
        }
    }

    /// The five core signals plus the optional derived/identity signals that
    /// the bridge may add to any frame.
    pub fn standard(plugin_id: impl Into<String>, sample_hz: u32) -> Self {
        Self::new(plugin_id)
            .with_signal(
                signal::ENGINE_RPM,
                SignalSpec::new(SignalType::Integer, "rpm", sample_hz).range(0.0, 25_000.0),
            )
            .with_signal(
                signal::VEHICLE_SPEED_KMH,
                SignalSpec::new(SignalType::Number, "km/h", sample_hz).range(0.0, 700.0),
            )
            .with_signal(
                signal::DRIVETRAIN_GEAR,
                SignalSpec::new(SignalType::Integer, "gear", sample_hz)
                    .range(-1.0, 10.0)
                    .description("-1 = reverse, 0 = neutral, 1..N = forward"),
            )
            .with_signal(
                signal::CONTROLS_THROTTLE_PCT,
                SignalSpec::new(SignalType::Number, "%", sample_hz).range(0.0, 100.0),
            )
            .with_signal(
                signal::CONTROLS_BRAKE_PCT,
                SignalSpec::new(SignalType::Number, "%", sample_hz).range(0.0, 100.0),
            )
            .with_signal(
                signal::ENGINE_RPM_MAX,
                SignalSpec::new(SignalType::Integer, "rpm", sample_hz)
                    .description("Native redline, or the highest rpm observed for this vehicle"),
            )
            .with_signal(
                signal::ENGINE_RPM_PCT,
                SignalSpec::new(SignalType::Number, "ratio", sample_hz)
                    .range(0.0, 1.0)
                    .precision(3),
            )
            .with_signal(
                signal::VEHICLE_CAR_ID,
                SignalSpec::new(SignalType::String, "id", sample_hz)
                    .description("Vehicle identity; changes when the car is swapped"),
            )
    }

    #[must_use]
    pub fn with_signal(mut self, name: &str, spec: SignalSpec) -> Self {
        self.signals.insert(name.to_string(), spec);
        self
    }

    pub fn declares(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    /// Signals present in `frame` that this map does not declare.
    pub fn undeclared_signals<'a>(&self, frame: &'a TelemetryFrame) -> Vec<&'a str> {
        frame
            .signals
            .keys()
            .map(String::as_str)
            .filter(|name| !self.declares(name))
            .collect()
    }

    /// Remove undeclared signals so the frame honours this capability map.
    /// Returns how many were dropped.
    pub fn retain_declared(&self, frame: &mut TelemetryFrame) -> usize {
        let before = frame.signals.len();
        frame.signals.retain(|name, _| self.signals.contains_key(name));
        before.saturating_sub(frame.signals.len())
    }
}

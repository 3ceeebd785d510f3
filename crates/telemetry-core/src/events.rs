//! Session envelope events.
//!
//! Events share the transport with frames but carry a `type` discriminator;
//! frames are recognised by their `v` field instead.

use serde::{Deserialize, Serialize};

use crate::SCHEMA_ID;
use crate::capabilities::CapabilitySpec;

/// External projection of the acquisition state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Waiting,
    Active,
    Lost,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Lost => "lost",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "ts")]
    pub timestamp: f64,
    pub state: SessionState,
    #[serde(rename = "source")]
    pub source_id: Option<String>,
}

impl StatusEvent {
    pub fn new(state: SessionState, source_id: Option<&str>) -> Self {
        Self {
            timestamp: crate::unix_timestamp(),
            state,
            source_id: source_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitiesEvent {
    #[serde(rename = "ts")]
    pub timestamp: f64,
    #[serde(rename = "source")]
    pub source_id: String,
    #[serde(rename = "schema")]
    pub schema_version: String,
    pub capabilities: CapabilitySpec,
}

impl CapabilitiesEvent {
    pub fn new(capabilities: CapabilitySpec) -> Self {
        Self {
            timestamp: crate::unix_timestamp(),
            source_id: capabilities.plugin_id.clone(),
            schema_version: SCHEMA_ID.to_string(),
            capabilities,
        }
    }
}

/// Kind discriminator of a [`BridgeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    Capabilities,
}

/// Envelope event sent alongside frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BridgeEvent {
    Status(StatusEvent),
    Capabilities(CapabilitiesEvent),
}

impl BridgeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Status(_) => EventKind::Status,
            Self::Capabilities(_) => EventKind::Capabilities,
        }
    }
}

impl From<StatusEvent> for BridgeEvent {
    fn from(event: StatusEvent) -> Self {
        Self::Status(event)
    }
}

impl From<CapabilitiesEvent> for BridgeEvent {
    fn from(event: CapabilitiesEvent) -> Self {
        Self::Capabilities(event)
    }
}

//! Simulator telemetry sources for SSP Bridge.
//!
//! Each source composes a fixed-offset binary decoder with liveness
//! watchdogs behind the [`SourcePlugin`] contract. Shared-memory sources are
//! read synchronously by the caller; UDP sources keep a background receive
//! thread that publishes only the latest packet.
//!
//! ## Sources
//! - `acc` - Assetto Corsa Competizione (shared memory)
//! - `ams2` - Automobilista 2 (SMS UDP)
//! - `ac` - Assetto Corsa (shared memory)
//! - `beamng` - BeamNG.drive (OutGauge UDP)

#![deny(static_mut_refs)]

pub mod ac;
pub mod acc;
pub mod ams2;
pub mod autodetect;
pub mod beamng;
pub mod decode;
pub mod physics_page;
pub mod plugin;
pub mod process;
pub mod registry;
pub mod shm;
pub mod udp;
pub mod watchdog;

pub use ac::AssettoCorsaSource;
pub use acc::AccSource;
pub use ams2::{Ams2Source, DEFAULT_AMS2_PORT};
pub use autodetect::{AutoDetector, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_WINDOW, Detection};
pub use beamng::{BeamNgSource, DEFAULT_BEAMNG_PORT};
pub use decode::{Decoded, PlausibilityFilter, Verdict};
pub use plugin::{DEFAULT_SAMPLE_HZ, SourcePlugin};
pub use process::{
    AssumeRunning, ProcessQuery, ProcessQueryError, ProcessSnapshot, SystemProcessQuery,
    default_process_query,
};
pub use registry::{
    PluginEntry, SourceOptions, available_plugin_ids, create_all, create_plugin, find_plugin,
    registered_plugins,
};
pub use watchdog::{IdleEpochTracker, ProcessWatch, SequenceStallWatchdog};

//! Plugin registry in probe priority order.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use ssp_telemetry_core::{TelemetryError, TelemetryResult};

use crate::ac::AssettoCorsaSource;
use crate::acc::AccSource;
use crate::ams2::{Ams2Source, DEFAULT_AMS2_PORT};
use crate::beamng::{BeamNgSource, DEFAULT_BEAMNG_PORT};
use crate::plugin::SourcePlugin;
use crate::process::{ProcessQuery, default_process_query};

/// Construction parameters shared by all sources.
#[derive(Clone)]
pub struct SourceOptions {
    /// Local address UDP sources bind to.
    pub bind_ip: IpAddr,
    pub ams2_port: u16,
    pub beamng_port: u16,
    pub process_query: Arc<dyn ProcessQuery>,
}

impl std::fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceOptions")
            .field("bind_ip", &self.bind_ip)
            .field("ams2_port", &self.ams2_port)
            .field("beamng_port", &self.beamng_port)
            .finish_non_exhaustive()
    }
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ams2_port: DEFAULT_AMS2_PORT,
            beamng_port: DEFAULT_BEAMNG_PORT,
            process_query: default_process_query(),
        }
    }
}

type Factory = fn(&SourceOptions) -> Box<dyn SourcePlugin>;

/// Registered plugin: id, display name and constructor.
#[derive(Debug, Clone, Copy)]
pub struct PluginEntry {
    pub id: &'static str,
    pub name: &'static str,
    factory: Factory,
}

impl PluginEntry {
    pub fn create(&self, options: &SourceOptions) -> Box<dyn SourcePlugin> {
        (self.factory)(options)
    }
}

fn make_acc(_: &SourceOptions) -> Box<dyn SourcePlugin> {
    Box::new(AccSource::new())
}

fn make_ams2(opts: &SourceOptions) -> Box<dyn SourcePlugin> {
    Box::new(Ams2Source::new(SocketAddr::new(opts.bind_ip, opts.ams2_port)))
}

fn make_ac(opts: &SourceOptions) -> Box<dyn SourcePlugin> {
    Box::new(AssettoCorsaSource::new(Arc::clone(&opts.process_query)))
}

fn make_beamng(opts: &SourceOptions) -> Box<dyn SourcePlugin> {
    Box::new(BeamNgSource::new(
        SocketAddr::new(opts.bind_ip, opts.beamng_port),
        Arc::clone(&opts.process_query),
    ))
}

/// Most specific and cheapest probes first.
static REGISTRY: [PluginEntry; 4] = [
    PluginEntry {
        id: AccSource::ID,
        name: "Assetto Corsa Competizione",
        factory: make_acc,
    },
    PluginEntry {
        id: Ams2Source::ID,
        name: "Automobilista 2 (UDP/SMS)",
        factory: make_ams2,
    },
    PluginEntry {
        id: AssettoCorsaSource::ID,
        name: "Assetto Corsa",
        factory: make_ac,
    },
    PluginEntry {
        id: BeamNgSource::ID,
        name: "BeamNG.drive",
        factory: make_beamng,
    },
];

pub fn registered_plugins() -> &'static [PluginEntry] {
    &REGISTRY
}

pub fn available_plugin_ids() -> Vec<&'static str> {
    REGISTRY.iter().map(|entry| entry.id).collect()
}

pub fn find_plugin(id: &str) -> Option<&'static PluginEntry> {
    let id = id.trim().to_ascii_lowercase();
    REGISTRY.iter().find(|entry| entry.id == id)
}

/// Build the plugin registered under `id` (case-insensitive).
pub fn create_plugin(id: &str, options: &SourceOptions) -> TelemetryResult<Box<dyn SourcePlugin>> {
    find_plugin(id)
        .map(|entry| entry.create(options))
        .ok_or_else(|| TelemetryError::UnknownPlugin {
            id: id.to_string(),
            available: available_plugin_ids().join(", "),
        })
}

/// Build every registered plugin in probe order.
pub fn create_all(options: &SourceOptions) -> Vec<Box<dyn SourcePlugin>> {
    REGISTRY.iter().map(|entry| entry.create(options)).collect()
}

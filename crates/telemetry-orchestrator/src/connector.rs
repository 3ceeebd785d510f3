//! Source connectors: how the bridge obtains an open plugin.

use std::sync::Arc;
use std::time::Duration;

use ssp_telemetry_adapters::{AutoDetector, SourceOptions, SourcePlugin, create_all, create_plugin};
use ssp_telemetry_core::{TelemetryError, TelemetryFrame, TelemetryResult};
use tracing::debug;

use crate::config::BridgeConfig;

/// An open plugin, plus the frame read while probing it, if any.
pub struct Connection {
    pub plugin: Box<dyn SourcePlugin>,
    pub first_frame: Option<TelemetryFrame>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("plugin", &self.plugin.id())
            .field("first_frame", &self.first_frame.is_some())
            .finish()
    }
}

/// Produces an open plugin, or fails with a source error.
///
/// Each call builds fresh plugin instances so no watchdog state survives a
/// reconnection.
pub trait PluginConnector: Send {
    /// Short description for logs (`ac`, `auto`).
    fn describe(&self) -> String;

    fn connect(&mut self) -> TelemetryResult<Connection>;
}

/// Always opens the same registered plugin.
#[derive(Debug)]
pub struct FixedConnector {
    plugin_id: String,
    options: SourceOptions,
}

impl FixedConnector {
    /// Fails with `UnknownPlugin` when `plugin_id` is not registered.
    pub fn new(plugin_id: &str, options: SourceOptions) -> TelemetryResult<Self> {
        let plugin = create_plugin(plugin_id, &options)?;
        Ok(Self {
            plugin_id: plugin.id().to_string(),
            options,
        })
    }
}

impl PluginConnector for FixedConnector {
    fn describe(&self) -> String {
        self.plugin_id.clone()
    }

    fn connect(&mut self) -> TelemetryResult<Connection> {
        let mut plugin = create_plugin(&self.plugin_id, &self.options)?;
        if let Err(e) = plugin.open() {
            plugin.close();
            return Err(e);
        }
        debug!(source_id = plugin.id(), "source opened");
        Ok(Connection {
            plugin,
            first_frame: None,
        })
    }
}

/// Probes every registered plugin and keeps the live one.
#[derive(Debug)]
pub struct AutoConnector {
    detector: AutoDetector,
    options: SourceOptions,
}

impl AutoConnector {
    pub fn new(options: SourceOptions) -> Self {
        Self {
            detector: AutoDetector::new(Arc::clone(&options.process_query)),
            options,
        }
    }

    #[must_use]
    pub fn with_probe(mut self, window: Duration, interval: Duration) -> Self {
        self.detector = self
            .detector
            .with_probe_window(window)
            .with_probe_interval(interval);
        self
    }
}

impl PluginConnector for AutoConnector {
    fn describe(&self) -> String {
        "auto".to_string()
    }

    fn connect(&mut self) -> TelemetryResult<Connection> {
        let detection = self.detector.detect(create_all(&self.options))?;
        Ok(Connection {
            plugin: detection.plugin,
            first_frame: detection.first_frame,
        })
    }
}

/// Connector for `config.game`: auto-detection for `auto`, otherwise the
/// named plugin.
pub fn connector_from_config(config: &BridgeConfig) -> TelemetryResult<Box<dyn PluginConnector>> {
    let options = config
        .source_options()
        .map_err(|e| TelemetryError::invalid_configuration(e.to_string()))?;
    if config.is_auto() {
        Ok(Box::new(
            AutoConnector::new(options).with_probe(config.probe_window(), config.probe_interval()),
        ))
    } else {
        Ok(Box::new(FixedConnector::new(&config.game, options)?))
    }
}

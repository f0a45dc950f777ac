//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it changes.

use serde::{Deserialize, Serialize};

pub use hubcast_core::OpacityScale;

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 8080, "maxConnections": 1024 },
///   "backbone": { "host": "redis.internal", "channel": "hub-counts" },
///   "opacity": { "maxValue": 5000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubcastSettings {
    /// HTTP listener and stream settings.
    pub server: ServerSettings,
    /// Pub/sub backbone connection.
    pub backbone: BackboneSettings,
    /// Count-to-opacity scale.
    pub opacity: OpacityScale,
    /// Log output.
    pub logging: LoggingSettings,
}

impl HubcastSettings {
    /// Check cross-field constraints after all layers are applied.
    pub fn validate(&self) -> Result<()> {
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be > 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be > 0".into(),
            ));
        }
        if self.backbone.channel.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "backbone.channel must not be empty".into(),
            ));
        }
        if self.backbone.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "backbone.connectTimeoutMs must be > 0".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "compact" | "json") {
            return Err(SettingsError::InvalidValue(format!(
                "logging.format must be \"compact\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        self.opacity
            .validate()
            .map_err(|msg| SettingsError::InvalidValue(format!("opacity: {msg}")))
    }
}

/// HTTP listener and stream settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
    /// Concurrent streams allowed before new ones get 503.
    pub max_connections: usize,
    /// Per-client bounded send queue.
    pub send_queue_capacity: usize,
    /// Keep-alive comment interval. `0` disables keep-alives.
    pub keep_alive_secs: u64,
    /// `Access-Control-Allow-Origin` value.
    pub allow_origin: String,
    /// How long shutdown waits for stream tasks.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 256,
            send_queue_capacity: 256,
            keep_alive_secs: 15,
            allow_origin: "*".to_string(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Redis pub/sub connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackboneSettings {
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Channel carrying count updates.
    pub channel: String,
    /// Bound on establishing one subscription.
    pub connect_timeout_ms: u64,
}

impl Default for BackboneSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            channel: "hub-counts".to_string(),
            connect_timeout_ms: 5000,
        }
    }
}

impl BackboneSettings {
    /// `redis://host:port/`
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter. `RUST_LOG` wins when set.
    pub level: String,
    /// `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

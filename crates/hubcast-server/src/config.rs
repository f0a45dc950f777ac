//! Server configuration.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use hubcast_settings::HubcastSettings;
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

/// Configuration for the relay server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent SSE streams.
    pub max_connections: usize,
    /// Per-client send queue depth.
    pub send_queue_capacity: usize,
    /// Keep-alive comment interval in seconds (`0` disables).
    pub keep_alive_secs: u64,
    /// `Access-Control-Allow-Origin` value.
    pub allow_origin: String,
    /// Bound on waiting for stream tasks at shutdown.
    pub shutdown_timeout_secs: u64,
    /// Channel every stream subscribes to.
    pub channel: String,
    /// Bound on establishing one backbone subscription.
    pub connect_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 256,
            send_queue_capacity: 256,
            keep_alive_secs: 15,
            allow_origin: "*".into(),
            shutdown_timeout_secs: 10,
            channel: "hub-counts".into(),
            connect_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &HubcastSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            send_queue_capacity: settings.server.send_queue_capacity,
            keep_alive_secs: settings.server.keep_alive_secs,
            allow_origin: settings.server.allow_origin.clone(),
            shutdown_timeout_secs: settings.server.shutdown_timeout_secs,
            channel: settings.backbone.channel.clone(),
            connect_timeout_ms: settings.backbone.connect_timeout_ms,
        }
    }

    /// Resolve `host:port`.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let raw = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        };
        raw.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ServerError::InvalidAddress(raw))
    }

    /// Keep-alive interval, if enabled.
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }

    /// Shutdown wait bound.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Backbone connect bound.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

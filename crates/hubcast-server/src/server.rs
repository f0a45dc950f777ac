//! `HubcastServer`: Axum router, listener and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::backbone::Backbone;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::sse::sse_handler;
use crate::subscription::{SubscriptionManager, SubscriptionSettings};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Owner of every client subscription.
    pub manager: Arc<SubscriptionManager>,
    /// Keep-alive comment interval, if enabled.
    pub keep_alive: Option<Duration>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct HubcastServer {
    config: ServerConfig,
    manager: Arc<SubscriptionManager>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl HubcastServer {
    /// Create a server over `backbone`.
    pub fn new(config: ServerConfig, backbone: Arc<dyn Backbone>) -> Self {
        let manager = SubscriptionManager::new(
            backbone,
            SubscriptionSettings {
                channel: config.channel.clone(),
                queue_capacity: config.send_queue_capacity,
                max_connections: config.max_connections,
                connect_timeout: config.connect_timeout(),
            },
        );
        Self {
            config,
            manager,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Get the subscription manager.
    pub fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.manager
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Result<Router, ServerError> {
        let state = AppState {
            manager: Arc::clone(&self.manager),
            keep_alive: self.config.keep_alive(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Ok(Router::new()
            .route("/sse", get(sse_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(cors_layer(&self.config.allow_origin)?)
            .layer(TraceLayer::new_for_http()))
    }

    /// Bind and serve in the background.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let router = self.router()?;
        let addr = self.config.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            channel = %self.config.channel,
            max_connections = self.config.max_connections,
            "hubcast server started"
        );

        let stop = CancellationToken::new();
        let serve_stop = stop.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { serve_stop.cancelled().await })
                .await
        });

        Ok(ServerHandle {
            addr: local_addr,
            manager: self.manager,
            stop,
            task,
            shutdown_timeout: self.config.shutdown_timeout(),
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    manager: Arc<SubscriptionManager>,
    stop: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
    shutdown_timeout: Duration,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Subscription manager of the running server.
    pub fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.manager
    }

    /// Stop accepting, end every stream, and wait for the listener.
    ///
    /// Streams are cancelled first so graceful shutdown does not wait on
    /// open SSE responses.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        self.manager.shutdown(self.shutdown_timeout).await;
        self.stop.cancel();
        match tokio::time::timeout(self.shutdown_timeout, self.task).await {
            Ok(Ok(result)) => result.map_err(ServerError::from),
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "server task ended abnormally");
                Ok(())
            }
            Err(_) => {
                warn!("listener did not stop within {:?}", self.shutdown_timeout);
                Ok(())
            }
        }
    }
}

fn cors_layer(allow_origin: &str) -> Result<CorsLayer, ServerError> {
    let origin = if allow_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(allow_origin.trim())
            .map_err(|_| ServerError::InvalidOrigin(allow_origin.to_owned()))?;
        AllowOrigin::exact(value)
    };
    Ok(CorsLayer::new().allow_origin(origin))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.manager.active_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backbone::MemoryBackbone;
    use axum::body::Body;
    use axum::http::{Request, header};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> HubcastServer {
        HubcastServer::new(ServerConfig::default(), Arc::new(MemoryBackbone::new()))
    }

    async fn get(router: Router, uri: &str) -> Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let resp = get(make_server().router().unwrap(), "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn sse_endpoint_sets_stream_headers() {
        let server = make_server();
        let resp = get(server.router().unwrap(), "/sse").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(server.manager().active_count(), 1);

        drop(resp);
        // The slot frees once the forwarder drops the subscription.
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while server.manager().active_count() != 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let config = ServerConfig {
            allow_origin: "https://maps.example.com".into(),
            ..ServerConfig::default()
        };
        let server = HubcastServer::new(config, Arc::new(MemoryBackbone::new()));
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://maps.example.com")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().unwrap().oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://maps.example.com"
        );
    }

    #[tokio::test]
    async fn cors_wildcard_by_default() {
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://anywhere.example")
            .body(Body::empty())
            .unwrap();
        let resp = make_server().router().unwrap().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn invalid_origin_is_rejected() {
        let config = ServerConfig {
            allow_origin: "bad\norigin".into(),
            ..ServerConfig::default()
        };
        let server = HubcastServer::new(config, Arc::new(MemoryBackbone::new()));
        assert!(matches!(
            server.router(),
            Err(ServerError::InvalidOrigin(_))
        ));
    }

    #[tokio::test]
    async fn capacity_refusal_is_503() {
        let config = ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        };
        let server = HubcastServer::new(config, Arc::new(MemoryBackbone::new()));
        let router = server.router().unwrap();

        let first = get(router.clone(), "/sse").await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = get(router, "/sse").await;
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_handle() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(crate::metrics::EVENTS_DELIVERED_TOTAL).increment(3);
        });
        let server = make_server().with_metrics(handle);

        let resp = get(server.router().unwrap(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("hubcast_events_delivered_total 3"));
    }

    #[tokio::test]
    async fn metrics_endpoint_without_recorder_is_404() {
        let resp = get(make_server().router().unwrap(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let resp = get(make_server().router().unwrap(), "/nonexistent").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

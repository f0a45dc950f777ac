//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup before
/// any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// SSE streams accepted (counter).
pub const SSE_CONNECTIONS_TOTAL: &str = "hubcast_sse_connections_total";
/// SSE streams ended (counter).
pub const SSE_DISCONNECTIONS_TOTAL: &str = "hubcast_sse_disconnections_total";
/// Live backbone subscriptions (gauge).
pub const SUBSCRIPTIONS_ACTIVE: &str = "hubcast_subscriptions_active";
/// Events queued to a client (counter).
pub const EVENTS_DELIVERED_TOTAL: &str = "hubcast_events_delivered_total";
/// Events dropped on a full send queue (counter).
pub const EVENTS_DROPPED_TOTAL: &str = "hubcast_events_dropped_total";
/// Channel messages rejected by the codec (counter, labels: kind).
pub const DECODE_ERRORS_TOTAL: &str = "hubcast_decode_errors_total";
/// Backbone failures (counter, labels: kind).
pub const BACKBONE_ERRORS_TOTAL: &str = "hubcast_backbone_errors_total";
/// Streams refused at capacity or during shutdown (counter).
pub const CONNECTIONS_REJECTED_TOTAL: &str = "hubcast_connections_rejected_total";
/// Stream lifetime in seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "hubcast_connection_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(SSE_CONNECTIONS_TOTAL).increment(2);
            metrics::counter!(DECODE_ERRORS_TOTAL, "kind" => "invalid_count").increment(1);
        });
        let output = handle.render();
        assert!(output.contains("hubcast_sse_connections_total 2"));
        assert!(output.contains(r#"hubcast_decode_errors_total{kind="invalid_count"} 1"#));
    }

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        let names = [
            SSE_CONNECTIONS_TOTAL,
            SSE_DISCONNECTIONS_TOTAL,
            SUBSCRIPTIONS_ACTIVE,
            EVENTS_DELIVERED_TOTAL,
            EVENTS_DROPPED_TOTAL,
            DECODE_ERRORS_TOTAL,
            BACKBONE_ERRORS_TOTAL,
            CONNECTIONS_REJECTED_TOTAL,
            CONNECTION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(name.starts_with("hubcast_"), "{name} lacks prefix");
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}

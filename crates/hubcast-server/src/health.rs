//! `/health` endpoint.
//!
//! Reports liveness plus the number of open `/sse` streams. A stream counts
//! until its backbone subscription has been released.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the relay is running.
    pub status: String,
    /// Seconds since the relay started.
    pub uptime_secs: u64,
    /// Open SSE streams, each holding one backbone subscription.
    pub connections: usize,
}

/// Build a health response from the relay's start time and open stream count.
pub fn health_check(start_time: Instant, open_streams: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: open_streams,
    }
}

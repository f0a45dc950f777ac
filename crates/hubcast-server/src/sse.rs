//! `GET /sse` stream transport.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::warn;

use crate::server::AppState;
use crate::subscription::StreamFrame;

/// SSE event name for stream-closing failures.
const ERROR_EVENT: &str = "error";

impl StreamFrame {
    /// Render as an SSE event.
    pub fn into_event(self) -> Event {
        match self {
            Self::Data(json) => Event::default().data(json),
            Self::Error(json) => Event::default().event(ERROR_EVENT).data(json),
        }
    }
}

/// GET /sse
pub(crate) async fn sse_handler(State(state): State<AppState>) -> Response {
    let stream = match state.manager.on_connect().await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(kind = err.kind(), error = %err, "refusing stream");
            return (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response();
        }
    };

    let events = stream.map(|frame| Ok::<_, Infallible>(frame.into_event()));
    let sse = Sse::new(events);
    let headers = [(header::CACHE_CONTROL, "no-cache")];
    match state.keep_alive {
        Some(interval) => (headers, sse.keep_alive(KeepAlive::new().interval(interval))).into_response(),
        None => (headers, sse).into_response(),
    }
}

//! Projection feed: SSE frames in, merged projection out.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use hubcast_core::text::preview;
use hubcast_core::{ClientProjection, DecodedEvent, Envelope};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::{debug, info, warn};

use crate::errors::ClientError;
use crate::sse::{SseFrame, parse_frames};

/// SSE event name the relay uses for stream-closing failures.
const ERROR_EVENT: &str = "error";
/// Default SSE event name.
const MESSAGE_EVENT: &str = "message";

type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, ClientError>> + Send>>;

/// One stream connection's view of the hub counts.
///
/// Starts with an empty projection. Reconnecting means building a new feed,
/// so a new connection never inherits cells from an earlier one.
pub struct ProjectionFeed {
    frames: FrameStream,
    projection: ClientProjection,
    finished: bool,
}

impl ProjectionFeed {
    /// Feed over raw SSE bytes.
    pub fn new<S>(byte_stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + Unpin + 'static,
    {
        Self {
            frames: Box::pin(parse_frames(byte_stream)),
            projection: ClientProjection::new(),
            finished: false,
        }
    }

    /// The merged view so far.
    pub fn projection(&self) -> &ClientProjection {
        &self.projection
    }

    /// Consume the feed, keeping the projection.
    pub fn into_projection(self) -> ClientProjection {
        self.projection
    }

    /// Wait for the next count update, merge it, and return it.
    ///
    /// `Ok(None)` when the stream ends. An `error` event from the relay or a
    /// transport failure is returned once; the feed is finished after that.
    pub async fn next_event(&mut self) -> Result<Option<DecodedEvent>, ClientError> {
        while !self.finished {
            let Some(frame) = self.frames.next().await else {
                self.finished = true;
                break;
            };
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    self.finished = true;
                    return Err(err);
                }
            };

            match self.handle_frame(frame) {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => {}
                Err(err) => {
                    self.finished = true;
                    return Err(err);
                }
            }
        }
        Ok(None)
    }

    fn handle_frame(&mut self, frame: SseFrame) -> Result<Option<DecodedEvent>, ClientError> {
        match frame.event.as_deref() {
            None | Some(MESSAGE_EVENT) => {}
            Some(ERROR_EVENT) => {
                let message = match Envelope::parse(&frame.data) {
                    Ok(Envelope::Error { message }) => message,
                    _ => frame.data,
                };
                return Err(ClientError::Stream(message));
            }
            Some(other) => {
                debug!(event = other, "skipping SSE event");
                return Ok(None);
            }
        }

        let envelope = match Envelope::parse(&frame.data) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(
                    error = %err,
                    preview = %preview(&frame.data, 80),
                    "skipping malformed envelope"
                );
                return Ok(None);
            }
        };
        if let Envelope::Error { message } = envelope {
            return Err(ClientError::Stream(message));
        }

        let type_tag = envelope.type_tag();
        let Some(event) = envelope.into_event() else {
            debug!(envelope_type = type_tag, "skipping envelope");
            return Ok(None);
        };
        self.projection.apply(&event);
        Ok(Some(event))
    }
}

/// Open `url` as an event stream with a shared `reqwest` client.
pub async fn connect_with(client: &reqwest::Client, url: &str) -> Result<ProjectionFeed, ClientError> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }

    info!(url, "stream opened");
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(ClientError::from));
    Ok(ProjectionFeed::new(bytes))
}

/// Open `url` as an event stream.
pub async fn connect(url: &str) -> Result<ProjectionFeed, ClientError> {
    connect_with(&reqwest::Client::new(), url).await
}

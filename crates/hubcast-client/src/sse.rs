//! # SSE Frame Parser
//!
//! Turns a chunked byte stream into complete Server-Sent Events frames:
//! - Line buffering across chunk boundaries (`\n` or `\r\n`)
//! - `event:` name tracking and multi-line `data:` joining
//! - Comment lines (`: keep-alive`) and unknown fields ignored
//! - A frame is dispatched on a blank line; a trailing partial frame at
//!   end of stream is discarded

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::errors::ClientError;

/// One dispatched SSE frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` name, if the frame set one.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Accumulates field lines until a blank line completes a frame.
#[derive(Debug, Default)]
struct FrameBuilder {
    event: Option<String>,
    data: Vec<String>,
}

impl FrameBuilder {
    fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

/// Parse SSE frames out of a byte stream.
///
/// A transport error is yielded once and ends the stream.
pub fn parse_frames<S>(byte_stream: S) -> impl Stream<Item = Result<SseFrame, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, ClientError>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (
            byte_stream,
            BytesMut::with_capacity(8192),
            FrameBuilder::default(),
            false,
        ),
        |(mut stream, mut buffer, mut builder, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue;
                    };
                    if let Some(frame) = builder.push_line(line) {
                        return Some((Ok(frame), (stream, buffer, builder, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, builder, true))),
                    None => return None,
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn frames(chunks: &[&'static str]) -> Vec<SseFrame> {
        let stream = futures::stream::iter(
            chunks
                .iter()
                .copied()
                .map(|c| Ok::<_, ClientError>(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        );
        parse_frames(stream)
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    fn data(s: &str) -> SseFrame {
        SseFrame {
            event: None,
            data: s.into(),
        }
    }

    // ── FrameBuilder ─────────────────────────────────────────────────────

    #[test]
    fn builder_dispatches_on_blank_line() {
        let mut b = FrameBuilder::default();
        assert_eq!(b.push_line("data: {\"a\":1}"), None);
        assert_eq!(b.push_line(""), Some(data("{\"a\":1}")));
        assert_eq!(b.push_line(""), None);
    }

    #[test]
    fn builder_value_without_space() {
        let mut b = FrameBuilder::default();
        let _ = b.push_line("data:x");
        assert_eq!(b.push_line(""), Some(data("x")));
    }

    #[test]
    fn builder_keeps_second_space() {
        let mut b = FrameBuilder::default();
        let _ = b.push_line("data:  x");
        assert_eq!(b.push_line(""), Some(data(" x")));
    }

    #[test]
    fn builder_event_without_data_is_dropped() {
        let mut b = FrameBuilder::default();
        let _ = b.push_line("event: ping");
        assert_eq!(b.push_line(""), None);
        let _ = b.push_line("data: 1");
        assert_eq!(b.push_line(""), Some(data("1")));
    }

    #[test]
    fn builder_ignores_id_and_retry() {
        let mut b = FrameBuilder::default();
        let _ = b.push_line("id: 7");
        let _ = b.push_line("retry: 1000");
        let _ = b.push_line("data: ok");
        assert_eq!(b.push_line(""), Some(data("ok")));
    }

    // ── parse_frames ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn multiple_frames_in_one_chunk() {
        let got = frames(&["data: {\"a\":1}\n\ndata: {\"b\":2}\n\n"]).await;
        assert_eq!(got, vec![data("{\"a\":1}"), data("{\"b\":2}")]);
    }

    #[tokio::test]
    async fn frame_split_across_chunks() {
        let got = frames(&["da", "ta: {\"par", "tial\":true}\n", "\n"]).await;
        assert_eq!(got, vec![data("{\"partial\":true}")]);
    }

    #[tokio::test]
    async fn crlf_line_endings() {
        let got = frames(&["data: {\"cr\":true}\r\n\r\n"]).await;
        assert_eq!(got, vec![data("{\"cr\":true}")]);
    }

    #[tokio::test]
    async fn comments_are_ignored() {
        let got = frames(&[":\n\n: keep-alive\n\ndata: 1\n\n"]).await;
        assert_eq!(got, vec![data("1")]);
    }

    #[tokio::test]
    async fn multi_line_data_is_joined() {
        let got = frames(&["data: line one\ndata: line two\n\n"]).await;
        assert_eq!(got, vec![data("line one\nline two")]);
    }

    #[tokio::test]
    async fn event_name_is_tracked_per_frame() {
        let got = frames(&["event: error\ndata: {\"type\":\"error\"}\n\ndata: 2\n\n"]).await;
        assert_eq!(
            got,
            vec![
                SseFrame {
                    event: Some("error".into()),
                    data: "{\"type\":\"error\"}".into(),
                },
                data("2"),
            ]
        );
    }

    #[tokio::test]
    async fn trailing_partial_frame_is_discarded() {
        let got = frames(&["data: 1\n\ndata: 2"]).await;
        assert_eq!(got, vec![data("1")]);
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        assert!(frames(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let chunks = vec![
            Ok(Bytes::from_static(b"data: 1\n\n")),
            Err(ClientError::Stream("reset".into())),
            Ok(Bytes::from_static(b"data: 2\n\n")),
        ];
        let results: Vec<_> = parse_frames(futures::stream::iter(chunks)).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &data("1"));
        assert!(matches!(results[1], Err(ClientError::Stream(_))));
    }
}

//! # hubcast-client
//!
//! Consumes the relay's `/sse` stream and keeps a [`ClientProjection`] of
//! the latest count per geohash.
//!
//! - [`sse::parse_frames`] turns response bytes into SSE frames
//! - [`ProjectionFeed`] decodes envelopes and merges them
//! - [`connect`] opens the stream over HTTP
//!
//! [`ClientProjection`]: hubcast_core::ClientProjection

#![deny(unsafe_code)]

pub mod errors;
pub mod feed;
pub mod sse;

pub use errors::ClientError;
pub use feed::{ProjectionFeed, connect, connect_with};
pub use sse::SseFrame;

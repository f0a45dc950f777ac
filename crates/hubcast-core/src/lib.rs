//! # hubcast-core
//!
//! Shared vocabulary for the hub count relay:
//!
//! - **Codec**: [`codec::decode`] turns a raw channel message into a [`DecodedEvent`]
//! - **Envelopes**: [`Envelope`] is the JSON shape pushed over the stream and
//!   parsed back on the client
//! - **Projection**: [`ClientProjection`] merges events into the latest count per geohash
//! - **Opacity**: [`OpacityScale`] maps a count to a fill opacity
//! - **Errors**: [`CodecError`] and [`EnvelopeError`]

#![deny(unsafe_code)]

pub mod codec;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod opacity;
pub mod projection;
pub mod text;

pub use codec::decode;
pub use envelope::Envelope;
pub use errors::{CodecError, EnvelopeError};
pub use events::{CellCount, DecodedEvent};
pub use opacity::OpacityScale;
pub use projection::{ClientProjection, apply_event};

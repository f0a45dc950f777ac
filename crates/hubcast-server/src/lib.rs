//! # hubcast-server
//!
//! Relays hub count messages from a pub/sub channel to browser clients over
//! Server-Sent Events.
//!
//! - **Backbone**: [`Backbone`] abstracts the channel; [`RedisBackbone`] for
//!   production, [`MemoryBackbone`] for tests and local runs
//! - **Subscriptions**: [`SubscriptionManager`] gives every stream its own
//!   subscription and tears it down exactly once
//! - **Transport**: `GET /sse` plus `/health` and `/metrics`, served by
//!   [`HubcastServer`]

#![deny(unsafe_code)]

pub mod backbone;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod sse;
pub mod subscription;

pub use backbone::{Backbone, MemoryBackbone, MessageStream, RedisBackbone};
pub use config::ServerConfig;
pub use errors::{BackboneError, ServerError};
pub use server::{HubcastServer, ServerHandle};
pub use subscription::{ClientId, ClientStream, StreamFrame, SubscriptionManager};

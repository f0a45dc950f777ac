//! Pub/sub backbone.
//!
//! A [`Backbone`] hands out one independent subscription per call. Dropping
//! the returned [`MessageStream`] releases the subscription.
//!
//! - [`RedisBackbone`]: one dedicated Redis pub/sub connection per subscription
//! - [`MemoryBackbone`]: in-process channels with the same semantics, for
//!   embedding and tests

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::errors::BackboneError;

/// Raw channel messages for one subscription.
///
/// Ends when the subscription is lost. `Err` items with
/// [`BackboneError::is_fatal`] end the subscription too.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String, BackboneError>> + Send>>;

/// Source of per-client channel subscriptions.
#[async_trait]
pub trait Backbone: Send + Sync + 'static {
    /// Open a fresh subscription to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BackboneError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Redis
// ─────────────────────────────────────────────────────────────────────────────

/// Redis pub/sub backbone.
///
/// The client handle is shared; every subscription gets its own connection,
/// which is closed when the stream is dropped.
pub struct RedisBackbone {
    client: redis::Client,
}

impl fmt::Debug for RedisBackbone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackbone")
            .field("addr", &self.client.get_connection_info().addr)
            .finish()
    }
}

impl RedisBackbone {
    /// Build from a `redis://host:port/` URL. Does not connect yet.
    pub fn open(url: &str) -> Result<Self, BackboneError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Backbone for RedisBackbone {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BackboneError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel, "redis subscription established");

        let messages = pubsub.into_on_message().map(|msg| {
            msg.get_payload::<String>()
                .map_err(|e| BackboneError::Payload(e.to_string()))
        });
        // The pub/sub connection ending is the only loss signal redis gives us.
        let lost = futures::stream::once(async {
            Err(BackboneError::Lost("redis connection closed".into()))
        });
        Ok(Box::pin(messages.chain(lost)))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process
// ─────────────────────────────────────────────────────────────────────────────

/// Per-channel queue depth for [`MemoryBackbone`].
const MEMORY_CHANNEL_CAPACITY: usize = 1024;

/// In-process backbone.
///
/// Each subscription is a broadcast receiver, so
/// [`subscriber_count`](Self::subscriber_count) drops as soon as a stream is
/// released.
pub struct MemoryBackbone {
    channels: DashMap<String, broadcast::Sender<String>>,
    available: AtomicBool,
}

impl MemoryBackbone {
    /// Empty backbone accepting subscriptions.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(MEMORY_CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, channel: &str, message: impl Into<String>) -> usize {
        self.channels
            .get(channel)
            .and_then(|tx| tx.send(message.into()).ok())
            .unwrap_or(0)
    }

    /// Live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Make new subscriptions fail with [`BackboneError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// End every subscription on `channel`, as if the connection dropped.
    pub fn disconnect(&self, channel: &str) {
        let _ = self.channels.remove(channel);
    }
}

impl Default for MemoryBackbone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backbone for MemoryBackbone {
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, BackboneError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(BackboneError::Unavailable("memory backbone offline".into()));
        }
        let rx = self.sender(channel).subscribe();
        let channel = channel.to_owned();

        let messages = futures::stream::unfold(Some(rx), move |state| {
            let channel = channel.clone();
            async move {
                let mut rx = state?;
                loop {
                    match rx.recv().await {
                        Ok(msg) => return Some((Ok(msg), Some(rx))),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %channel, skipped, "subscriber lagged, messages skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            let lost = BackboneError::Lost(format!("channel {channel} closed"));
                            return Some((Err(lost), None));
                        }
                    }
                }
            }
        });
        Ok(Box::pin(messages))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn publish_reaches_every_subscription() {
        let backbone = MemoryBackbone::new();
        let mut a = backbone.subscribe("hub-counts").await.unwrap();
        let mut b = backbone.subscribe("hub-counts").await.unwrap();

        assert_eq!(backbone.publish("hub-counts", "u4pru:1"), 2);
        assert_eq!(a.next().await, Some(Ok("u4pru:1".into())));
        assert_eq!(b.next().await, Some(Ok("u4pru:1".into())));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let backbone = MemoryBackbone::new();
        let _a = backbone.subscribe("hub-counts").await.unwrap();
        assert_eq!(backbone.publish("other", "x:1"), 0);
        assert_eq!(backbone.subscriber_count("other"), 0);
    }

    #[tokio::test]
    async fn dropping_a_stream_releases_it() {
        let backbone = MemoryBackbone::new();
        let a = backbone.subscribe("c").await.unwrap();
        let b = backbone.subscribe("c").await.unwrap();
        assert_eq!(backbone.subscriber_count("c"), 2);
        drop(a);
        assert_eq!(backbone.subscriber_count("c"), 1);
        drop(b);
        assert_eq!(backbone.subscriber_count("c"), 0);
    }

    #[tokio::test]
    async fn disconnect_ends_streams_with_lost() {
        let backbone = MemoryBackbone::new();
        let mut a = backbone.subscribe("c").await.unwrap();
        backbone.disconnect("c");
        assert_matches!(a.next().await, Some(Err(BackboneError::Lost(_))));
        assert!(a.next().await.is_none());
    }

    #[tokio::test]
    async fn unavailable_refuses_subscriptions() {
        let backbone = MemoryBackbone::new();
        backbone.set_available(false);
        assert_matches!(
            backbone.subscribe("c").await.err(),
            Some(BackboneError::Unavailable(_))
        );
        backbone.set_available(true);
        assert!(backbone.subscribe("c").await.is_ok());
    }

    #[test]
    fn redis_open_rejects_bad_url() {
        assert_matches!(
            RedisBackbone::open("not-a-url"),
            Err(BackboneError::Unavailable(_))
        );
        assert!(RedisBackbone::open("redis://localhost:6379/").is_ok());
    }
}

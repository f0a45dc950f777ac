//! Per-client subscription lifecycle.
//!
//! Every stream connection gets its own backbone subscription and one task
//! that decodes messages and pushes them into that client's bounded queue.
//! Nothing is shared between subscriptions except the backbone handle.
//!
//! Teardown order on disconnect: the task stops listening, drops the
//! subscription, frees the client's slot, then drops the queue sender, which
//! closes the stream. A client counts as active until its subscription is
//! gone.

use std::fmt;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use chrono::{SubsecRound, Utc};
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use hubcast_core::text::preview;
use hubcast_core::{Envelope, decode};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::backbone::{Backbone, MessageStream};
use crate::errors::{BackboneError, ServerError};
use crate::metrics::{
    BACKBONE_ERRORS_TOTAL, CONNECTION_DURATION_SECONDS, CONNECTIONS_REJECTED_TOTAL,
    DECODE_ERRORS_TOTAL, EVENTS_DELIVERED_TOTAL, EVENTS_DROPPED_TOTAL, SSE_CONNECTIONS_TOTAL,
    SSE_DISCONNECTIONS_TOTAL, SUBSCRIPTIONS_ACTIVE,
};

/// Longest raw-message preview in logs.
const LOG_PREVIEW_BYTES: usize = 80;

/// Opaque per-connection identifier, `client_<uuid-v7>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Fresh identifier.
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One frame queued for a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFrame {
    /// An envelope JSON payload.
    Data(String),
    /// A stream-closing error envelope JSON payload, sent as `event: error`.
    Error(String),
}

impl StreamFrame {
    fn error(message: &str) -> Self {
        let json = Envelope::error(message)
            .to_json()
            .unwrap_or_else(|_| r#"{"type":"error","message":"internal error"}"#.to_owned());
        Self::Error(json)
    }
}

/// Subscription manager tuning.
#[derive(Clone, Debug)]
pub struct SubscriptionSettings {
    /// Channel to subscribe to.
    pub channel: String,
    /// Per-client queue depth.
    pub queue_capacity: usize,
    /// Concurrent stream cap.
    pub max_connections: usize,
    /// Bound on establishing a subscription.
    pub connect_timeout: Duration,
}

struct ActiveSubscription {
    cancel: CancellationToken,
    released: CancellationToken,
    connected_at: Instant,
}

/// Owns every live subscription.
pub struct SubscriptionManager {
    backbone: Arc<dyn Backbone>,
    settings: SubscriptionSettings,
    active: DashMap<ClientId, ActiveSubscription>,
    reserved: AtomicUsize,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl SubscriptionManager {
    /// Create a manager over `backbone`.
    pub fn new(backbone: Arc<dyn Backbone>, settings: SubscriptionSettings) -> Arc<Self> {
        Arc::new(Self {
            backbone,
            settings,
            active: DashMap::new(),
            reserved: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Channel every subscription listens on.
    pub fn channel(&self) -> &str {
        &self.settings.channel
    }

    /// Live subscriptions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Open a stream for a new client.
    ///
    /// The backbone subscription is established before this returns. If it
    /// cannot be, the stream carries a single error frame and then ends.
    /// Fails only when the manager is at capacity or shutting down.
    pub async fn on_connect(self: &Arc<Self>) -> Result<ClientStream, ServerError> {
        if self.is_shutting_down() {
            counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
            return Err(ServerError::ShuttingDown);
        }
        self.reserve_slot()?;

        let client_id = ClientId::new();
        let cancel = self.shutdown.child_token();
        let _ = self.active.insert(
            client_id.clone(),
            ActiveSubscription {
                cancel: cancel.clone(),
                released: CancellationToken::new(),
                connected_at: Instant::now(),
            },
        );
        counter!(SSE_CONNECTIONS_TOTAL).increment(1);
        gauge!(SUBSCRIPTIONS_ACTIVE).increment(1.0);

        let (tx, rx) = mpsc::channel(self.settings.queue_capacity.max(1));
        let stream = ClientStream {
            client_id: client_id.clone(),
            frames: ReceiverStream::new(rx),
            manager: Arc::downgrade(self),
        };

        match self.subscribe(&cancel).await {
            Ok(messages) => {
                info!(client_id = %client_id, channel = %self.channel(), "client connected");
                let manager = Arc::clone(self);
                let _ = self
                    .tasks
                    .spawn(manager.forward(client_id, messages, tx, cancel));
            }
            Err(err) => {
                Self::record_backbone_error(&client_id, &err);
                // Fresh queue, so the frame always fits.
                let _ = tx.try_send(StreamFrame::error(&err.to_string()));
                self.release(&client_id);
                drop(tx);
            }
        }
        Ok(stream)
    }

    /// Start tearing down a client's subscription. Idempotent.
    ///
    /// Returns immediately; the client stays in [`active_count`](Self::active_count)
    /// until its backbone subscription has been dropped.
    pub fn on_disconnect(&self, client_id: &ClientId) {
        if let Some(entry) = self.active.get(client_id) {
            entry.cancel.cancel();
        }
    }

    /// [`on_disconnect`](Self::on_disconnect), then wait until the
    /// subscription is released and the slot is free.
    pub async fn disconnect(&self, client_id: &ClientId) {
        let released = self.active.get(client_id).map(|entry| {
            entry.cancel.cancel();
            entry.released.clone()
        });
        if let Some(released) = released {
            released.cancelled().await;
        }
    }

    /// Cancel every subscription and wait up to `timeout` for their tasks.
    ///
    /// New connections are refused from this point on.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.cancel();
        let _ = self.tasks.close();
        info!(
            active = self.active_count(),
            timeout_secs = timeout.as_secs(),
            "waiting for subscription tasks to finish"
        );
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some subscriptions may still be running");
        }
    }

    fn reserve_slot(&self) -> Result<(), ServerError> {
        let max = self.settings.max_connections;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| {
                counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
                warn!(limit = max, "stream refused, at capacity");
                ServerError::AtCapacity(max)
            })
    }

    /// Remove the entry and free its slot once the subscription is dropped.
    fn release(&self, client_id: &ClientId) {
        let Some((_, entry)) = self.active.remove(client_id) else {
            return;
        };
        let _ = self.reserved.fetch_sub(1, Ordering::AcqRel);
        counter!(SSE_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(SUBSCRIPTIONS_ACTIVE).decrement(1.0);
        histogram!(CONNECTION_DURATION_SECONDS).record(entry.connected_at.elapsed().as_secs_f64());
        entry.released.cancel();
        info!(client_id = %client_id, "client disconnected");
    }

    async fn subscribe(&self, cancel: &CancellationToken) -> Result<MessageStream, BackboneError> {
        let timeout = self.settings.connect_timeout;
        tokio::select! {
            () = cancel.cancelled() => Err(BackboneError::Unavailable("server is shutting down".into())),
            res = tokio::time::timeout(timeout, self.backbone.subscribe(self.channel())) => {
                res.unwrap_or(Err(BackboneError::Timeout(timeout)))
            }
        }
    }

    async fn forward(
        self: Arc<Self>,
        client_id: ClientId,
        mut messages: MessageStream,
        tx: mpsc::Sender<StreamFrame>,
        cancel: CancellationToken,
    ) {
        let failure = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(client_id = %client_id, "subscription cancelled");
                    break None;
                }
                next = messages.next() => match next {
                    Some(Ok(raw)) => {
                        if Self::deliver(&client_id, &raw, &tx).is_break() {
                            break None;
                        }
                    }
                    Some(Err(err)) if !err.is_fatal() => Self::record_backbone_error(&client_id, &err),
                    Some(Err(err)) => break Some(err),
                    None => break Some(BackboneError::Lost("subscription ended".into())),
                }
            }
        };
        drop(messages);
        self.release(&client_id);

        // Waits for queue space. Gives up if the client leaves or on shutdown.
        if let Some(err) = failure {
            Self::record_backbone_error(&client_id, &err);
            tokio::select! {
                () = cancel.cancelled() => {}
                _ = tx.send(StreamFrame::error(&err.to_string())) => {}
            }
        }
        drop(tx);
    }

    fn deliver(
        client_id: &ClientId,
        raw: &str,
        tx: &mpsc::Sender<StreamFrame>,
    ) -> ControlFlow<()> {
        let received_at = Utc::now().trunc_subsecs(3);
        let event = match decode(raw, received_at) {
            Ok(event) => event,
            Err(err) => {
                counter!(DECODE_ERRORS_TOTAL, "kind" => err.kind()).increment(1);
                warn!(
                    client_id = %client_id,
                    kind = err.kind(),
                    error = %err,
                    preview = %preview(raw, LOG_PREVIEW_BYTES),
                    "dropping malformed message"
                );
                return ControlFlow::Continue(());
            }
        };
        let type_tag = event.type_tag();
        let cells = event.cell_count();
        let json = match Envelope::from(event).to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "failed to serialize envelope");
                return ControlFlow::Continue(());
            }
        };
        match tx.try_send(StreamFrame::Data(json)) {
            Ok(()) => {
                counter!(EVENTS_DELIVERED_TOTAL).increment(1);
                trace!(client_id = %client_id, event_type = type_tag, cells, "event queued");
                ControlFlow::Continue(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                counter!(EVENTS_DROPPED_TOTAL).increment(1);
                warn!(client_id = %client_id, event_type = type_tag, "send queue full, dropping event");
                ControlFlow::Continue(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => ControlFlow::Break(()),
        }
    }

    fn record_backbone_error(client_id: &ClientId, err: &BackboneError) {
        counter!(BACKBONE_ERRORS_TOTAL, "kind" => err.kind()).increment(1);
        if err.is_fatal() {
            error!(client_id = %client_id, kind = err.kind(), error = %err, "backbone subscription failed");
        } else {
            warn!(client_id = %client_id, kind = err.kind(), error = %err, "skipping unreadable message");
        }
    }
}

/// The frame stream for one client.
///
/// Dropping it disconnects the client: axum drops the response body as soon
/// as the connection closes, which lands here.
pub struct ClientStream {
    client_id: ClientId,
    frames: ReceiverStream<StreamFrame>,
    manager: Weak<SubscriptionManager>,
}

impl fmt::Debug for ClientStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStream")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ClientStream {
    /// The connection's identifier.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

impl Stream for ClientStream {
    type Item = StreamFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames).poll_next(cx)
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_disconnect(&self.client_id);
        }
    }
}

//! Message queue interface and the in-memory at-least-once queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use relay_core::BoxFuture;

use crate::error::{TransportError, TransportResult};

/// A message handed out by [`MessageQueue::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    /// Opaque handle that acknowledges this particular delivery.
    pub receipt_handle: String,
}

/// At-least-once message queue with named channels.
pub trait MessageQueue: Send + Sync {
    /// Append a message to `channel`.
    fn send<'a>(&'a self, channel: &'a str, body: &'a str) -> BoxFuture<'a, TransportResult<()>>;

    /// Long-poll `channel` for up to `max` messages.
    ///
    /// Returns as soon as at least one message is visible, or an empty
    /// batch once `wait` has elapsed.
    fn receive<'a>(
        &'a self,
        channel: &'a str,
        max: usize,
        wait: Duration,
    ) -> BoxFuture<'a, TransportResult<Vec<ReceivedMessage>>>;

    /// Acknowledge a delivery, removing the message for good.
    fn delete<'a>(
        &'a self,
        channel: &'a str,
        receipt_handle: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>>;

    /// Approximate number of messages currently visible on `channel`.
    fn approximate_depth<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, TransportResult<usize>>;
}

struct StoredMessage {
    id: u64,
    body: String,
    visible_at: Instant,
    /// Handle of the latest delivery, if the message was ever received.
    receipt: Option<String>,
    deliveries: u32,
}

struct QueueInner {
    channels: Mutex<HashMap<String, Vec<StoredMessage>>>,
    /// Woken on every send so long-polls can return early.
    arrivals: Notify,
    next_id: AtomicU64,
    visibility_timeout: Duration,
}

/// In-process queue with visibility timeouts and long-polling.
///
/// Cloning shares the same channels.
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<QueueInner>,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                channels: Mutex::new(HashMap::new()),
                arrivals: Notify::new(),
                next_id: AtomicU64::new(1),
                visibility_timeout,
            }),
        }
    }

    /// Total messages on `channel`, visible or in flight.
    pub fn len(&self, channel: &str) -> usize {
        self.lock_channels().get(channel).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, channel: &str) -> bool {
        self.len(channel) == 0
    }

    fn lock_channels(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<StoredMessage>>> {
        // A poisoned map is still structurally valid; keep serving.
        self.inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, channel: &str, body: &str) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_channels()
            .entry(channel.to_string())
            .or_default()
            .push(StoredMessage {
                id,
                body: body.to_string(),
                visible_at: Instant::now(),
                receipt: None,
                deliveries: 0,
            });
        trace!(%channel, id, "message enqueued");
        self.inner.arrivals.notify_waiters();
    }

    /// Claim up to `max` visible messages. Also returns the earliest instant
    /// at which an in-flight message becomes visible again.
    fn take_visible(&self, channel: &str, max: usize) -> (Vec<ReceivedMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut channels = self.lock_channels();
        let Some(messages) = channels.get_mut(channel) else {
            return (Vec::new(), None);
        };

        let mut batch = Vec::new();
        let mut next_visible: Option<Instant> = None;
        for msg in messages.iter_mut() {
            if msg.visible_at <= now {
                if batch.len() == max {
                    continue;
                }
                msg.deliveries += 1;
                msg.visible_at = now + self.inner.visibility_timeout;
                let handle = format!("{}-{}", msg.id, msg.deliveries);
                msg.receipt = Some(handle.clone());
                if msg.deliveries > 1 {
                    debug!(%channel, id = msg.id, deliveries = msg.deliveries, "message redelivered");
                }
                batch.push(ReceivedMessage {
                    body: msg.body.clone(),
                    receipt_handle: handle,
                });
            } else {
                next_visible = Some(next_visible.map_or(msg.visible_at, |t| t.min(msg.visible_at)));
            }
        }
        (batch, next_visible)
    }
}

impl MessageQueue for MemoryQueue {
    fn send<'a>(&'a self, channel: &'a str, body: &'a str) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            self.push(channel, body);
            Ok(())
        })
    }

    fn receive<'a>(
        &'a self,
        channel: &'a str,
        max: usize,
        wait: Duration,
    ) -> BoxFuture<'a, TransportResult<Vec<ReceivedMessage>>> {
        Box::pin(async move {
            let deadline = Instant::now() + wait;
            loop {
                // Register for arrivals before looking, so a send that lands
                // between the check and the sleep still wakes us.
                let arrival = self.inner.arrivals.notified();
                tokio::pin!(arrival);
                arrival.as_mut().enable();

                let (batch, next_visible) = self.take_visible(channel, max);
                if !batch.is_empty() || Instant::now() >= deadline {
                    return Ok(batch);
                }

                let wake_at = next_visible.map_or(deadline, |t| t.min(deadline));
                tokio::select! {
                    _ = &mut arrival => {}
                    _ = tokio::time::sleep_until(wake_at) => {}
                }
            }
        })
    }

    fn delete<'a>(
        &'a self,
        channel: &'a str,
        receipt_handle: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            let mut channels = self.lock_channels();
            let messages = channels.get_mut(channel);
            let position = messages.as_ref().and_then(|msgs| {
                msgs.iter()
                    .position(|m| m.receipt.as_deref() == Some(receipt_handle))
            });
            match (messages, position) {
                (Some(msgs), Some(idx)) => {
                    let msg = msgs.remove(idx);
                    trace!(%channel, id = msg.id, "message deleted");
                    Ok(())
                }
                _ => Err(TransportError::InvalidReceipt {
                    channel: channel.to_string(),
                    handle: receipt_handle.to_string(),
                }),
            }
        })
    }

    fn approximate_depth<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, TransportResult<usize>> {
        Box::pin(async move {
            let now = Instant::now();
            let depth = self
                .lock_channels()
                .get(channel)
                .map_or(0, |msgs| msgs.iter().filter(|m| m.visible_at <= now).count());
            Ok(depth)
        })
    }
}

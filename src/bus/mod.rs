// Message Bus - addressed publish/subscribe channels
//
// Delivery is at-most-once and best-effort: a message published on a channel
// with no attached subscriber is gone for good. There is no queueing, no
// replay for late subscribers and no acknowledgement. Callers that need
// progress guarantees must live with stalls (see the phase orchestrator).

pub mod channels;
pub mod message;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub use channels::{agent_channel, COMMAND_CHANNEL, HEARTBEAT_CHANNEL, PHASE_CHANNEL, STATUS_CHANNEL};
pub use message::{payload, Message, Payload, StatusUpdate};

/// Default per-channel buffer before slow subscribers start lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("message bus is closed")]
    Closed,
}

struct BusInner {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
    closed: AtomicBool,
}

/// In-process publish/subscribe bus shared by every agent task.
///
/// Cloning is cheap; all clones address the same set of channels.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("capacity", &self.inner.capacity)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Connectivity check used at startup; fails once the bus is closed
    pub fn ping(&self) -> Result<(), BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        Ok(())
    }

    /// Fire-and-forget publish.
    ///
    /// Returns how many subscribers the message was handed to. Zero means the
    /// message was dropped permanently.
    pub fn publish(&self, channel: &str, message: String) -> Result<usize, BusError> {
        self.ping()?;

        let mut channels = self.inner.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(channel) else {
            debug!(channel = %channel, "No subscribers, message dropped");
            return Ok(0);
        };

        match sender.send(message) {
            Ok(delivered) => Ok(delivered),
            Err(_) => {
                // Every subscriber went away; forget the channel so it does not accumulate.
                channels.remove(channel);
                debug!(channel = %channel, "Subscribers gone, message dropped");
                Ok(0)
            }
        }
    }

    /// Attach a new subscriber. It only observes messages published after
    /// this call returns.
    pub fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        self.ping()?;

        let mut channels = self.inner.channels.lock().unwrap_or_else(|e| e.into_inner());
        // channels whose subscribers all left and never saw another publish
        channels.retain(|name, sender| name == channel || sender.receiver_count() > 0);
        let capacity = self.inner.capacity;
        let receiver = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        Ok(Subscription {
            channel: channel.to_string(),
            receiver,
        })
    }

    /// Number of subscribers currently attached to `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.inner.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Channels currently holding a sender
    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Close the bus: pending subscriptions drain and then end, further
    /// publish/subscribe calls fail with [`BusError::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut channels = self.inner.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.clear();
    }
}

/// Lazy, infinite sequence of raw messages from one channel
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message. Returns `None` once the bus is closed.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` arm.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-delivered message, without waiting
    pub fn try_recv(&mut self) -> Option<String> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged, messages lost");
                }
                Err(_) => return None,
            }
        }
    }
}

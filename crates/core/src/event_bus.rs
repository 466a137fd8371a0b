//! Event queue abstraction: asynchronous publish/subscribe decoupling
//! ingestion from durable storage.
//!
//! `publish` succeeds once the message is handed to the transport, not once
//! it is stored. Subscribers see each message at least once; ordering is
//! best-effort FIFO per publisher/subscriber pair.

use crate::error::{KrakensError, KrakensResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// Stream of raw message payloads delivered to a subscriber.
pub type MessageStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Hand a payload to the transport. Fails with `Unavailable` when the
    /// transport cannot accept it.
    async fn publish(&self, topic: &str, payload: Bytes) -> KrakensResult<()>;

    /// Open a subscription. The stream ends when the transport closes it.
    async fn subscribe(&self, topic: &str) -> KrakensResult<MessageStream>;
}

/// Serialize `value` as JSON and publish it.
pub async fn publish_json<T: Serialize + ?Sized>(
    queue: &dyn EventQueue,
    topic: &str,
    value: &T,
) -> KrakensResult<()> {
    let payload = serde_json::to_vec(value)?;
    queue.publish(topic, Bytes::from(payload)).await
}

/// In-process queue. Used in standalone mode and as a test double; every
/// subscriber of a topic receives every message published after it
/// subscribed, like a core NATS subject.
pub struct MemoryQueue {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>>,
    available: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the transport going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .lock()
            .get(topic)
            .map(|subs| subs.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn publish(&self, topic: &str, payload: Bytes) -> KrakensResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(KrakensError::Unavailable("queue transport unreachable".into()));
        }
        let mut subscribers = self.subscribers.lock();
        if let Some(subs) = subscribers.get_mut(topic) {
            let before = subs.len();
            subs.retain(|tx| tx.send(payload.clone()).is_ok());
            if subs.len() < before {
                debug!(topic = topic, pruned = before - subs.len(), "Pruned closed subscribers");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> KrakensResult<MessageStream> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(KrakensError::Unavailable("queue transport unreachable".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

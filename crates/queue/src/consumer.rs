//! Background queue consumer: a cancellable Tokio task that subscribes to
//! the event subject and appends each message to the event store.
//!
//! Each message is persisted in its own task under a per-attempt timeout, so
//! one slow or panicking message never stalls the subscription. Failed
//! messages are logged, counted and dropped; there is no dead-letter path.

use bytes::Bytes;
use chrono::Utc;
use krakens_core::config::ConsumerConfig;
use krakens_core::{Event, EventQueue, EventStore, KrakensResult, MessageStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct EventConsumer {
    queue: Arc<dyn EventQueue>,
    store: Arc<dyn EventStore>,
    subject: String,
    config: ConsumerConfig,
}

/// Owns the running consumer task.
pub struct ConsumerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the consumer to stop and wait for in-flight persists to finish.
    /// A message still waiting for a free slot is dropped.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Event consumer task failed");
        }
    }
}

impl EventConsumer {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        store: Arc<dyn EventStore>,
        subject: impl Into<String>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            subject: subject.into(),
            config,
        }
    }

    /// Subscribe, then spawn the consume loop. The subscription is open by
    /// the time this returns, so nothing published afterwards is missed.
    pub async fn start(self, cancel: CancellationToken) -> KrakensResult<ConsumerHandle> {
        let stream = self.queue.subscribe(&self.subject).await?;

        info!(
            subject = %self.subject,
            max_in_flight = self.config.max_in_flight,
            "Event consumer started"
        );

        let task = tokio::spawn(self.run(stream, cancel.clone()));
        Ok(ConsumerHandle { cancel, task })
    }

    async fn run(self, mut stream: MessageStream, cancel: CancellationToken) {
        let limit = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let policy = PersistPolicy::from_config(&self.config);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join(joined);
                }
                msg = stream.next() => {
                    let Some(payload) = msg else {
                        warn!(subject = %self.subject, "Event subscription ended");
                        break;
                    };
                    let permit = tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!("Shutdown while waiting for a persist slot, message dropped");
                            metrics::counter!("consumer.dropped", "reason" => "shutdown").increment(1);
                            break;
                        }
                        permit = limit.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };
                    let store = self.store.clone();
                    in_flight.spawn(async move {
                        persist_message(store.as_ref(), payload, policy).await;
                        drop(permit);
                    });
                }
            }
        }

        debug!(pending = in_flight.len(), "Draining in-flight persists");
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        info!(subject = %self.subject, "Event consumer stopped");
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "Event persist task panicked");
            metrics::counter!("consumer.dropped", "reason" => "panic").increment(1);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PersistPolicy {
    timeout: Duration,
    max_attempts: u32,
    backoff_ms: u64,
}

impl PersistPolicy {
    fn from_config(config: &ConsumerConfig) -> Self {
        Self {
            timeout: config.persist_timeout(),
            max_attempts: config.max_attempts.max(1),
            backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Linear: `backoff_ms * attempt`.
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Decode, stamp with the durable timestamp and append. Never returns an
/// error: failures are logged and the message is dropped.
async fn persist_message(store: &dyn EventStore, payload: Bytes, policy: PersistPolicy) {
    let PersistPolicy {
        timeout,
        max_attempts,
        ..
    } = policy;
    let mut event: Event = match serde_json::from_slice(&payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, bytes = payload.len(), "Failed to deserialize event");
            metrics::counter!("consumer.dropped", "reason" => "decode").increment(1);
            return;
        }
    };
    event.timestamp = Some(Utc::now());

    for attempt in 1..=max_attempts {
        match tokio::time::timeout(timeout, store.append(&event)).await {
            Ok(Ok(())) => {
                metrics::counter!("consumer.persisted").increment(1);
                debug!(event_id = %event.event_id, domain_id = %event.domain_id, "Event persisted");
                return;
            }
            Ok(Err(e)) => {
                warn!(event_id = %event.event_id, attempt = attempt, error = %e, "Failed to save event");
            }
            Err(_) => {
                warn!(
                    event_id = %event.event_id,
                    attempt = attempt,
                    timeout_ms = timeout.as_millis() as u64,
                    "Saving event timed out"
                );
            }
        }
        if attempt < max_attempts {
            metrics::counter!("consumer.retries").increment(1);
            tokio::time::sleep(policy.backoff(attempt)).await;
        }
    }

    error!(
        event_id = %event.event_id,
        domain_id = %event.domain_id,
        attempts = max_attempts,
        "Dropping event after failed persistence"
    );
    metrics::counter!("consumer.dropped", "reason" => "store").increment(1);
}

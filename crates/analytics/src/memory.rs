//! In-memory event store for standalone mode and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use krakens_core::{Event, EventStore, KrakensError, KrakensResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
    available: AtomicBool,
    append_delay: Mutex<Option<Duration>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            append_delay: Mutex::new(None),
        }
    }

    /// Simulate the store going down. Reads and writes fail while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Simulate a slow store: every append sleeps this long first.
    pub fn set_append_delay(&self, delay: Option<Duration>) {
        *self.append_delay.lock() = delay;
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    fn check_available(&self) -> KrakensResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KrakensError::Store("event store unreachable".into()))
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

fn at_or_after(event: &Event, since: DateTime<Utc>) -> bool {
    event.timestamp.is_some_and(|ts| ts >= since)
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &Event) -> KrakensResult<()> {
        let delay = *self.append_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        if event.timestamp.is_none() {
            return Err(KrakensError::Store("event has no durable timestamp".into()));
        }
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn count_all(&self, domain_id: &str) -> KrakensResult<u64> {
        self.check_available()?;
        let count = self
            .events
            .read()
            .iter()
            .filter(|e| e.domain_id == domain_id)
            .count();
        Ok(count as u64)
    }

    async fn count_distinct_visitors(
        &self,
        domain_id: &str,
        since: DateTime<Utc>,
    ) -> KrakensResult<u64> {
        self.check_available()?;
        let events = self.events.read();
        let visitors: HashSet<&str> = events
            .iter()
            .filter(|e| e.domain_id == domain_id && at_or_after(e, since))
            .map(|e| e.visitor_id.as_str())
            .collect();
        Ok(visitors.len() as u64)
    }

    async fn query_recent(
        &self,
        domain_id: &str,
        since: DateTime<Utc>,
    ) -> KrakensResult<Vec<Event>> {
        self.check_available()?;
        let mut recent: Vec<Event> = self
            .events
            .read()
            .iter()
            .filter(|e| e.domain_id == domain_id && at_or_after(e, since))
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(recent)
    }
}

//! In-process active-visitor window backed by DashMap.
//! Each domain's window lives behind its own shard lock, so touches and
//! evict-then-count passes on one domain serialize while different domains
//! never contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use krakens_core::window::{window_cutoff, ActiveWindow};
use krakens_core::KrakensResult;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Time-ordered membership set for one domain.
#[derive(Default)]
struct DomainWindow {
    last_seen: HashMap<String, i64>,
    by_time: BTreeSet<(i64, String)>,
    /// Whole-window expiry, refreshed on every touch.
    expires_at: i64,
}

impl DomainWindow {
    /// Last-seen only moves forward; a late-arriving older touch is a no-op.
    fn upsert(&mut self, visitor_id: &str, at: i64) {
        match self.last_seen.get_mut(visitor_id) {
            Some(prev) if *prev >= at => {}
            Some(prev) => {
                self.by_time.remove(&(*prev, visitor_id.to_string()));
                *prev = at;
                self.by_time.insert((at, visitor_id.to_string()));
            }
            None => {
                self.last_seen.insert(visitor_id.to_string(), at);
                self.by_time.insert((at, visitor_id.to_string()));
            }
        }
    }

    /// Drop every member last seen strictly before `cutoff`.
    fn evict_before(&mut self, cutoff: i64) -> usize {
        let keep = self.by_time.split_off(&(cutoff, String::new()));
        let stale = std::mem::replace(&mut self.by_time, keep);
        for (_, visitor_id) in &stale {
            self.last_seen.remove(visitor_id);
        }
        stale.len()
    }

    fn len(&self) -> usize {
        self.last_seen.len()
    }
}

/// Single-process sliding-window tracker. Used in standalone mode and tests.
pub struct LocalWindow {
    domains: DashMap<String, DomainWindow>,
    ttl: Duration,
}

impl LocalWindow {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            domains: DashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// Remove whole domain windows whose expiry has passed. Call this
    /// periodically from a background task.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let before = self.domains.len();
        self.domains.retain(|_, window| window.expires_at > now_ms);
        before - self.domains.len()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[async_trait]
impl ActiveWindow for LocalWindow {
    async fn touch(
        &self,
        domain_id: &str,
        visitor_id: &str,
        now: DateTime<Utc>,
    ) -> KrakensResult<()> {
        let now_ms = now.timestamp_millis();
        let mut window = self.domains.entry(domain_id.to_string()).or_default();
        window.upsert(visitor_id, now_ms);
        window.expires_at = window
            .expires_at
            .max(now_ms.saturating_add(self.ttl_millis()));
        Ok(())
    }

    async fn active_count(
        &self,
        domain_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> KrakensResult<u64> {
        let now_ms = now.timestamp_millis();
        if self
            .domains
            .remove_if(domain_id, |_, w| w.expires_at <= now_ms)
            .is_some()
        {
            return Ok(0);
        }

        let cutoff = window_cutoff(now, window).timestamp_millis();
        let Some(mut entry) = self.domains.get_mut(domain_id) else {
            return Ok(0);
        };
        let evicted = entry.evict_before(cutoff);
        if evicted > 0 {
            metrics::counter!("window.evicted").increment(evicted as u64);
        }
        Ok(entry.len() as u64)
    }
}

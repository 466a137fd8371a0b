//! Realtime aggregator: live active-visitor count plus a fold over the last
//! hour of durable events. Nothing is cached; every call recomputes.

use crate::store_unavailable;
use chrono::{DateTime, Utc};
use krakens_core::config::TrackingConfig;
use krakens_core::identity::validate_domain_id;
use krakens_core::types::{HitsPerMinute, PageStats, ReferrerStats};
use krakens_core::window::window_cutoff;
use krakens_core::{ActiveWindow, Event, EventStore, KrakensResult, RealtimeStats};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RealtimeAggregator {
    window: Arc<dyn ActiveWindow>,
    store: Arc<dyn EventStore>,
    config: TrackingConfig,
}

impl RealtimeAggregator {
    pub fn new(
        window: Arc<dyn ActiveWindow>,
        store: Arc<dyn EventStore>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            window,
            store,
            config,
        }
    }

    pub async fn stats(&self, domain_id: &str) -> KrakensResult<RealtimeStats> {
        self.stats_at(domain_id, Utc::now()).await
    }

    pub async fn stats_at(&self, domain_id: &str, now: DateTime<Utc>) -> KrakensResult<RealtimeStats> {
        validate_domain_id(domain_id)?;

        let active_visitors = self.active_or_zero(domain_id, now).await;

        let since = window_cutoff(now, self.config.recent_span());
        let events = self
            .store
            .query_recent(domain_id, since)
            .await
            .map_err(store_unavailable)?;

        let mut stats = fold_events(&events, self.config.top_limit);
        stats.active_visitors = active_visitors;

        debug!(
            domain_id = domain_id,
            active = active_visitors,
            scanned = events.len(),
            "Realtime stats computed"
        );
        Ok(stats)
    }

    /// Raw active count for the public live-count surface. Errors propagate so
    /// the caller decides how to render a degraded tracker.
    pub async fn active_visitors(&self, domain_id: &str) -> KrakensResult<u64> {
        validate_domain_id(domain_id)?;
        self.window
            .active_count(domain_id, Utc::now(), self.config.active_window())
            .await
    }

    /// Live count is best-effort: a degraded tracker reads as zero.
    async fn active_or_zero(&self, domain_id: &str, now: DateTime<Utc>) -> u64 {
        match self
            .window
            .active_count(domain_id, now, self.config.active_window())
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(domain_id = domain_id, error = %e, "Active window unavailable, reporting zero");
                metrics::counter!("window.read_degraded").increment(1);
                0
            }
        }
    }
}

/// Fold recent events into page/referrer rankings, breakdown histograms and
/// per-minute buckets. `active_visitors` is left at zero.
pub fn fold_events(events: &[Event], top_limit: usize) -> RealtimeStats {
    let mut page_hits: HashMap<&str, u64> = HashMap::new();
    let mut referrer_hits: HashMap<&str, u64> = HashMap::new();
    let mut minutes: BTreeMap<String, u64> = BTreeMap::new();
    let mut stats = RealtimeStats::default();

    for event in events {
        *page_hits.entry(event.path.as_str()).or_default() += 1;
        if !event.referrer.is_empty() {
            *referrer_hits.entry(event.referrer.as_str()).or_default() += 1;
        }
        *stats.countries.entry(event.country.clone()).or_default() += 1;
        *stats.devices.entry(event.device.to_string()).or_default() += 1;
        *stats.browsers.entry(event.browser.to_string()).or_default() += 1;
        if let Some(ts) = event.timestamp {
            *minutes.entry(ts.format("%Y-%m-%dT%H:%M").to_string()).or_default() += 1;
        }
    }

    stats.top_pages = rank(page_hits, top_limit)
        .into_iter()
        .map(|(path, hits)| PageStats { path, hits })
        .collect();
    stats.top_referrers = rank(referrer_hits, top_limit)
        .into_iter()
        .map(|(referrer, hits)| ReferrerStats { referrer, hits })
        .collect();
    stats.hits_per_minute = minutes
        .into_iter()
        .map(|(minute, hits)| HitsPerMinute { minute, hits })
        .collect();

    stats
}

/// Hits descending, ties broken by key so output is deterministic.
fn rank(counts: HashMap<&str, u64>, limit: usize) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts
        .into_iter()
        .map(|(key, hits)| (key.to_string(), hits))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

//! Overview aggregator: long-horizon totals read straight from the event store.

use crate::store_unavailable;
use chrono::{DateTime, Utc};
use krakens_core::config::TrackingConfig;
use krakens_core::identity::validate_domain_id;
use krakens_core::window::window_cutoff;
use krakens_core::{EventStore, KrakensResult, OverviewStats};
use std::sync::Arc;
use tracing::debug;

pub struct OverviewAggregator {
    store: Arc<dyn EventStore>,
    config: TrackingConfig,
}

impl OverviewAggregator {
    pub fn new(store: Arc<dyn EventStore>, config: TrackingConfig) -> Self {
        Self { store, config }
    }

    pub async fn stats(&self, domain_id: &str) -> KrakensResult<OverviewStats> {
        self.stats_at(domain_id, Utc::now()).await
    }

    pub async fn stats_at(&self, domain_id: &str, now: DateTime<Utc>) -> KrakensResult<OverviewStats> {
        validate_domain_id(domain_id)?;

        let total_hits = self
            .store
            .count_all(domain_id)
            .await
            .map_err(store_unavailable)?;

        let since = window_cutoff(now, self.config.unique_visitor_span());
        let unique_visitors = self
            .store
            .count_distinct_visitors(domain_id, since)
            .await
            .map_err(store_unavailable)?;

        debug!(
            domain_id = domain_id,
            total_hits = total_hits,
            unique_visitors = unique_visitors,
            "Overview stats computed"
        );

        Ok(OverviewStats {
            total_hits,
            unique_visitors,
            avg_session_time: 0.0,
            bounce_rate: 0.0,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryEventStore;
    use chrono::TimeZone;
    use krakens_core::useragent::{Browser, DeviceClass};
    use krakens_core::{Event, KrakensError};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn event(visitor: &str, hours_ago: i64) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            domain_id: "d1".into(),
            timestamp: Some(t0() - chrono::Duration::hours(hours_ago)),
            ip_hash: String::new(),
            user_agent: String::new(),
            path: "/".into(),
            referrer: String::new(),
            country: "Unknown".into(),
            device: DeviceClass::Desktop,
            browser: Browser::Unknown,
            visitor_id: visitor.into(),
        }
    }

    #[tokio::test]
    async fn test_totals_and_unique_visitors() {
        let store = Arc::new(MemoryEventStore::new());
        for (visitor, hours_ago) in [("a", 1), ("a", 2), ("b", 3), ("c", 30), ("c", 40)] {
            store.append(&event(visitor, hours_ago)).await.unwrap();
        }

        let agg = OverviewAggregator::new(store, TrackingConfig::default());
        let stats = agg.stats_at("d1", t0()).await.unwrap();

        assert_eq!(stats.total_hits, 5);
        assert_eq!(stats.unique_visitors, 2);
        assert_eq!(stats.avg_session_time, 0.0);
        assert_eq!(stats.bounce_rate, 0.0);
    }

    #[tokio::test]
    async fn test_total_hits_never_decrease() {
        let store = Arc::new(MemoryEventStore::new());
        let agg = OverviewAggregator::new(store.clone(), TrackingConfig::default());

        let mut last = 0;
        for i in 0..10 {
            store.append(&event(&format!("v{i}"), i)).await.unwrap();
            let total = agg.stats_at("d1", t0()).await.unwrap().total_hits;
            assert!(total >= last);
            last = total;
        }
        assert_eq!(last, 10);
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let store = Arc::new(MemoryEventStore::new());
        store.set_available(false);
        let agg = OverviewAggregator::new(store, TrackingConfig::default());
        assert!(matches!(
            agg.stats_at("d1", t0()).await,
            Err(KrakensError::Unavailable(_))
        ));
    }
}

use crate::useragent::{Browser, DeviceClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Country recorded on every event until GeoIP resolution exists upstream.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// A single page view. Built by the ingestion gateway, persisted once by
/// the queue consumer, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: Uuid,
    pub domain_id: String,
    /// Assigned by the consumer at durable-write time. `None` while the
    /// event is still in flight through the queue.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub ip_hash: String,
    pub user_agent: String,
    pub path: String,
    #[serde(default)]
    pub referrer: String,
    pub country: String,
    pub device: DeviceClass,
    pub browser: Browser,
    pub visitor_id: String,
}

/// Beacon body posted by the embedded tracking script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub visitor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HitsPerMinute {
    /// UTC minute, formatted `YYYY-MM-DDTHH:MM`.
    pub minute: String,
    pub hits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageStats {
    pub path: String,
    pub hits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferrerStats {
    pub referrer: String,
    pub hits: u64,
}

/// Live dashboard view: windowed active count plus a fold over the last
/// hour of durable events. Recomputed on every read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RealtimeStats {
    pub active_visitors: u64,
    pub hits_per_minute: Vec<HitsPerMinute>,
    pub top_pages: Vec<PageStats>,
    pub top_referrers: Vec<ReferrerStats>,
    pub countries: BTreeMap<String, u64>,
    pub devices: BTreeMap<String, u64>,
    pub browsers: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OverviewStats {
    pub total_hits: u64,
    pub unique_visitors: u64,
    /// Not computed; session tracking is not implemented.
    pub avg_session_time: f64,
    /// Not computed; session tracking is not implemented.
    pub bounce_rate: f64,
}

//! Durable, append-only event history. The storage engine itself is an
//! external collaborator reached through this small query interface.

use crate::error::KrakensResult;
use crate::types::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event. The event must already carry its durable timestamp.
    async fn append(&self, event: &Event) -> KrakensResult<()>;

    /// All-time number of events recorded for `domain_id`.
    async fn count_all(&self, domain_id: &str) -> KrakensResult<u64>;

    /// Number of distinct visitor identifiers among events at or after `since`.
    async fn count_distinct_visitors(
        &self,
        domain_id: &str,
        since: DateTime<Utc>,
    ) -> KrakensResult<u64>;

    /// Events at or after `since`, newest first.
    async fn query_recent(&self, domain_id: &str, since: DateTime<Utc>)
        -> KrakensResult<Vec<Event>>;
}

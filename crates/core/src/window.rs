//! Active-visitor window: per domain, the set of visitor identifiers seen
//! within a trailing interval.

use crate::error::KrakensResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait]
pub trait ActiveWindow: Send + Sync {
    /// Upsert the visitor's last-seen time to `now` and refresh the
    /// domain-wide expiry. Idempotent for identical timestamps.
    async fn touch(&self, domain_id: &str, visitor_id: &str, now: DateTime<Utc>)
        -> KrakensResult<()>;

    /// Evict every member last seen before `now - window`, then return the
    /// number of members left. Eviction and count happen atomically with
    /// respect to concurrent touches on the same domain.
    async fn active_count(
        &self,
        domain_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> KrakensResult<u64>;
}

/// Cutoff below which members are stale. Saturates instead of overflowing on
/// absurd window sizes.
pub fn window_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

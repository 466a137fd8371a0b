//! Redis-backed active-visitor window.
//! One sorted set per domain: member = visitor id, score = last-seen millis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use krakens_core::config::RedisConfig;
use krakens_core::window::{window_cutoff, ActiveWindow};
use krakens_core::{KrakensError, KrakensResult};
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info};

/// Sliding-window tracker on Redis sorted sets. Shared across every process
/// that ingests for the same domains.
pub struct RedisWindow {
    conn: ConnectionManager,
    key_prefix: String,
    ttl_secs: i64,
}

impl RedisWindow {
    /// Connect to Redis and verify connectivity.
    pub async fn new(config: &RedisConfig) -> anyhow::Result<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())?;
        let mut conn = tokio::time::timeout(
            Duration::from_millis(config.connect_timeout_ms),
            ConnectionManager::new(client),
        )
        .await??;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            ttl_secs: i64::try_from(config.tracker_ttl_secs).unwrap_or(i64::MAX),
        })
    }

    fn key(&self, domain_id: &str) -> String {
        window_key(&self.key_prefix, domain_id)
    }
}

pub(crate) fn window_key(prefix: &str, domain_id: &str) -> String {
    format!("{prefix}:{domain_id}")
}

fn degraded(e: redis::RedisError) -> KrakensError {
    KrakensError::Degraded(e.to_string())
}

#[async_trait]
impl ActiveWindow for RedisWindow {
    async fn touch(
        &self,
        domain_id: &str,
        visitor_id: &str,
        now: DateTime<Utc>,
    ) -> KrakensResult<()> {
        let key = self.key(domain_id);
        let mut conn = self.conn.clone();

        // GT: a late-arriving older touch never moves last-seen backwards.
        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg("GT")
            .arg(now.timestamp_millis())
            .arg(visitor_id)
            .ignore()
            .expire(&key, self.ttl_secs)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(degraded)?;

        Ok(())
    }

    async fn active_count(
        &self,
        domain_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> KrakensResult<u64> {
        let key = self.key(domain_id);
        let cutoff = window_cutoff(now, window).timestamp_millis();
        let mut conn = self.conn.clone();

        // MULTI/EXEC so a touch cannot land between the prune and the count.
        // "(" makes the upper bound exclusive: a member seen exactly at the
        // cutoff is still active.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(&key, "-inf", format!("({cutoff}"))
            .ignore()
            .zcard(&key)
            .query_async(&mut conn)
            .await
            .map_err(degraded)?;

        debug!(domain_id = domain_id, count = count, "Active window counted");
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_key() {
        assert_eq!(
            window_key("active_visitors", "65a1f0c2"),
            "active_visitors:65a1f0c2"
        );
    }

    /// Requires a local Redis (6.2+ for `ZADD GT`) on the default port.
    #[tokio::test]
    #[ignore]
    async fn test_redis_window_round_trip() {
        let config = RedisConfig {
            key_prefix: format!("test_active_{}", std::process::id()),
            ..Default::default()
        };
        let window = RedisWindow::new(&config).await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let five_min = Duration::from_secs(300);

        window.touch("d1", "v1", t0).await.unwrap();
        window.touch("d1", "v1", t0).await.unwrap();
        window.touch("d1", "v2", t0).await.unwrap();

        let inside = t0 + chrono::Duration::seconds(299);
        assert_eq!(window.active_count("d1", inside, five_min).await.unwrap(), 2);

        let outside = t0 + chrono::Duration::seconds(301);
        assert_eq!(window.active_count("d1", outside, five_min).await.unwrap(), 0);

        window.touch("d2", "v1", t0 + chrono::Duration::seconds(10)).await.unwrap();
        window.touch("d2", "v1", t0).await.unwrap();
        let late = t0 + chrono::Duration::seconds(305);
        assert_eq!(window.active_count("d2", late, five_min).await.unwrap(), 1);
    }
}

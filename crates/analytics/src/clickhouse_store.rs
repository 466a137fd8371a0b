//! ClickHouse-backed event store. Append-only; rows are never updated or
//! deleted.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use clickhouse::Row;
use krakens_core::config::ClickHouseConfig;
use krakens_core::useragent::{Browser, DeviceClass};
use krakens_core::{Event, EventStore, KrakensError, KrakensResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Column order matches `EventRow` field order; RowBinary is positional.
const COLUMNS: &str = "event_id, domain_id, timestamp, ip_hash, user_agent, path, referrer, \
                       country, device, browser, visitor_id";

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
struct EventRow {
    event_id: String,
    domain_id: String,
    /// DateTime64(3): milliseconds since the epoch.
    timestamp: i64,
    ip_hash: String,
    user_agent: String,
    path: String,
    referrer: String,
    country: String,
    device: String,
    browser: String,
    visitor_id: String,
}

impl EventRow {
    fn from_event(event: &Event) -> KrakensResult<Self> {
        let timestamp = event
            .timestamp
            .ok_or_else(|| KrakensError::Store("event has no durable timestamp".into()))?;
        Ok(Self {
            event_id: event.event_id.to_string(),
            domain_id: event.domain_id.clone(),
            timestamp: timestamp.timestamp_millis(),
            ip_hash: event.ip_hash.clone(),
            user_agent: event.user_agent.clone(),
            path: event.path.clone(),
            referrer: event.referrer.clone(),
            country: event.country.clone(),
            device: event.device.as_str().to_string(),
            browser: event.browser.as_str().to_string(),
            visitor_id: event.visitor_id.clone(),
        })
    }

    fn into_event(self) -> Event {
        Event {
            event_id: Uuid::parse_str(&self.event_id).unwrap_or_else(|_| Uuid::nil()),
            domain_id: self.domain_id,
            timestamp: Utc.timestamp_millis_opt(self.timestamp).single(),
            ip_hash: self.ip_hash,
            user_agent: self.user_agent,
            path: self.path,
            referrer: self.referrer,
            country: self.country,
            device: DeviceClass::from_name(&self.device),
            browser: Browser::from_name(&self.browser),
            visitor_id: self.visitor_id,
        }
    }
}

fn store_error(e: clickhouse::error::Error) -> KrakensError {
    KrakensError::Store(e.to_string())
}

pub struct ClickHouseEventStore {
    client: clickhouse::Client,
    table: String,
}

impl ClickHouseEventStore {
    /// Connect and make sure the events table exists.
    pub async fn new(config: &ClickHouseConfig) -> anyhow::Result<Self> {
        if !config
            .table
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            anyhow::bail!("invalid ClickHouse table name: {}", config.table);
        }

        let client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        let store = Self {
            client,
            table: config.table.clone(),
        };
        store.ensure_schema().await?;

        info!(url = %config.url, table = %config.table, "ClickHouse event store initialized");
        Ok(store)
    }

    async fn ensure_schema(&self) -> anyhow::Result<()> {
        self.client
            .query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    event_id String,
                    domain_id String,
                    timestamp DateTime64(3, 'UTC'),
                    ip_hash String,
                    user_agent String,
                    path String,
                    referrer String,
                    country LowCardinality(String),
                    device LowCardinality(String),
                    browser LowCardinality(String),
                    visitor_id String
                ) ENGINE = MergeTree()
                ORDER BY (domain_id, timestamp)
                PARTITION BY toYYYYMM(timestamp)",
                self.table
            ))
            .execute()
            .await?;

        info!("ClickHouse schema verified");
        Ok(())
    }
}

#[async_trait]
impl EventStore for ClickHouseEventStore {
    async fn append(&self, event: &Event) -> KrakensResult<()> {
        let row = EventRow::from_event(event)?;
        let mut insert = self.client.insert(&self.table).map_err(store_error)?;
        insert.write(&row).await.map_err(store_error)?;
        insert.end().await.map_err(store_error)?;

        debug!(event_id = %event.event_id, domain_id = %event.domain_id, "Event appended");
        Ok(())
    }

    async fn count_all(&self, domain_id: &str) -> KrakensResult<u64> {
        self.client
            .query(&format!("SELECT count() FROM {} WHERE domain_id = ?", self.table))
            .bind(domain_id)
            .fetch_one::<u64>()
            .await
            .map_err(store_error)
    }

    async fn count_distinct_visitors(
        &self,
        domain_id: &str,
        since: DateTime<Utc>,
    ) -> KrakensResult<u64> {
        self.client
            .query(&format!(
                "SELECT uniqExact(visitor_id) FROM {} \
                 WHERE domain_id = ? AND timestamp >= fromUnixTimestamp64Milli(toInt64(?))",
                self.table
            ))
            .bind(domain_id)
            .bind(since.timestamp_millis())
            .fetch_one::<u64>()
            .await
            .map_err(store_error)
    }

    async fn query_recent(
        &self,
        domain_id: &str,
        since: DateTime<Utc>,
    ) -> KrakensResult<Vec<Event>> {
        let rows = self
            .client
            .query(&format!(
                "SELECT {COLUMNS} FROM {} \
                 WHERE domain_id = ? AND timestamp >= fromUnixTimestamp64Milli(toInt64(?)) \
                 ORDER BY timestamp DESC",
                self.table
            ))
            .bind(domain_id)
            .bind(since.timestamp_millis())
            .fetch_all::<EventRow>()
            .await
            .map_err(store_error)?;

        Ok(rows.into_iter().map(EventRow::into_event).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use krakens_core::types::UNKNOWN_COUNTRY;

    fn sample_event() -> Event {
        Event {
            event_id: Uuid::new_v4(),
            domain_id: "d1".into(),
            timestamp: Some(Utc.timestamp_millis_opt(1_704_110_400_123).unwrap()),
            ip_hash: "abc".into(),
            user_agent: "Mozilla/5.0".into(),
            path: "/home".into(),
            referrer: "https://news.example".into(),
            country: UNKNOWN_COUNTRY.into(),
            device: DeviceClass::Mobile,
            browser: Browser::Firefox,
            visitor_id: "v1".into(),
        }
    }

    #[test]
    fn test_row_conversion_preserves_event() {
        let event = sample_event();
        let row = EventRow::from_event(&event).unwrap();
        assert_eq!(row.timestamp, 1_704_110_400_123);
        assert_eq!(row.device, "Mobile");
        assert_eq!(row.browser, "Firefox");
        assert_eq!(row.into_event(), event);
    }

    #[test]
    fn test_row_requires_timestamp() {
        let mut event = sample_event();
        event.timestamp = None;
        assert!(matches!(
            EventRow::from_event(&event),
            Err(KrakensError::Store(_))
        ));
    }
}

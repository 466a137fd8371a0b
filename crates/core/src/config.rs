use crate::auth::AccessToken;
use serde::Deserialize;
use std::time::Duration;

/// Root application configuration. Loaded from an optional `krakens.toml`
/// and environment variables with the prefix `KRAKENS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Access tokens for the built-in resolver.
    #[serde(default)]
    pub tokens: Vec<AccessToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_nats_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_nats_max_reconnects")]
    pub max_reconnects: usize,
    #[serde(default = "default_events_subject")]
    pub events_subject: String,
    #[serde(default = "default_live_subject_prefix")]
    pub live_subject_prefix: String,
    #[serde(default = "default_queue_group")]
    pub queue_group: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_tracker_ttl_secs")]
    pub tracker_ttl_secs: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,
    #[serde(default = "default_clickhouse_db")]
    pub database: String,
    #[serde(default = "default_clickhouse_table")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_active_window_secs")]
    pub active_window_secs: u64,
    #[serde(default = "default_recent_minutes")]
    pub recent_minutes: u64,
    #[serde(default = "default_unique_visitor_hours")]
    pub unique_visitor_hours: u64,
    #[serde(default = "default_top_limit")]
    pub top_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_nats_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}
fn default_nats_max_reconnects() -> usize {
    60
}
fn default_events_subject() -> String {
    "events".to_string()
}
fn default_live_subject_prefix() -> String {
    "realtime".to_string()
}
fn default_queue_group() -> String {
    "event-writers".to_string()
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_key_prefix() -> String {
    "active_visitors".to_string()
}
fn default_tracker_ttl_secs() -> u64 {
    3600
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_clickhouse_db() -> String {
    "krakens".to_string()
}
fn default_clickhouse_table() -> String {
    "events".to_string()
}
fn default_active_window_secs() -> u64 {
    300
}
fn default_recent_minutes() -> u64 {
    60
}
fn default_unique_visitor_hours() -> u64 {
    24
}
fn default_top_limit() -> usize {
    10
}
fn default_persist_timeout_ms() -> u64 {
    5000
}
fn default_max_in_flight() -> usize {
    32
}
fn default_max_attempts() -> u32 {
    1
}
fn default_retry_backoff_ms() -> u64 {
    100
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_nats_urls(),
            max_reconnects: default_nats_max_reconnects(),
            events_subject: default_events_subject(),
            live_subject_prefix: default_live_subject_prefix(),
            queue_group: default_queue_group(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            key_prefix: default_key_prefix(),
            tracker_ttl_secs: default_tracker_ttl_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_clickhouse_db(),
            table: default_clickhouse_table(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            active_window_secs: default_active_window_secs(),
            recent_minutes: default_recent_minutes(),
            unique_visitor_hours: default_unique_visitor_hours(),
            top_limit: default_top_limit(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            persist_timeout_ms: default_persist_timeout_ms(),
            max_in_flight: default_max_in_flight(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            nats: NatsConfig::default(),
            redis: RedisConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            tracking: TrackingConfig::default(),
            consumer: ConsumerConfig::default(),
            metrics: MetricsConfig::default(),
            tokens: Vec::new(),
        }
    }
}

impl TrackingConfig {
    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.active_window_secs)
    }

    pub fn recent_span(&self) -> Duration {
        Duration::from_secs(self.recent_minutes * 60)
    }

    pub fn unique_visitor_span(&self) -> Duration {
        Duration::from_secs(self.unique_visitor_hours * 3600)
    }
}

impl ConsumerConfig {
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }
}

impl NatsConfig {
    /// Per-domain subject carrying fire-and-forget live updates.
    pub fn live_subject(&self, domain_id: &str) -> String {
        format!("{}.{}", self.live_subject_prefix, domain_id)
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("krakens").required(false))
            .add_source(
                config::Environment::with_prefix("KRAKENS")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("nats.urls")
                    .with_list_parse_key("redis.urls"),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

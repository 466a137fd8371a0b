//! Krakens: web-analytics collector.
//!
//! Main entry point: loads configuration, wires the queue, window tracker and
//! event store, starts the event consumer and serves HTTP until Ctrl-C.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use krakens_analytics::{
    ClickHouseEventStore, MemoryEventStore, OverviewAggregator, RealtimeAggregator,
};
use krakens_api::ApiServer;
use krakens_cache::{LocalWindow, RedisWindow};
use krakens_core::config::AppConfig;
use krakens_core::{ActiveWindow, EventQueue, EventStore, MemoryQueue};
use krakens_ingest::{StaticTokenResolver, TrackingGateway};
use krakens_queue::{EventConsumer, NatsQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_LOG_FILTER: &str = "krakens=info,krakens_core=info,krakens_cache=info,\
krakens_analytics=info,krakens_queue=info,krakens_ingest=info,krakens_api=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "krakens")]
#[command(about = "Web-analytics collector with realtime visitor tracking")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "KRAKENS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "KRAKENS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Run with in-process queue, window and store (no NATS/Redis/ClickHouse)
    #[arg(long, default_value_t = false)]
    standalone: bool,
}

struct Backends {
    queue: Arc<dyn EventQueue>,
    window: Arc<dyn ActiveWindow>,
    store: Arc<dyn EventStore>,
    /// Set in standalone mode; needs periodic purging of abandoned domains.
    local_window: Option<Arc<LocalWindow>>,
}

async fn connect_backends(config: &AppConfig) -> anyhow::Result<Backends> {
    let queue = NatsQueue::connect(&config.nats)
        .await
        .context("NATS connection required")?;
    let window = RedisWindow::new(&config.redis)
        .await
        .context("Redis connection required")?;
    let store = ClickHouseEventStore::new(&config.clickhouse)
        .await
        .context("ClickHouse connection required")?;

    Ok(Backends {
        queue: Arc::new(queue),
        window: Arc::new(window),
        store: Arc::new(store),
        local_window: None,
    })
}

fn standalone_backends(config: &AppConfig) -> Backends {
    let window = Arc::new(LocalWindow::new(config.redis.tracker_ttl_secs));
    Backends {
        queue: Arc::new(MemoryQueue::new()),
        window: window.clone(),
        store: Arc::new(MemoryEventStore::new()),
        local_window: Some(window),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Krakens starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        standalone = cli.standalone,
        active_window_secs = config.tracking.active_window_secs,
        tokens = config.tokens.len(),
        "Configuration loaded"
    );

    let backends = if cli.standalone {
        info!("Running in standalone mode (in-process queue, window and store)");
        standalone_backends(&config)
    } else {
        connect_backends(&config).await?
    };

    let cancel = CancellationToken::new();

    // Start the event consumer before accepting traffic
    let consumer = EventConsumer::new(
        backends.queue.clone(),
        backends.store.clone(),
        config.nats.events_subject.clone(),
        config.consumer.clone(),
    )
    .start(cancel.child_token())
    .await
    .context("Failed to subscribe event consumer")?;

    let gateway = Arc::new(TrackingGateway::new(
        Arc::new(StaticTokenResolver::new(config.tokens.clone())),
        backends.queue.clone(),
        backends.window.clone(),
        config.nats.clone(),
    ));
    let realtime = Arc::new(RealtimeAggregator::new(
        backends.window.clone(),
        backends.store.clone(),
        config.tracking.clone(),
    ));
    let overview = Arc::new(OverviewAggregator::new(
        backends.store.clone(),
        config.tracking.clone(),
    ));

    let api_server = ApiServer::new(config.clone(), gateway, realtime, overview);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Spawn window maintenance task
    if let Some(window) = backends.local_window.clone() {
        let stop = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        let purged = window.purge_expired(Utc::now());
                        if purged > 0 {
                            debug!(purged = purged, "Purged abandoned visitor windows");
                        }
                    }
                }
            }
        });
    }

    // Ctrl-C cancels everything
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        on_signal.cancel();
    });

    api_server.set_ready(true);
    info!("Krakens is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    let http_stop = cancel.clone();
    let served = api_server
        .start_http(async move { http_stop.cancelled().await })
        .await;

    api_server.set_ready(false);
    cancel.cancel();
    consumer.shutdown().await;
    info!("Krakens stopped");

    served
}

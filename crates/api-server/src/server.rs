//! API server: HTTP routes plus the Prometheus exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use krakens_analytics::{OverviewAggregator, RealtimeAggregator};
use krakens_core::config::AppConfig;
use krakens_ingest::TrackingGateway;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        gateway: Arc<TrackingGateway>,
        realtime: Arc<RealtimeAggregator>,
        overview: Arc<OverviewAggregator>,
    ) -> Self {
        let state = AppState {
            gateway,
            realtime,
            overview,
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        };
        Self { config, state }
    }

    /// Flip the readiness probe.
    pub fn set_ready(&self, ready: bool) {
        self.state.ready.store(ready, Ordering::SeqCst);
    }

    pub fn router(&self) -> Router {
        Router::new()
            // Ingestion
            .route("/api/track", post(rest::track))
            // Dashboard reads
            .route("/api/stats/realtime", get(rest::realtime_stats))
            .route("/api/stats/overview", get(rest::overview_stats))
            .route("/api/badges/:domain_id/live", get(rest::live_badge))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve HTTP until `shutdown` resolves, then finish in-flight requests.
    pub async fn start_http<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Install the global metrics recorder and its scrape listener on a
    /// separate port. Must run inside the Tokio runtime.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

//! REST handlers for beacon ingestion, dashboard stats, the live badge and
//! operational probes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use krakens_analytics::{OverviewAggregator, RealtimeAggregator};
use krakens_core::{KrakensError, OverviewStats, RealtimeStats, TrackRequest};
use krakens_ingest::{Caller, TrackingGateway};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Header carrying the site's access token.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Badge responses may be cached by browsers and CDNs for this long.
const BADGE_CACHE_CONTROL: &str = "public, max-age=30";

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<TrackingGateway>,
    pub realtime: Arc<RealtimeAggregator>,
    pub overview: Arc<OverviewAggregator>,
    pub node_id: String,
    pub start_time: Instant,
    pub ready: Arc<AtomicBool>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: &KrakensError) -> ApiError {
    let status = match err {
        KrakensError::Unauthorized => StatusCode::UNAUTHORIZED,
        KrakensError::BadInput(_) => StatusCode::BAD_REQUEST,
        KrakensError::Unavailable(_) | KrakensError::Store(_) | KrakensError::Degraded(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    // Internal details stay in the logs.
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "Internal processing error".to_string()
    } else {
        err.to_string()
    };
    (
        status,
        Json(ErrorResponse {
            error: err.kind().to_string(),
            message,
        }),
    )
}

/// First `X-Forwarded-For` hop, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// POST /api/track: page-view beacon.
pub async fn track(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let token = header_str(&headers, API_KEY_HEADER);

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            // Credentials are checked before the body is judged.
            let err = match state.gateway.resolve_domain(token).await {
                Ok(_) => KrakensError::BadInput(rejection.body_text()),
                Err(e) => e,
            };
            metrics::counter!("ingest.rejected", "reason" => err.kind()).increment(1);
            return Err(error_response(&err));
        }
    };

    let caller = Caller {
        ip: client_ip(&headers, peer.map(|ConnectInfo(addr)| addr)),
        user_agent: header_str(&headers, header::USER_AGENT).to_string(),
    };

    match state.gateway.track(token, request, &caller).await {
        Ok(_) => Ok(Json(TrackResponse {
            status: "tracked".to_string(),
        })),
        Err(e) => {
            match &e {
                KrakensError::Unauthorized | KrakensError::BadInput(_) => {
                    warn!(error = %e, "Tracking request rejected");
                }
                _ => error!(error = %e, "Tracking request failed"),
            }
            Err(error_response(&e))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DomainQuery {
    #[serde(default)]
    pub domain_id: String,
}

/// GET /api/stats/realtime?domain_id=
pub async fn realtime_stats(
    State(state): State<AppState>,
    Query(query): Query<DomainQuery>,
) -> Result<Json<RealtimeStats>, ApiError> {
    state
        .realtime
        .stats(&query.domain_id)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(domain_id = %query.domain_id, error = %e, "Realtime stats failed");
            error_response(&e)
        })
}

/// GET /api/stats/overview?domain_id=
pub async fn overview_stats(
    State(state): State<AppState>,
    Query(query): Query<DomainQuery>,
) -> Result<Json<OverviewStats>, ApiError> {
    state
        .overview
        .stats(&query.domain_id)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(domain_id = %query.domain_id, error = %e, "Overview stats failed");
            error_response(&e)
        })
}

/// GET /api/badges/:domain_id/live: public, cacheable live count. Any
/// failure renders as zero.
pub async fn live_badge(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
) -> impl IntoResponse {
    let active_visitors = match state.realtime.active_visitors(&domain_id).await {
        Ok(count) => count,
        Err(e) => {
            warn!(domain_id = %domain_id, error = %e, "Badge count unavailable");
            0
        }
    };

    (
        [(header::CACHE_CONTROL, BADGE_CACHE_CONTROL)],
        Json(BadgeResponse {
            domain_id,
            active_visitors,
        }),
    )
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: 200 once the event consumer is running, 503 before start
/// and after shutdown begins.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.ready.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live: Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BadgeResponse {
    pub domain_id: String,
    pub active_visitors: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.1");
        assert_eq!(client_ip(&headers, None), "");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (KrakensError::Unauthorized, StatusCode::UNAUTHORIZED),
            (KrakensError::BadInput("x".into()), StatusCode::BAD_REQUEST),
            (KrakensError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                KrakensError::Internal(anyhow::anyhow!("secret detail")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let (got, Json(body)) = error_response(&err);
            assert_eq!(got, status);
            assert_eq!(body.error, err.kind());
            assert!(!body.message.contains("secret"));
        }
    }
}

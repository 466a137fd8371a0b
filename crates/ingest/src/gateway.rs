//! Ingestion gateway: authenticates a beacon, builds the event, hands it to
//! the queue and refreshes the active window. Nothing here waits on the
//! event store.

use chrono::Utc;
use krakens_core::config::NatsConfig;
use krakens_core::event_bus::publish_json;
use krakens_core::identity::{hash_ip, validate_domain_id};
use krakens_core::types::UNKNOWN_COUNTRY;
use krakens_core::useragent::classify;
use krakens_core::{
    ActiveWindow, Event, EventQueue, KrakensError, KrakensResult, TokenResolver, TrackRequest,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Maximum access token length.
pub const MAX_TOKEN_LEN: usize = 256;
/// Maximum path and referrer length.
pub const MAX_URL_LEN: usize = 2048;
/// Maximum user agent length.
pub const MAX_USER_AGENT_LEN: usize = 1024;
/// Maximum visitor identifier length.
pub const MAX_VISITOR_ID_LEN: usize = 256;

/// Transport-level facts about the request, resolved by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub ip: String,
    /// `User-Agent` header; used when the body carries none.
    pub user_agent: String,
}

pub struct TrackingGateway {
    resolver: Arc<dyn TokenResolver>,
    queue: Arc<dyn EventQueue>,
    window: Arc<dyn ActiveWindow>,
    subjects: NatsConfig,
}

impl TrackingGateway {
    pub fn new(
        resolver: Arc<dyn TokenResolver>,
        queue: Arc<dyn EventQueue>,
        window: Arc<dyn ActiveWindow>,
        subjects: NatsConfig,
    ) -> Self {
        Self {
            resolver,
            queue,
            window,
            subjects,
        }
    }

    /// Accept one page view. Returns the event as published.
    ///
    /// A down queue fails the call with `Unavailable`; a degraded window
    /// tracker or a failed live notification does not.
    pub async fn track(
        &self,
        token: &str,
        request: TrackRequest,
        caller: &Caller,
    ) -> KrakensResult<Event> {
        match self.accept(token, request, caller).await {
            Ok(event) => {
                metrics::counter!("ingest.accepted").increment(1);
                Ok(event)
            }
            Err(e) => {
                metrics::counter!("ingest.rejected", "reason" => e.kind()).increment(1);
                Err(e)
            }
        }
    }

    async fn accept(
        &self,
        token: &str,
        request: TrackRequest,
        caller: &Caller,
    ) -> KrakensResult<Event> {
        let domain_id = self.resolve_domain(token).await?;
        validate_request(&request, caller).map_err(|msg| KrakensError::BadInput(msg.into()))?;

        let event = build_event(domain_id, request, caller);

        publish_json(self.queue.as_ref(), &self.subjects.events_subject, &event)
            .await
            .map_err(|e| match e {
                KrakensError::Unavailable(_) => e,
                other => KrakensError::Unavailable(other.to_string()),
            })?;

        if let Err(e) = self
            .window
            .touch(&event.domain_id, &event.visitor_id, Utc::now())
            .await
        {
            warn!(domain_id = %event.domain_id, error = %e, "Active window touch failed");
            metrics::counter!("ingest.window_degraded").increment(1);
        }

        self.notify_live(&event).await;

        debug!(
            event_id = %event.event_id,
            domain_id = %event.domain_id,
            path = %event.path,
            "Event accepted"
        );
        Ok(event)
    }

    /// Token to owning domain. Multi-domain tokens record against the first.
    /// `Unauthorized` for an empty, unknown or revoked token.
    pub async fn resolve_domain(&self, token: &str) -> KrakensResult<String> {
        if token.is_empty() {
            return Err(KrakensError::Unauthorized);
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(KrakensError::BadInput("access token exceeds maximum length".into()));
        }

        let access = match self.resolver.validate(token).await? {
            Some(access) if !access.revoked => access,
            _ => return Err(KrakensError::Unauthorized),
        };

        let domain_id = access
            .domain_ids
            .into_iter()
            .next()
            .ok_or_else(|| KrakensError::BadInput("no domains associated with access token".into()))?;
        validate_domain_id(&domain_id)?;
        Ok(domain_id)
    }

    async fn notify_live(&self, event: &Event) {
        let subject = self.subjects.live_subject(&event.domain_id);
        if let Err(e) = publish_json(self.queue.as_ref(), &subject, event).await {
            debug!(subject = %subject, error = %e, "Live update not delivered");
            metrics::counter!("ingest.notify_failed").increment(1);
        }
    }
}

fn validate_request(request: &TrackRequest, caller: &Caller) -> Result<(), &'static str> {
    if request.path.is_empty() {
        return Err("'path' is required");
    }
    if request.path.len() > MAX_URL_LEN {
        return Err("'path' exceeds maximum length");
    }
    if request.referrer.len() > MAX_URL_LEN {
        return Err("'referrer' exceeds maximum length");
    }
    if request.user_agent.len() > MAX_USER_AGENT_LEN || caller.user_agent.len() > MAX_USER_AGENT_LEN
    {
        return Err("user agent exceeds maximum length");
    }
    if request.visitor_id.len() > MAX_VISITOR_ID_LEN {
        return Err("'visitor_id' exceeds maximum length");
    }
    Ok(())
}

fn build_event(domain_id: String, request: TrackRequest, caller: &Caller) -> Event {
    let user_agent = if request.user_agent.is_empty() {
        caller.user_agent.clone()
    } else {
        request.user_agent
    };
    let agent = classify(&user_agent);
    let ip_hash = hash_ip(&caller.ip);
    let visitor_id = if request.visitor_id.is_empty() {
        ip_hash.clone()
    } else {
        request.visitor_id
    };

    Event {
        event_id: Uuid::new_v4(),
        domain_id,
        timestamp: None,
        ip_hash,
        user_agent,
        path: request.path,
        referrer: request.referrer,
        country: UNKNOWN_COUNTRY.to_string(),
        device: agent.device,
        browser: agent.browser,
        visitor_id,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tokens::StaticTokenResolver;
    use async_trait::async_trait;
    use chrono::DateTime;
    use krakens_cache::LocalWindow;
    use krakens_core::useragent::{Browser, DeviceClass};
    use krakens_core::{AccessToken, MemoryQueue};
    use std::time::Duration;
    use tokio_stream::StreamExt;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

    struct DownWindow;

    #[async_trait]
    impl ActiveWindow for DownWindow {
        async fn touch(&self, _: &str, _: &str, _: DateTime<Utc>) -> KrakensResult<()> {
            Err(KrakensError::Degraded("connection refused".into()))
        }

        async fn active_count(&self, _: &str, _: DateTime<Utc>, _: Duration) -> KrakensResult<u64> {
            Err(KrakensError::Degraded("connection refused".into()))
        }
    }

    fn resolver() -> Arc<StaticTokenResolver> {
        Arc::new(StaticTokenResolver::new(vec![
            AccessToken {
                token: "hrd_live".into(),
                domain_ids: vec!["site1".into(), "site2".into()],
                revoked: false,
            },
            AccessToken {
                token: "hrd_revoked".into(),
                domain_ids: vec!["site1".into()],
                revoked: true,
            },
            AccessToken {
                token: "hrd_orphan".into(),
                domain_ids: vec![],
                revoked: false,
            },
        ]))
    }

    fn gateway(queue: Arc<MemoryQueue>, window: Arc<dyn ActiveWindow>) -> TrackingGateway {
        TrackingGateway::new(resolver(), queue, window, NatsConfig::default())
    }

    fn request(path: &str, visitor: &str) -> TrackRequest {
        TrackRequest {
            path: path.into(),
            visitor_id: visitor.into(),
            ..Default::default()
        }
    }

    fn caller() -> Caller {
        Caller {
            ip: "203.0.113.9".into(),
            user_agent: IPHONE.into(),
        }
    }

    #[tokio::test]
    async fn test_track_builds_and_publishes_event() {
        let queue = Arc::new(MemoryQueue::new());
        let window = Arc::new(LocalWindow::new(3600));
        let mut events = queue.subscribe("events").await.unwrap();
        let gw = gateway(queue.clone(), window.clone());

        let mut req = request("/pricing", "v1");
        req.referrer = "https://news.example".into();
        let event = gw.track("hrd_live", req, &caller()).await.unwrap();

        assert_eq!(event.domain_id, "site1");
        assert_eq!(event.path, "/pricing");
        assert_eq!(event.country, "Unknown");
        assert_eq!(event.browser, Browser::Safari);
        assert_eq!(event.device, DeviceClass::Mobile);
        assert_eq!(event.ip_hash, hash_ip("203.0.113.9"));
        assert!(event.timestamp.is_none());

        let payload = events.next().await.unwrap();
        let published: Event = serde_json::from_slice(&payload).unwrap();
        assert_eq!(published, event);

        let active = window
            .active_count("site1", Utc::now(), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn test_body_user_agent_wins_over_header() {
        let queue = Arc::new(MemoryQueue::new());
        let gw = gateway(queue, Arc::new(LocalWindow::new(3600)));

        let mut req = request("/", "v1");
        req.user_agent = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0".into();
        let event = gw.track("hrd_live", req, &caller()).await.unwrap();
        assert_eq!(event.browser, Browser::Firefox);
        assert_eq!(event.device, DeviceClass::Desktop);
    }

    #[tokio::test]
    async fn test_missing_visitor_falls_back_to_ip_hash() {
        let queue = Arc::new(MemoryQueue::new());
        let gw = gateway(queue, Arc::new(LocalWindow::new(3600)));

        let event = gw.track("hrd_live", request("/", ""), &caller()).await.unwrap();
        assert_eq!(event.visitor_id, event.ip_hash);
    }

    #[tokio::test]
    async fn test_unauthorized_has_no_side_effects() {
        let queue = Arc::new(MemoryQueue::new());
        let window = Arc::new(LocalWindow::new(3600));
        let mut events = queue.subscribe("events").await.unwrap();
        let gw = gateway(queue.clone(), window.clone());

        for token in ["", "unknown", "hrd_revoked"] {
            let err = gw.track(token, request("/", "v1"), &caller()).await.unwrap_err();
            assert!(matches!(err, KrakensError::Unauthorized), "token {token:?}");
        }

        assert!(window.is_empty());
        let nothing = tokio::time::timeout(Duration::from_millis(20), events.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_bad_input() {
        let queue = Arc::new(MemoryQueue::new());
        let gw = gateway(queue, Arc::new(LocalWindow::new(3600)));

        let cases = [
            ("hrd_orphan", request("/", "v1")),
            ("hrd_live", request("", "v1")),
            ("hrd_live", request(&"/a".repeat(MAX_URL_LEN), "v1")),
            ("hrd_live", request("/", &"v".repeat(MAX_VISITOR_ID_LEN + 1))),
        ];
        for (token, req) in cases {
            let err = gw.track(token, req, &caller()).await.unwrap_err();
            assert!(matches!(err, KrakensError::BadInput(_)), "{err}");
        }

        let long_token = "t".repeat(MAX_TOKEN_LEN + 1);
        let err = gw.track(&long_token, request("/", "v1"), &caller()).await.unwrap_err();
        assert!(matches!(err, KrakensError::BadInput(_)));
    }

    #[tokio::test]
    async fn test_resolve_domain() {
        let queue = Arc::new(MemoryQueue::new());
        let gw = gateway(queue, Arc::new(LocalWindow::new(3600)));

        assert_eq!(gw.resolve_domain("hrd_live").await.unwrap(), "site1");
        assert!(matches!(
            gw.resolve_domain("wrong").await,
            Err(KrakensError::Unauthorized)
        ));
        assert!(matches!(
            gw.resolve_domain("hrd_orphan").await,
            Err(KrakensError::BadInput(_))
        ));
    }

    #[tokio::test]
    async fn test_queue_down_is_unavailable() {
        let queue = Arc::new(MemoryQueue::new());
        let window = Arc::new(LocalWindow::new(3600));
        let gw = gateway(queue.clone(), window.clone());

        queue.set_available(false);
        let err = gw.track("hrd_live", request("/", "v1"), &caller()).await.unwrap_err();
        assert!(matches!(err, KrakensError::Unavailable(_)));
        assert!(window.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_window_does_not_fail_ingestion() {
        let queue = Arc::new(MemoryQueue::new());
        let mut events = queue.subscribe("events").await.unwrap();
        let gw = gateway(queue.clone(), Arc::new(DownWindow));

        gw.track("hrd_live", request("/", "v1"), &caller()).await.unwrap();
        assert!(events.next().await.is_some());
    }

    #[tokio::test]
    async fn test_live_update_published_per_domain() {
        let queue = Arc::new(MemoryQueue::new());
        let mut live = queue.subscribe("realtime.site1").await.unwrap();
        let gw = gateway(queue.clone(), Arc::new(LocalWindow::new(3600)));

        let event = gw.track("hrd_live", request("/docs", "v9"), &caller()).await.unwrap();
        let payload = live.next().await.unwrap();
        let pushed: Event = serde_json::from_slice(&payload).unwrap();
        assert_eq!(pushed.event_id, event.event_id);
    }
}

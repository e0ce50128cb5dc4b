//! HTTP surface tests driven through the router with an in-memory broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use rankpulse_api::{AppState, build_router};
use rankpulse_broker::MemoryBroker;
use rankpulse_core::config::AppConfig;
use rankpulse_core::error::AppError;
use rankpulse_core::result::AppResult;
use rankpulse_core::traits::broker::JobBroker;
use rankpulse_core::traits::health::HealthProbe;
use rankpulse_core::traits::repository::SiteRepository;
use rankpulse_core::types::job::JobKind;
use rankpulse_core::types::site::EligibleSite;
use rankpulse_worker::fanout::FanOutScheduler;
use rankpulse_worker::queue::QueueRegistry;

const SECRET: &str = "test-cron-secret";

#[derive(Debug)]
struct StaticSites {
    sites: Vec<EligibleSite>,
    queries: AtomicU32,
}

#[async_trait]
impl SiteRepository for StaticSites {
    async fn find_eligible_sites(&self) -> AppResult<Vec<EligibleSite>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.sites.iter().filter(|s| s.is_eligible()).cloned().collect())
    }

    async fn find_active_sites(&self) -> AppResult<Vec<EligibleSite>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.sites.iter().filter(|s| s.is_active).cloned().collect())
    }

    async fn find_site(&self, site_id: Uuid) -> AppResult<Option<EligibleSite>> {
        Ok(self.sites.iter().find(|s| s.site_id == site_id).cloned())
    }
}

#[derive(Debug)]
struct Probe {
    healthy: bool,
}

#[async_trait]
impl HealthProbe for Probe {
    async fn ping(&self) -> AppResult<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(AppError::database("connection refused"))
        }
    }
}

fn site(is_active: bool, has_valid_refresh_token: bool) -> EligibleSite {
    EligibleSite {
        site_id: Uuid::new_v4(),
        organization_id: Uuid::new_v4(),
        is_active,
        has_valid_refresh_token,
    }
}

struct TestApp {
    router: Router,
    broker: Option<MemoryBroker>,
    sites: Arc<StaticSites>,
}

struct Setup {
    secret: Option<&'static str>,
    with_broker: bool,
    healthy: bool,
    sites: Vec<EligibleSite>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            secret: Some(SECRET),
            with_broker: true,
            healthy: true,
            sites: Vec::new(),
        }
    }
}

fn app(setup: Setup) -> TestApp {
    let mut config = AppConfig::default();
    config.cron.secret = setup.secret.map(str::to_string);

    let broker = setup.with_broker.then(MemoryBroker::new);
    let shared: Option<Arc<dyn JobBroker>> = broker
        .clone()
        .map(|b| Arc::new(b) as Arc<dyn JobBroker>);
    let queues = Arc::new(
        QueueRegistry::build(shared, &config.queues, Duration::from_millis(50))
            .expect("default queue options are valid"),
    );
    let sites = Arc::new(StaticSites {
        sites: setup.sites,
        queries: AtomicU32::new(0),
    });
    let fanout = Arc::new(FanOutScheduler::new(
        Arc::clone(&queues),
        Arc::clone(&sites) as Arc<dyn SiteRepository>,
    ));

    let state = AppState {
        config: Arc::new(config),
        queues,
        fanout,
        health: Arc::new(Probe {
            healthy: setup.healthy,
        }),
    };

    TestApp {
        router: build_router(state),
        broker,
        sites,
    }
}

async fn send(router: &Router, method: &str, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn drain_gsc_windows(broker: &MemoryBroker) -> Vec<Option<u32>> {
    let mut windows = Vec::new();
    while let Some(job) = broker
        .claim(JobKind::GscSync.queue_name(), Duration::from_millis(20))
        .await
        .unwrap()
    {
        windows.push(job.payload.window_days);
    }
    windows
}

#[tokio::test]
async fn test_health_ok() {
    let app = app(Setup::default());
    let (status, body) = send(&app.router, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], true);
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_health_degraded_when_database_unreachable() {
    let app = app(Setup {
        healthy: false,
        ..Setup::default()
    });
    let (status, body) = send(&app.router, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["db"], false);
}

#[tokio::test]
async fn test_health_needs_no_credential_or_broker() {
    let app = app(Setup {
        secret: None,
        with_broker: false,
        ..Setup::default()
    });
    let (status, _) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sync_gsc_rejects_when_secret_unconfigured() {
    let app = app(Setup {
        secret: None,
        sites: vec![site(true, true)],
        ..Setup::default()
    });
    let (status, body) = send(&app.router, "POST", "/cron/sync-gsc", Some("anything")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");
    assert_eq!(app.sites.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sync_gsc_rejects_wrong_or_missing_token() {
    let app = app(Setup {
        sites: vec![site(true, true)],
        ..Setup::default()
    });

    let (status, body) = send(&app.router, "POST", "/cron/sync-gsc", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, _) = send(&app.router, "POST", "/cron/sync-gsc", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.sites.queries.load(Ordering::SeqCst), 0);
    let broker = app.broker.as_ref().unwrap();
    assert!(drain_gsc_windows(broker).await.is_empty());
}

#[tokio::test]
async fn test_sync_gsc_enqueues_eligible_sites() {
    let app = app(Setup {
        sites: vec![
            site(true, true),
            site(true, true),
            site(true, true),
            site(true, false),
            site(false, true),
        ],
        ..Setup::default()
    });

    let (status, body) = send(&app.router, "POST", "/cron/sync-gsc", Some(SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enqueued"], 3);
    assert_eq!(body["skipped"], 0);

    let windows = drain_gsc_windows(app.broker.as_ref().unwrap()).await;
    assert_eq!(windows, vec![Some(30); 3]);
}

#[tokio::test]
async fn test_sync_gsc_with_no_sites() {
    let app = app(Setup::default());
    let (status, body) = send(&app.router, "POST", "/cron/sync-gsc", Some(SECRET)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enqueued"], 0);
    assert_eq!(body["skipped"], 0);
}

#[tokio::test]
async fn test_sync_gsc_without_broker_is_unavailable() {
    let app = app(Setup {
        with_broker: false,
        sites: vec![site(true, true)],
        ..Setup::default()
    });
    let (status, body) = send(&app.router, "POST", "/cron/sync-gsc", Some(SECRET)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "QUEUE_UNAVAILABLE");
    assert_eq!(app.sites.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gsc_enqueue_uses_requested_window() {
    let app = app(Setup {
        sites: vec![site(true, true), site(true, true)],
        ..Setup::default()
    });
    let (status, body) = send(&app.router, "POST", "/jobs/gsc-enqueue?days=90", Some(SECRET)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enqueued"], 2);
    let windows = drain_gsc_windows(app.broker.as_ref().unwrap()).await;
    assert_eq!(windows, vec![Some(90); 2]);
}

#[tokio::test]
async fn test_gsc_enqueue_defaults_to_thirty_days() {
    let app = app(Setup {
        sites: vec![site(true, true)],
        ..Setup::default()
    });
    let (status, _) = send(&app.router, "POST", "/jobs/gsc-enqueue", Some(SECRET)).await;

    assert_eq!(status, StatusCode::OK);
    let windows = drain_gsc_windows(app.broker.as_ref().unwrap()).await;
    assert_eq!(windows, vec![Some(30)]);
}

#[tokio::test]
async fn test_gsc_enqueue_accepts_window_bounds() {
    let app = app(Setup {
        sites: vec![site(true, true)],
        ..Setup::default()
    });
    for uri in ["/jobs/gsc-enqueue?days=1", "/jobs/gsc-enqueue?days=540"] {
        let (status, _) = send(&app.router, "POST", uri, Some(SECRET)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }
}

#[tokio::test]
async fn test_gsc_enqueue_rejects_invalid_window() {
    let app = app(Setup {
        sites: vec![site(true, true)],
        ..Setup::default()
    });
    for uri in [
        "/jobs/gsc-enqueue?days=0",
        "/jobs/gsc-enqueue?days=541",
        "/jobs/gsc-enqueue?days=-5",
        "/jobs/gsc-enqueue?days=abc",
    ] {
        let (status, body) = send(&app.router, "POST", uri, Some(SECRET)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "VALIDATION_ERROR", "{uri}");
    }
    assert_eq!(app.sites.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gsc_enqueue_checks_credential_before_query() {
    let app = app(Setup::default());
    let (status, _) = send(&app.router, "POST", "/jobs/gsc-enqueue?days=0", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stats_reports_every_queue() {
    let app = app(Setup {
        sites: vec![site(true, true), site(true, true)],
        ..Setup::default()
    });
    send(&app.router, "POST", "/cron/sync-gsc", Some(SECRET)).await;

    let (status, body) = send(&app.router, "GET", "/jobs/stats", Some(SECRET)).await;
    assert_eq!(status, StatusCode::OK);

    let queues = body["queues"].as_array().unwrap();
    assert_eq!(queues.len(), JobKind::ALL.len());
    let gsc = queues
        .iter()
        .find(|q| q["queue"] == JobKind::GscSync.queue_name())
        .unwrap();
    assert_eq!(gsc["waiting"], 2);
    assert_eq!(gsc["active"], 0);
}

#[tokio::test]
async fn test_stats_requires_credential_and_broker() {
    let app_with_broker = app(Setup::default());
    let (status, _) = send(&app_with_broker.router, "GET", "/jobs/stats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let app_without = app(Setup {
        with_broker: false,
        ..Setup::default()
    });
    let (status, _) = send(&app_without.router, "GET", "/jobs/stats", Some(SECRET)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_trigger_rejects_get() {
    let app = app(Setup::default());
    let (status, _) = send(&app.router, "GET", "/cron/sync-gsc", Some(SECRET)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

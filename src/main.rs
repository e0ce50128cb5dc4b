//! RankPulse Server: SEO job orchestration core.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use rankpulse_api::{AppState, build_router};
use rankpulse_core::config::AppConfig;
use rankpulse_core::error::AppError;
use rankpulse_core::traits::repository::{SiteRepository, SyncRunRepository};
use rankpulse_core::types::job::JobKind;
use rankpulse_database::DatabasePool;
use rankpulse_database::repositories::site::PgSiteRepository;
use rankpulse_database::repositories::sync_run::PgSyncRunRepository;
use rankpulse_worker::jobs::SyncRunHandler;
use rankpulse_worker::runner::WorkerSettings;
use rankpulse_worker::{CronScheduler, FanOutScheduler, JobDispatcher, QueueRegistry, start_worker};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment.
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("RANKPULSE_ENV").unwrap_or_else(|_| "development".to_string());

    let config = AppConfig::load(&env)?;
    config.validate()?;
    Ok(config)
}

/// Initialize tracing/logging.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function.
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting RankPulse v{}", env!("CARGO_PKG_VERSION"));
    let config = Arc::new(config);

    // ── Step 1: Database connection + migrations ─────────────────
    tracing::info!("Connecting to database...");
    let db = DatabasePool::connect(&config.database).await?;
    rankpulse_database::migration::run_migrations(db.pool()).await?;
    tracing::info!("Database migrations complete");

    // ── Step 2: Repositories ─────────────────────────────────────
    let sites: Arc<dyn SiteRepository> = Arc::new(PgSiteRepository::new(db.pool().clone()));
    let runs: Arc<dyn SyncRunRepository> = Arc::new(PgSyncRunRepository::new(db.pool().clone()));

    // ── Step 3: Queues ───────────────────────────────────────────
    let queues = Arc::new(QueueRegistry::init(&config.broker, &config.queues)?);
    queues.check_broker().await;

    // ── Step 4: Workers ──────────────────────────────────────────
    let mut dispatcher = JobDispatcher::new();
    for kind in JobKind::ALL {
        dispatcher.register(Arc::new(SyncRunHandler::new(
            kind,
            Arc::clone(&sites),
            Arc::clone(&runs),
        )));
    }
    let dispatcher = Arc::new(dispatcher);

    let workers = if config.worker.enabled {
        let settings = WorkerSettings::from(&config.worker);
        config
            .worker
            .queues
            .iter()
            .filter_map(|&kind| start_worker(&queues, kind, Arc::clone(&dispatcher), &settings))
            .collect::<Vec<_>>()
    } else {
        tracing::info!("Background workers disabled");
        Vec::new()
    };

    // ── Step 5: Fan-out + in-process schedule ────────────────────
    let fanout = Arc::new(FanOutScheduler::new(Arc::clone(&queues), Arc::clone(&sites)));

    let mut cron = if config.cron.schedule_enabled && queues.is_available() {
        let scheduler = CronScheduler::new(Arc::clone(&fanout)).await?;
        scheduler
            .register_gsc_sync(
                &config.cron.gsc_sync_schedule,
                config.cron.default_window_days,
            )
            .await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("In-process GSC schedule disabled");
        None
    };

    if config.cron.configured_secret().is_none() {
        tracing::warn!("Cron secret is not configured, trigger endpoints will reject every call");
    }

    // ── Step 6: Build and start HTTP server ──────────────────────
    let state = AppState {
        config: Arc::clone(&config),
        queues,
        fanout,
        health: Arc::new(db.clone()),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!("RankPulse server listening on {}", addr);

    // ── Step 7: Graceful shutdown ────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 8: Drain workers and stop background tasks ──────────
    if let Some(scheduler) = cron.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Failed to stop scheduler");
        }
    }

    tracing::info!(workers = workers.len(), "Draining workers...");
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let drain = drain_workers(&workers);
    tokio::pin!(drain);
    if tokio::time::timeout(grace, &mut drain).await.is_err() {
        tracing::warn!(
            grace_seconds = grace.as_secs(),
            "In-flight jobs still running, waiting for them to finish"
        );
        drain.await;
    }

    db.close().await;

    tracing::info!("RankPulse server shut down gracefully");
    Ok(())
}

/// Drain every worker concurrently.
async fn drain_workers(workers: &[rankpulse_worker::WorkerHandle]) {
    let drains = workers.iter().map(|worker| worker.drain());
    futures::future::join_all(drains).await;
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! Mail Queue Worker
//!
//! Consumes mail jobs from weighted Redis streams, renders them and hands
//! them to SMTP.
//!
//! ## Architecture
//!
//! ```text
//! Redis Streams (mail:critical / mail:default / mail:low)
//!   ↓ (Consumer Group: mail_workers)
//! StreamWorker<MailJobProcessor>
//!   ↓ template / provider lookups, history, status events
//! ClientPool → mail-service (gRPC)
//!   ↓
//! SMTP
//! ```
//!
//! Transient failures are requeued with a bumped retry count; everything
//! else lands on `<queue>:dlq`.

pub mod config;

use axum::Router;
use config::WorkerSettings;
use core_config::{Environment, FromEnv, app_info};
use domain_mail::{GrpcMailService, HandlebarsRenderer, MailJobProcessor, SmtpTransport};
use eyre::{Result, WrapErr};
use grpc_client::{ClientPool, RetryConfig, retry_with_backoff};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use stream_worker::{ClientsProbe, HealthState, StreamWorker, health_router, metrics};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Serve `/health`, `/ready`, `/health/clients` and `/metrics`
async fn start_health_server(health_state: HealthState, address: String) -> Result<()> {
    let app: Router = health_router(health_state);

    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", address))?;

    info!(address = %address, "Health server listening");

    axum::serve(listener, app)
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Open the queue connection, retrying while Redis comes up
async fn connect_redis(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url).wrap_err("Invalid Redis URL")?;

    retry_with_backoff(
        || client.get_connection_manager(),
        RetryConfig::new().with_max_retries(5).with_initial_delay(500),
        |_| true,
    )
    .await
    .wrap_err("Failed to connect to Redis")
}

/// Run the mail worker until SIGINT/SIGTERM.
///
/// Startup order: tracing, metrics, settings, Redis, gRPC pool warm-up,
/// health server, worker. Endpoints that fail to dial at startup are
/// logged and re-dialed on first use, so they do not abort the worker.
///
/// # Errors
///
/// Returns an error if the settings are invalid, Redis is unreachable or
/// the worker hits a fatal queue error.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics().map_err(|e| eyre::eyre!("{}", e))?;

    let app_info = app_info!();
    info!(name = %app_info.name, version = %app_info.version, "Starting mail queue worker");
    info!("Environment: {:?}", environment);

    let settings = WorkerSettings::from_env().wrap_err("Failed to load worker settings")?;

    info!("Connecting to Redis...");
    let redis = connect_redis(&settings.redis.url).await?;
    info!("Connected to Redis successfully");

    let pool = Arc::new(ClientPool::new());
    for failure in pool.warm_up(&settings.grpc_clients).await {
        warn!(error = %failure, "gRPC client unavailable at startup");
    }
    info!(clients = ?pool.list(), "gRPC client pool ready");

    let worker_config = settings.worker_config();
    info!(
        queues = ?worker_config.queues,
        consumer_group = %worker_config.consumer_group,
        consumer_id = %worker_config.consumer_id,
        concurrency = worker_config.concurrency,
        max_retries = worker_config.max_retries,
        "Worker configuration loaded"
    );

    let processor = MailJobProcessor::new(
        Arc::new(GrpcMailService::new(pool.clone(), &settings.mail_service_endpoint)),
        Arc::new(HandlebarsRenderer::new()),
        Arc::new(SmtpTransport::new()),
        settings.processor_config(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let probe_pool = pool.clone();
    let clients: ClientsProbe = Arc::new(move || probe_pool.health());
    let health_state = HealthState::new(redis.clone(), app_info.name, app_info.version).with_clients(clients);

    let health_address = settings.health.address();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_address).await {
            error!(error = %e, "Health server failed");
        }
    });

    info!("Starting mail job processor...");
    let worker = StreamWorker::new(redis, processor, worker_config);
    let outcome = worker.run(shutdown_rx).await;

    if let Err(e) = pool.close_all().await {
        warn!(error = %e, "Failed to close gRPC clients");
    }

    outcome.map_err(|e| eyre::eyre!("{}", e))?;

    info!("Mail queue worker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use asesorias_api::app::{create_app, AppState};
use asesorias_api::config::Config;
use asesorias_api::jobs::{
    CalendarBackfillJob, JobScheduler, PoolMetricsJob, SweepJob, WatchRenewalJob,
};
use asesorias_api::middleware::{init_metrics, logging::init_logging};
use persistence::db;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    init_metrics().context("Failed to install Prometheus recorder")?;

    info!("Starting Asesorias API v{}", env!("CARGO_PKG_VERSION"));

    let pool = db::create_pool(&config.database.pool_settings()).await?;

    info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Migrations completed");

    let addr = config.socket_addr()?;
    let state = AppState::build(config.clone(), pool.clone())?;

    let mut scheduler = JobScheduler::new();
    scheduler.register(SweepJob::new(
        state.reservations.clone(),
        config.scheduling.sweep_interval_secs,
    ));
    scheduler.register(CalendarBackfillJob::new(
        state.reservations.clone(),
        config.scheduling.calendar_backfill_interval_secs,
        config.scheduling.calendar_backfill_batch_size,
    ));
    scheduler.register(WatchRenewalJob::new(
        state.watches.clone(),
        config.calendar.watch_renewal_interval_secs,
    ));
    scheduler.register(PoolMetricsJob::new(pool));
    scheduler.start();

    let app = create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received");
}

use std::sync::Arc;
use std::time::Duration;

use cinema_backend::{
    booking::ReservationEngine,
    catalog::catalog_sqlx::SqlxCatalog,
    config::{AppConfig, json_logs_from_env},
    db::Db,
};
use common::clock::SystemClock;
use common::logger::{TraceId, init_logger, root_span};
use tracing::Instrument;

/// Connects, runs migrations and wires the engine against the system clock.
async fn init_engine(cfg: &AppConfig) -> anyhow::Result<(Db, Arc<ReservationEngine>)> {
    let db = Db::connect(&cfg.database_url, cfg.db_max_connections).await?;
    db.migrate().await?;

    let catalog = Arc::new(SqlxCatalog::new(db.pool.clone()));
    let engine = Arc::new(ReservationEngine::new(
        db.pool.clone(),
        catalog,
        Arc::new(SystemClock),
        cfg.seat_hold,
    ));

    Ok((db, engine))
}

/// Periodic expiry sweep. Requests sweep lazily as well, so a missed tick
/// only delays EXPIRED statuses, never seat availability.
fn start_sweep_loop(engine: Arc<ReservationEngine>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let span = root_span("expiry_sweep", &TraceId::default());
            if let Err(e) = engine.sweep_expired().instrument(span).await {
                tracing::error!(error = ?e, "expiry sweep failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("cinema-backend", json_logs_from_env());
    let cfg = AppConfig::from_env();

    tracing::info!(
        database_url = %cfg.database_url,
        hold_secs = cfg.seat_hold.as_secs(),
        "Starting cinema reservation backend..."
    );

    let (db, engine) = init_engine(&cfg).await?;

    // Startup reconciliation: holds that lapsed while we were down.
    let report = engine.sweep_expired().await?;
    tracing::info!(
        expired_bookings = report.expired_bookings.len(),
        released_locks = report.released_locks,
        "startup sweep complete"
    );

    match cfg.sweep_interval {
        Some(interval) => start_sweep_loop(engine.clone(), interval),
        None => tracing::warn!("periodic sweep disabled; relying on lazy sweeps"),
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    db.pool.close().await;
    Ok(())
}

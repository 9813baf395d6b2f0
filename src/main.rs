//! News collector service: binary entrypoint.
//! Boots the Axum HTTP API on Shuttle and keeps the periodic collection and
//! AI jobs running next to it.

use anyhow::Context;
use news_collector::{start, telemetry, CollectorConfig};
use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = CollectorConfig::load_default().context("loading collector config")?;
    tracing::info!(
        store = %cfg.store_path.display(),
        max_in_flight = cfg.max_in_flight,
        every_secs = cfg.schedule_interval_secs,
        ai_every_secs = cfg.ai.interval_secs,
        "collector config loaded"
    );

    // Background jobs run for the life of the process; Shuttle owns shutdown.
    let app = start(&cfg, CancellationToken::new()).await?;
    Ok(app.into())
}

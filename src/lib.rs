// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::CollectorConfig;
pub use crate::ingest::collector::{Collector, CollectorSettings, RunReport, RunSummary};
pub use crate::ingest::registry::FetcherRegistry;
pub use crate::ingest::types::{Fetcher, RawItem};

use anyhow::Context;
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::analyze::{AiJob, OpenRouterClient};
use crate::ingest::scheduler::{spawn_periodic_ai_job, spawn_periodic_collection};
use crate::metrics::Metrics;
use crate::notify::TeamsNotifier;
use crate::store::{JobStore, JsonFileStore, Store};

/// Wire the JSON store, the built-in fetchers and the collector from `cfg`.
pub async fn build_state(
    cfg: &CollectorConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<AppState> {
    let store = Arc::new(
        JsonFileStore::open(&cfg.store_path)
            .await
            .with_context(|| format!("opening store {}", cfg.store_path.display()))?,
    );
    let registry = FetcherRegistry::with_defaults(cfg).context("building HTTP client")?;
    let collector = Collector::new(
        Arc::new(registry),
        store.clone(),
        store.clone(),
        CollectorSettings::from(cfg),
    );

    Ok(AppState {
        collector: Arc::new(collector),
        store: store.clone(),
        logs: store.clone(),
        jobs: store,
        shutdown,
    })
}

/// The AI post-processing job, or `None` when no OpenRouter key is configured.
pub fn build_ai_job(
    cfg: &CollectorConfig,
    store: Arc<dyn Store>,
    jobs: Arc<dyn JobStore>,
) -> anyhow::Result<Option<AiJob>> {
    let Some(client) =
        OpenRouterClient::from_config(&cfg.ai, &cfg.user_agent).context("configuring OpenRouter")?
    else {
        return Ok(None);
    };
    let job = AiJob::new(
        store,
        jobs,
        Arc::new(client),
        Arc::new(TeamsNotifier::from_config(&cfg.ai)),
    )
    .with_team(cfg.ai.team.clone());
    Ok(Some(job))
}

/// Install the metrics recorder, open the store, start the periodic
/// collection and AI jobs and return the full router.
pub async fn start(cfg: &CollectorConfig, shutdown: CancellationToken) -> anyhow::Result<Router> {
    // The recorder must exist before the first scheduled run records anything.
    let metrics = Metrics::init()
        .inspect_err(|e| tracing::warn!(error = ?e, "metrics disabled"))
        .ok();

    let state = build_state(cfg, shutdown.clone()).await?;

    spawn_periodic_collection(
        state.collector.clone(),
        cfg.schedule_interval(),
        cfg.team.clone(),
        shutdown.clone(),
    );
    match build_ai_job(cfg, state.store.clone(), state.jobs.clone()) {
        Ok(Some(job)) => {
            spawn_periodic_ai_job(Arc::new(job), cfg.ai.interval(), shutdown);
        }
        Ok(None) => tracing::info!("AI job not started: no OpenRouter API key"),
        Err(e) => tracing::warn!(error = ?e, "AI job not started"),
    }

    let mut app = router(state);
    if let Some(metrics) = metrics {
        app = app.merge(metrics.router());
    }
    Ok(app)
}

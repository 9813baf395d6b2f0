// src/ingest/scheduler.rs
use chrono::{DateTime, Utc};
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::analyze::AiJob;
use crate::ingest::collector::Collector;
use crate::model::Source;

/// Whether `source` should be fetched at `now`.
///
/// Inactive sources are never due, `force` included. A source that was never
/// fetched is always due; otherwise its interval must have fully elapsed.
pub fn is_due(source: &Source, now: DateTime<Utc>, force: bool) -> bool {
    if !source.is_active {
        return false;
    }
    if force {
        return true;
    }
    let Some(last) = source.last_fetched_at else {
        return true;
    };
    // A clock that went backwards yields a negative elapsed: not due.
    match (now - last).to_std() {
        Ok(elapsed) => elapsed >= source.fetch_interval,
        Err(_) => false,
    }
}

/// Run `collect_due` every `every` until `cancel` fires. Overlapping ticks
/// are skipped, so at most one scheduled run is in flight.
pub fn spawn_periodic_collection(
    collector: Arc<Collector>,
    every: Duration,
    team: Option<String>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match collector.collect_due(team.as_deref(), &cancel).await {
                Ok(report) => {
                    let summary = report.summary();
                    gauge!("collector_last_run_ts").set(Utc::now().timestamp() as f64);
                    tracing::info!(
                        target: "collector",
                        processed = summary.sources_processed,
                        successful = summary.successful,
                        partial = summary.partial,
                        failed = summary.failed,
                        new_articles = summary.total_new_articles,
                        not_attempted = report.not_attempted.len(),
                        "scheduled collection finished"
                    );
                }
                Err(e) => {
                    tracing::warn!(target: "collector", error = %e, "scheduled collection could not start");
                }
            }
        }
        tracing::info!(target: "collector", "periodic collection stopped");
    })
}

/// Run one AI job tick every `every` until `cancel` fires. The job checks its
/// enable switch on every tick, so toggling it needs no restart.
pub fn spawn_periodic_ai_job(
    job: Arc<AiJob>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match job.run_once().await {
                Ok(report) => {
                    gauge!("collector_ai_last_run_ts").set(Utc::now().timestamp() as f64);
                    if !report.processed.is_empty() || report.error.is_some() {
                        tracing::info!(
                            target: "ai_job",
                            processed = report.processed.len(),
                            notified = report.notified,
                            without_webhook = report.without_webhook,
                            error = ?report.error,
                            "AI job tick finished"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "ai_job", error = %e, "AI job tick failed");
                }
            }
        }
        tracing::info!(target: "ai_job", "periodic AI job stopped");
    })
}

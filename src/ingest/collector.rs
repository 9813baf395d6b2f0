// src/ingest/collector.rs
//! Collection orchestrator: fans sources out to their fetchers with bounded
//! concurrency, funnels each result through the normalizer into the store and
//! writes exactly one fetch log per attempted source.

use chrono::Utc;
use futures::{stream, FutureExt, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::CollectorConfig;
use crate::error::{CollectError, FetchError, RunError};
use crate::ingest::registry::FetcherRegistry;
use crate::ingest::scheduler::is_due;
use crate::ingest::{ensure_metrics_described, normalize};
use crate::model::{FetchLog, FetchStatus, ItemCounts, Source, SourceId};
use crate::store::{FetchLogSink, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub max_in_flight: usize,
    pub fetch_timeout: Duration,
    /// `None` = no run-wide budget.
    pub run_budget: Option<Duration>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self::from(&CollectorConfig::default())
    }
}

impl From<&CollectorConfig> for CollectorSettings {
    fn from(cfg: &CollectorConfig) -> Self {
        Self {
            max_in_flight: cfg.max_in_flight.max(1),
            fetch_timeout: cfg.fetch_timeout(),
            run_budget: cfg.run_budget(),
        }
    }
}

/// Outcome of one collection run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// One per attempted source, in input order.
    pub logs: Vec<FetchLog>,
    /// Inactive or not yet due.
    pub not_due: Vec<SourceId>,
    /// Skipped because the run was cancelled or ran out of budget first.
    pub not_attempted: Vec<SourceId>,
    /// Non-fatal problems, e.g. a fetch log that could not be written.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sources_processed: usize,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
    pub total_new_articles: usize,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary {
            sources_processed: self.logs.len(),
            ..Default::default()
        };
        for log in &self.logs {
            match log.status {
                FetchStatus::Success => s.successful += 1,
                FetchStatus::Partial => s.partial += 1,
                FetchStatus::Failure => s.failed += 1,
            }
            s.total_new_articles += log.counts.new;
        }
        s
    }

    pub fn log_for(&self, source_id: SourceId) -> Option<&FetchLog> {
        self.logs.iter().find(|l| l.source_id == source_id)
    }
}

enum Outcome {
    Attempted {
        log: FetchLog,
        warning: Option<String>,
    },
    NotAttempted(SourceId),
}

pub struct Collector {
    registry: Arc<FetcherRegistry>,
    store: Arc<dyn Store>,
    logs: Arc<dyn FetchLogSink>,
    settings: CollectorSettings,
}

impl Collector {
    pub fn new(
        registry: Arc<FetcherRegistry>,
        store: Arc<dyn Store>,
        logs: Arc<dyn FetchLogSink>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            registry,
            store,
            logs,
            settings,
        }
    }

    pub fn settings(&self) -> CollectorSettings {
        self.settings
    }

    /// Every active source that is due, optionally only those of `team`.
    pub async fn collect_due(
        &self,
        team: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        self.collect_active(false, team, cancel).await
    }

    /// Every active source (due or, with `force`, regardless of timing).
    pub async fn collect_active(
        &self,
        force: bool,
        team: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let sources: Vec<Source> = self
            .store
            .list_sources()
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .filter(|s| team.map_or(true, |t| s.team.as_deref() == Some(t)))
            .collect();
        Ok(self.collect(sources, force, cancel).await)
    }

    /// One explicitly named source, fetched regardless of its interval.
    pub async fn collect_one(
        &self,
        id: SourceId,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let source = self.store.get_source(id).await?;
        if !source.is_active {
            return Err(RunError::SourceInactive(id));
        }
        Ok(self.collect(vec![source], true, cancel).await)
    }

    /// Attempt every due source in `sources`. Never fails as a whole: each
    /// source's problem ends up in its own fetch log.
    pub async fn collect(
        &self,
        sources: Vec<Source>,
        force: bool,
        cancel: &CancellationToken,
    ) -> RunReport {
        ensure_metrics_described();
        counter!("collector_runs_total").increment(1);

        let now = Utc::now();
        let mut report = RunReport::default();
        let mut due = Vec::with_capacity(sources.len());
        for s in sources {
            if is_due(&s, now, force) {
                due.push(s);
            } else {
                report.not_due.push(s.id);
            }
        }

        let run_cancel = cancel.child_token();
        let budget_timer = self.settings.run_budget.map(|budget| {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                tracing::warn!(target: "collector", budget_ms = budget.as_millis() as u64, "run budget exhausted");
                token.cancel();
            })
        });

        let mut outcomes: Vec<(usize, Outcome)> = stream::iter(due.into_iter().enumerate())
            .map(|(idx, source)| {
                let run_cancel = &run_cancel;
                async move {
                    if run_cancel.is_cancelled() {
                        return (idx, Outcome::NotAttempted(source.id));
                    }
                    (idx, self.attempt(source).await)
                }
            })
            .buffer_unordered(self.settings.max_in_flight.max(1))
            .collect()
            .await;

        if let Some(timer) = budget_timer {
            timer.abort();
        }

        outcomes.sort_by_key(|(idx, _)| *idx);
        for (_, outcome) in outcomes {
            match outcome {
                Outcome::Attempted { log, warning } => {
                    report.logs.push(log);
                    report.warnings.extend(warning);
                }
                Outcome::NotAttempted(id) => report.not_attempted.push(id),
            }
        }

        if !report.not_attempted.is_empty() {
            tracing::warn!(
                target: "collector",
                skipped = report.not_attempted.len(),
                "run cancelled before all sources were attempted"
            );
        }
        report
    }

    async fn attempt(&self, source: Source) -> Outcome {
        let started_at = Utc::now();
        let t0 = Instant::now();
        let mut counts = ItemCounts::default();

        let result = self.run_source(&source, started_at, &mut counts).await;
        let elapsed = t0.elapsed();

        let log = match &result {
            Ok(()) => FetchLog::completed(&source, started_at, elapsed, counts),
            Err(e) => FetchLog::failed(&source, started_at, elapsed, counts, e),
        };

        let kind = source.kind.to_string();
        counter!("collector_fetch_total", "status" => log.status.as_str(), "kind" => kind.clone())
            .increment(1);
        histogram!("collector_fetch_duration_ms", "kind" => kind).record(elapsed.as_secs_f64() * 1_000.0);
        counter!("collector_articles_new_total").increment(counts.new as u64);
        counter!("collector_articles_duplicate_total").increment(counts.duplicate as u64);
        counter!("collector_items_dropped_total").increment(counts.dropped as u64);

        match &result {
            Ok(()) => tracing::info!(
                target: "collector",
                source_id = source.id,
                source = %source.name,
                kind = %source.kind,
                status = log.status.as_str(),
                fetched = counts.fetched,
                new = counts.new,
                duplicate = counts.duplicate,
                dropped = counts.dropped,
                duration_ms = log.duration_ms,
                "source collected"
            ),
            Err(e) => tracing::warn!(
                target: "collector",
                source_id = source.id,
                source = %source.name,
                kind = %source.kind,
                error_kind = e.kind().as_str(),
                error = %e,
                duration_ms = log.duration_ms,
                "source failed"
            ),
        }

        let warning = match self.logs.append(log.clone()).await {
            Ok(()) => None,
            Err(e) => {
                counter!("collector_log_sink_errors_total").increment(1);
                tracing::warn!(target: "collector", source_id = source.id, error = %e, "fetch log not written");
                Some(format!("fetch log for source {} not written: {e}", source.id))
            }
        };

        Outcome::Attempted { log, warning }
    }

    /// Fetch, normalize, persist. `counts` reflects progress even on error.
    async fn run_source(
        &self,
        source: &Source,
        started_at: chrono::DateTime<Utc>,
        counts: &mut ItemCounts,
    ) -> Result<(), CollectError> {
        let fetcher = self.registry.create(&source.kind)?;

        let fetch = AssertUnwindSafe(fetcher.fetch(source)).catch_unwind();
        let raw = match tokio::time::timeout(self.settings.fetch_timeout, fetch).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_panic)) => {
                return Err(FetchError::Transport(format!("fetcher `{}` panicked", fetcher.name())).into())
            }
            Err(_) => {
                return Err(FetchError::Timeout(format!(
                    "no response within {} ms",
                    self.settings.fetch_timeout.as_millis()
                ))
                .into())
            }
        };
        counts.fetched = raw.len();

        let existing = self.store.existing_keys(source.id).await?;
        let normalized = normalize(source, raw, &existing, started_at);
        counts.dropped = normalized.dropped;
        counts.duplicate = normalized.duplicates;

        let candidates = normalized.articles.len();
        let inserted = self.store.insert_articles(normalized.articles).await?;
        counts.new = inserted;
        // Keys another run stored between our read and our insert.
        counts.duplicate += candidates.saturating_sub(inserted);

        self.store.mark_fetched(source.id, started_at).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{FeedEntry, Fetcher, RawItem};
    use crate::store::MemoryStore;
    use serde_json::json;

    struct Links(Vec<&'static str>);

    #[async_trait::async_trait]
    impl Fetcher for Links {
        async fn fetch(&self, _source: &Source) -> Result<Vec<RawItem>, CollectError> {
            Ok(self
                .0
                .iter()
                .map(|l| {
                    RawItem::Feed(FeedEntry {
                        link: Some(l.to_string()),
                        ..Default::default()
                    })
                })
                .collect())
        }
        fn name(&self) -> &'static str {
            "links"
        }
    }

    struct Panics;

    #[async_trait::async_trait]
    impl Fetcher for Panics {
        async fn fetch(&self, _source: &Source) -> Result<Vec<RawItem>, CollectError> {
            panic!("boom")
        }
        fn name(&self) -> &'static str {
            "panics"
        }
    }

    fn source(id: SourceId, kind: &str) -> Source {
        Source::new(id, format!("s{id}"), kind, "https://example.com/rss", json!({})).unwrap()
    }

    #[tokio::test]
    async fn panicking_fetcher_fails_only_its_source() {
        let store = Arc::new(MemoryStore::with_sources([source(1, "feed"), source(2, "boom")]));
        let registry = FetcherRegistry::new()
            .with("feed", Arc::new(Links(vec!["https://example.com/a"])))
            .with("boom", Arc::new(Panics));
        let collector = Collector::new(
            Arc::new(registry),
            store.clone(),
            store.clone(),
            CollectorSettings::default(),
        );

        let report = collector
            .collect_due(None, &CancellationToken::new())
            .await
            .unwrap();
        let s = report.summary();
        assert_eq!(s.sources_processed, 2);
        assert_eq!(s.successful, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.total_new_articles, 1);
        assert!(report.log_for(2).unwrap().error.as_ref().unwrap().detail.contains("panicked"));
    }

    #[tokio::test]
    async fn team_scope_filters_sources() {
        let store = Arc::new(MemoryStore::with_sources([
            source(1, "feed").with_team("markets"),
            source(2, "feed").with_team("tech"),
            source(3, "feed"),
        ]));
        let registry = FetcherRegistry::new().with("feed", Arc::new(Links(vec![])));
        let collector = Collector::new(
            Arc::new(registry),
            store.clone(),
            store.clone(),
            CollectorSettings::default(),
        );

        let report = collector
            .collect_due(Some("markets"), &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<SourceId> = report.logs.iter().map(|l| l.source_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn collect_one_rejects_unknown_and_inactive() {
        let store = Arc::new(MemoryStore::with_sources([source(1, "feed").deactivated()]));
        let collector = Collector::new(
            Arc::new(FetcherRegistry::new()),
            store.clone(),
            store.clone(),
            CollectorSettings::default(),
        );
        let cancel = CancellationToken::new();
        assert!(matches!(
            collector.collect_one(9, &cancel).await,
            Err(RunError::SourceNotFound(9))
        ));
        assert!(matches!(
            collector.collect_one(1, &cancel).await,
            Err(RunError::SourceInactive(1))
        ));
    }
}

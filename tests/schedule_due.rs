// tests/schedule_due.rs
mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use news_collector::analyze::{AiJob, Summarizer};
use news_collector::error::AiError;
use news_collector::ingest::scheduler::{is_due, spawn_periodic_ai_job, spawn_periodic_collection};
use news_collector::model::{Article, ContentType, JobConfig, NewArticle, OPENROUTER_JOB};
use news_collector::notify::{ArticleNotice, Delivery, Notifier};
use news_collector::store::{FetchLogSink, JobStore, MemoryStore, Store};
use news_collector::FetcherRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[test]
fn due_follows_last_fetch_and_interval() {
    let now = Utc::now();
    let fresh = feed_source(1, "Fresh").with_interval(Duration::from_secs(600));
    assert!(is_due(&fresh, now, false), "never fetched is always due");

    let recent = fresh.clone().with_last_fetched(now - ChronoDuration::seconds(599));
    assert!(!is_due(&recent, now, false));
    assert!(is_due(&recent, now, true));

    let exact = fresh.clone().with_last_fetched(now - ChronoDuration::seconds(600));
    assert!(is_due(&exact, now, false), "interval fully elapsed");

    let future = fresh.clone().with_last_fetched(now + ChronoDuration::minutes(5));
    assert!(!is_due(&future, now, false));

    let off = fresh.deactivated();
    assert!(!is_due(&off, now, false));
    assert!(!is_due(&off, now, true), "force never wakes an inactive source");
}

#[tokio::test(start_paused = true)]
async fn periodic_collection_runs_until_cancelled() {
    let fetcher = Arc::new(StaticFetcher::links(&["https://a.example.com/1"]));
    let registry = FetcherRegistry::new().with("feed", fetcher.clone());
    let (collector, store) = memory_collector(
        registry,
        vec![feed_source(1, "A").with_interval(Duration::from_secs(60))],
        settings(2, Duration::from_secs(5), None),
    );

    let cancel = CancellationToken::new();
    let handle = spawn_periodic_collection(
        Arc::new(collector),
        Duration::from_secs(30),
        None,
        cancel.clone(),
    );

    // first tick fires immediately; the source is then not due again until
    // its 60s interval (wall clock) elapsed, so only one fetch happens here.
    tokio::time::sleep(Duration::from_secs(95)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(store.recent(Some(1), 10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_collection_stops_on_cancel_before_first_tick() {
    let fetcher = Arc::new(StaticFetcher::links(&["https://a.example.com/1"]));
    let registry = FetcherRegistry::new().with("feed", fetcher.clone());
    let (collector, _store) = memory_collector(
        registry,
        vec![feed_source(1, "A")],
        settings(2, Duration::from_secs(5), None),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let handle = spawn_periodic_collection(Arc::new(collector), Duration::from_secs(30), None, cancel);
    handle.await.unwrap();
    assert_eq!(fetcher.calls(), 0);
}

struct Headline;

#[async_trait::async_trait]
impl Summarizer for Headline {
    async fn summarize(&self, a: &Article, _ai_type: Option<&str>) -> Result<String, AiError> {
        Ok(a.title.clone())
    }
    fn name(&self) -> &'static str {
        "headline"
    }
}

struct Quiet;

#[async_trait::async_trait]
impl Notifier for Quiet {
    async fn send(&self, _notice: &ArticleNotice) -> anyhow::Result<Delivery> {
        Ok(Delivery::NoWebhook)
    }
}

#[tokio::test(start_paused = true)]
async fn periodic_ai_job_follows_the_enable_switch() {
    let store = Arc::new(MemoryStore::with_sources([feed_source(1, "A").with_team("dev")]));
    store
        .insert_articles(
            ["one", "two"]
                .iter()
                .map(|slug| NewArticle {
                    source_id: 1,
                    dedup_key: format!("https://a.example.com/{slug}"),
                    url: Some(format!("https://a.example.com/{slug}")),
                    title: (*slug).to_string(),
                    summary: String::new(),
                    published_at: Utc::now(),
                    content_type: ContentType::General,
                })
                .collect(),
        )
        .await
        .unwrap();
    store
        .upsert_job_config(JobConfig::new(OPENROUTER_JOB))
        .await
        .unwrap();

    let job = AiJob::new(store.clone(), store.clone(), Arc::new(Headline), Arc::new(Quiet));
    let cancel = CancellationToken::new();
    let handle = spawn_periodic_ai_job(Arc::new(job), Duration::from_secs(60), cancel.clone());

    // disabled: the first ticks leave the queue alone
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert!(store.next_unprocessed(None).await.unwrap().is_some());

    store
        .upsert_job_config(JobConfig {
            enabled: true,
            ..JobConfig::new(OPENROUTER_JOB)
        })
        .await
        .unwrap();
    // one article per tick at the default limit
    tokio::time::sleep(Duration::from_secs(60)).await;
    let remaining = store.next_unprocessed(None).await.unwrap();
    assert!(remaining.is_some());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(store.next_unprocessed(None).await.unwrap().is_none());

    cancel.cancel();
    handle.await.unwrap();
}

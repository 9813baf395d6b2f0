// tests/collector_timeouts.rs
mod common;

use common::*;
use news_collector::error::ErrorKind;
use news_collector::model::FetchStatus;
use news_collector::store::{FetchLogSink, Store};
use news_collector::FetcherRegistry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn hung_fetch_times_out_and_frees_the_slot() {
    let slow = Arc::new(SlowFetcher::new(Duration::from_secs(600)));
    let quick = Arc::new(StaticFetcher::links(&["https://quick.example.com/1"]));
    let registry = FetcherRegistry::new()
        .with("hung", slow.clone())
        .with("feed", quick.clone());

    let hung = news_collector::model::Source::new(
        1,
        "Hung",
        "hung",
        "https://hung.example.com",
        serde_json::json!({}),
    )
    .unwrap();
    // one slot: the quick source can only run after the hung one gave it up
    let (collector, store) = memory_collector(
        registry,
        vec![hung, feed_source(2, "Quick")],
        settings(1, Duration::from_secs(2), None),
    );

    let report = collector
        .collect_due(None, &CancellationToken::new())
        .await
        .unwrap();

    let log = report.log_for(1).unwrap();
    assert_eq!(log.status, FetchStatus::Failure);
    assert_eq!(log.error_kind(), Some(ErrorKind::Fetch));
    assert!(log.error.as_ref().unwrap().detail.contains("timed out"));
    assert!(log.duration_ms >= 2_000);
    assert!(store.get_source(1).await.unwrap().last_fetched_at.is_none());

    assert_eq!(report.log_for(2).unwrap().status, FetchStatus::Success);
    assert_eq!(quick.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_budget_skips_sources_not_yet_started() {
    let slow = Arc::new(SlowFetcher::new(Duration::from_secs(10)));
    let registry = FetcherRegistry::new().with("feed", slow.clone());
    let (collector, store) = memory_collector(
        registry,
        vec![feed_source(1, "A"), feed_source(2, "B"), feed_source(3, "C")],
        settings(1, Duration::from_secs(30), Some(Duration::from_secs(15))),
    );

    let report = collector
        .collect_due(None, &CancellationToken::new())
        .await
        .unwrap();

    // 1 finishes at 10s, 2 starts at 10s and is allowed to finish at 20s,
    // the budget ran out at 15s so 3 never starts.
    assert_eq!(report.summary().successful, 2);
    assert_eq!(report.not_attempted, vec![3]);
    assert_eq!(slow.started.load(Ordering::SeqCst), 2);

    // not attempted ≠ failed: no log, still due next cycle
    assert!(store.recent(Some(3), 10).await.unwrap().is_empty());
    assert!(store.get_source(3).await.unwrap().last_fetched_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn external_cancellation_stops_new_attempts() {
    let slow = Arc::new(SlowFetcher::new(Duration::from_secs(10)));
    let registry = FetcherRegistry::new().with("feed", slow.clone());
    let (collector, _store) = memory_collector(
        registry,
        vec![feed_source(1, "A"), feed_source(2, "B"), feed_source(3, "C")],
        settings(1, Duration::from_secs(30), None),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let report = collector.collect_due(None, &cancel).await.unwrap();
    assert_eq!(report.logs.len(), 1);
    assert_eq!(report.logs[0].status, FetchStatus::Success);
    assert_eq!(report.not_attempted, vec![2, 3]);
}

#[tokio::test]
async fn already_cancelled_run_attempts_nothing() {
    let fetcher = Arc::new(StaticFetcher::links(&["https://a.example.com/1"]));
    let registry = FetcherRegistry::new().with("feed", fetcher.clone());
    let (collector, _store) = memory_collector(
        registry,
        vec![feed_source(1, "A"), feed_source(2, "B")],
        settings(4, Duration::from_secs(5), None),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = collector.collect_due(None, &cancel).await.unwrap();
    assert!(report.logs.is_empty());
    assert_eq!(report.not_attempted, vec![1, 2]);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded() {
    let slow = Arc::new(SlowFetcher::new(Duration::from_secs(1)));
    let registry = FetcherRegistry::new().with("feed", slow.clone());
    let sources = (1..=6).map(|i| feed_source(i, &format!("S{i}"))).collect();
    let (collector, _store) = memory_collector(
        registry,
        sources,
        settings(2, Duration::from_secs(30), None),
    );

    let started = tokio::time::Instant::now();
    let report = collector
        .collect_due(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.summary().successful, 6);
    // 6 one-second fetches, two at a time
    assert!(started.elapsed() >= Duration::from_secs(3));
    // logs come back in input order regardless of completion order
    let ids: Vec<i64> = report.logs.iter().map(|l| l.source_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
}

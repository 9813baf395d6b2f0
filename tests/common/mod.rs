// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use news_collector::error::{CollectError, FetchError, StoreError};
use news_collector::ingest::types::{FeedEntry, Fetcher, RawItem};
use news_collector::model::{FetchLog, NewArticle, Source, SourceId};
use news_collector::store::{
    ArticlePage, ArticleQuery, ArticleStats, FetchLogSink, MemoryStore, Store,
};
use news_collector::{Collector, CollectorSettings, FetcherRegistry};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn feed_source(id: SourceId, name: &str) -> Source {
    Source::new(
        id,
        name,
        "feed",
        format!("https://feeds.example.com/{id}.xml"),
        json!({}),
    )
    .unwrap()
}

pub fn entry(link: &str) -> RawItem {
    RawItem::Feed(FeedEntry {
        link: Some(link.to_string()),
        title: Some(format!("title for {link}")),
        ..Default::default()
    })
}

/// Returns the same items on every call and counts calls.
pub struct StaticFetcher {
    items: Vec<RawItem>,
    pub calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(items: Vec<RawItem>) -> Self {
        Self {
            items,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn links(links: &[&str]) -> Self {
        Self::new(links.iter().map(|l| entry(l)).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _source: &Source) -> Result<Vec<RawItem>, CollectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.clone())
    }
    fn name(&self) -> &'static str {
        "static-test"
    }
}

/// Items keyed by source id; unknown ids fail with HTTP 500.
pub struct PerSourceFetcher {
    pub items: std::collections::HashMap<SourceId, Vec<RawItem>>,
}

#[async_trait]
impl Fetcher for PerSourceFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, CollectError> {
        self.items.get(&source.id).cloned().ok_or_else(|| {
            FetchError::Status {
                status: 500,
                url: source.url.clone(),
            }
            .into()
        })
    }
    fn name(&self) -> &'static str {
        "per-source"
    }
}

pub struct FailingFetcher;

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, CollectError> {
        Err(FetchError::Connect(format!("refused: {}", source.url)).into())
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Sleeps before answering; `started` counts calls that began.
pub struct SlowFetcher {
    pub delay: Duration,
    pub started: AtomicUsize,
}

impl SlowFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Fetcher for SlowFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, CollectError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(vec![entry(&format!("https://slow.example.com/{}", source.id))])
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Fetch log sink that always fails.
pub struct BrokenSink;

#[async_trait]
impl FetchLogSink for BrokenSink {
    async fn append(&self, _log: FetchLog) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("log table locked".into()))
    }
    async fn recent(
        &self,
        _source_id: Option<SourceId>,
        _limit: usize,
    ) -> Result<Vec<FetchLog>, StoreError> {
        Ok(Vec::new())
    }
}

/// Wraps a `MemoryStore`; can be told to fail inserts.
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_inserts: bool,
}

#[async_trait]
impl Store for FlakyStore {
    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        self.inner.list_sources().await
    }
    async fn get_source(&self, id: SourceId) -> Result<Source, StoreError> {
        self.inner.get_source(id).await
    }
    async fn upsert_source(&self, source: Source) -> Result<Source, StoreError> {
        self.inner.upsert_source(source).await
    }
    async fn existing_keys(&self, source_id: SourceId) -> Result<HashSet<String>, StoreError> {
        self.inner.existing_keys(source_id).await
    }
    async fn insert_articles(&self, articles: Vec<NewArticle>) -> Result<usize, StoreError> {
        if self.fail_inserts {
            return Err(StoreError::Unavailable("database is read-only".into()));
        }
        self.inner.insert_articles(articles).await
    }
    async fn mark_fetched(&self, source_id: SourceId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.mark_fetched(source_id, at).await
    }
    async fn list_articles(&self, query: &ArticleQuery) -> Result<ArticlePage, StoreError> {
        self.inner.list_articles(query).await
    }
    async fn article_stats(&self, since: DateTime<Utc>) -> Result<ArticleStats, StoreError> {
        self.inner.article_stats(since).await
    }
}

pub fn settings(max_in_flight: usize, fetch_timeout: Duration, run_budget: Option<Duration>) -> CollectorSettings {
    CollectorSettings {
        max_in_flight,
        fetch_timeout,
        run_budget,
    }
}

/// Collector over a `MemoryStore` that is both article store and log sink.
pub fn memory_collector(
    registry: FetcherRegistry,
    sources: Vec<Source>,
    settings: CollectorSettings,
) -> (Collector, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_sources(sources));
    let collector = Collector::new(Arc::new(registry), store.clone(), store.clone(), settings);
    (collector, store)
}

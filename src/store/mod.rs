// src/store/mod.rs
//! Persistence seams of the collector: sources + articles ([`Store`]), the
//! append-only attempt log ([`FetchLogSink`]) and background-job state
//! ([`JobStore`]).

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::StoreError;
use crate::model::{
    Article, ArticleId, ContentType, FetchLog, JobConfig, NewArticle, Source, SourceId,
};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Oldest fetch logs are discarded beyond this many.
pub const MAX_RETAINED_LOGS: usize = 10_000;

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<Source>, StoreError>;

    /// `StoreError::SourceNotFound` when `id` is unknown.
    async fn get_source(&self, id: SourceId) -> Result<Source, StoreError>;

    /// Insert or replace by id. A non-positive id means "new": the store
    /// assigns one and returns the stored record.
    async fn upsert_source(&self, source: Source) -> Result<Source, StoreError>;

    /// Dedup keys already stored for `source_id`.
    async fn existing_keys(&self, source_id: SourceId) -> Result<HashSet<String>, StoreError>;

    /// Insert new articles, skipping any whose (source, key) pair already
    /// exists. Returns how many were actually created.
    async fn insert_articles(&self, articles: Vec<NewArticle>) -> Result<usize, StoreError>;

    async fn mark_fetched(&self, source_id: SourceId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list_articles(&self, query: &ArticleQuery) -> Result<ArticlePage, StoreError>;

    async fn article_stats(&self, since: DateTime<Utc>) -> Result<ArticleStats, StoreError>;
}

#[async_trait]
pub trait FetchLogSink: Send + Sync {
    async fn append(&self, log: FetchLog) -> Result<(), StoreError>;

    /// Newest first, optionally for one source only.
    async fn recent(
        &self,
        source_id: Option<SourceId>,
        limit: usize,
    ) -> Result<Vec<FetchLog>, StoreError>;
}

/// Job switches and the AI post-processing queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Ordered by job type.
    async fn job_configs(&self) -> Result<Vec<JobConfig>, StoreError>;

    async fn job_config(&self, job_type: &str) -> Result<Option<JobConfig>, StoreError>;

    /// Insert or replace by `job_type`.
    async fn upsert_job_config(&self, config: JobConfig) -> Result<JobConfig, StoreError>;

    /// Oldest (by publication time) article not yet AI-processed, optionally
    /// only among sources of `team`.
    async fn next_unprocessed(&self, team: Option<&str>) -> Result<Option<Article>, StoreError>;

    /// Store the AI text on the article and remember `ai_type` as the last
    /// type sent by `job_type`, in one write.
    async fn mark_ai_processed(
        &self,
        article_id: ArticleId,
        job_type: &str,
        ai_type: Option<String>,
        ai_content: String,
    ) -> Result<(), StoreError>;
}

/// Article listing filter + pagination (1-based pages).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub source_id: Option<SourceId>,
    pub content_type: Option<u8>,
}

impl ArticleQuery {
    pub fn page_size(&self) -> usize {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    fn matches(&self, a: &Article) -> bool {
        self.source_id.map_or(true, |id| a.source_id == id)
            && self
                .content_type
                .map_or(true, |ct| u8::from(a.content_type) == ct)
    }

    /// Newest first by publication time; a page past the end yields the last page.
    pub(crate) fn apply<'a>(&self, articles: impl Iterator<Item = &'a Article>) -> ArticlePage {
        let mut hits: Vec<&Article> = articles.filter(|a| self.matches(a)).collect();
        hits.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let page_size = self.page_size();
        let total = hits.len();
        let total_pages = total.div_ceil(page_size).max(1);
        let page = self.page.unwrap_or(1).clamp(1, total_pages);

        let items = hits
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();

        ArticlePage {
            items,
            page,
            page_size,
            total,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticlePage {
    pub items: Vec<Article>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleStats {
    pub total: usize,
    /// Created at or after the `since` passed to [`Store::article_stats`].
    pub recent: usize,
    pub by_source: BTreeMap<SourceId, usize>,
    pub by_content_type: BTreeMap<String, usize>,
}

impl ArticleStats {
    pub(crate) fn collect<'a>(
        articles: impl Iterator<Item = &'a Article>,
        since: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self::default();
        for ct in ContentType::ALL {
            stats.by_content_type.insert(ct.label().to_string(), 0);
        }
        for a in articles {
            stats.total += 1;
            if a.created_at >= since {
                stats.recent += 1;
            }
            *stats.by_source.entry(a.source_id).or_default() += 1;
            *stats
                .by_content_type
                .entry(a.content_type.label().to_string())
                .or_default() += 1;
        }
        stats
    }
}

// src/store/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{
    ArticlePage, ArticleQuery, ArticleStats, FetchLogSink, JobStore, Store, MAX_RETAINED_LOGS,
};
use crate::error::StoreError;
use crate::model::{Article, ArticleId, FetchLog, JobConfig, NewArticle, Source, SourceId};

/// Everything a store holds. Shared by the in-memory and the JSON-file store;
/// the latter persists it as one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct State {
    sources: BTreeMap<SourceId, Source>,
    articles: Vec<Article>,
    fetch_logs: Vec<FetchLog>,
    job_configs: BTreeMap<String, JobConfig>,
    next_source_id: SourceId,
    next_article_id: ArticleId,
    /// (source, dedup key) index; rebuilt after loading.
    #[serde(skip)]
    keys: HashMap<SourceId, HashSet<String>>,
}

impl State {
    pub(crate) fn reindex(&mut self) {
        self.keys.clear();
        for a in &self.articles {
            self.keys
                .entry(a.source_id)
                .or_default()
                .insert(a.dedup_key.clone());
        }
        let max_source = self.sources.keys().copied().max().unwrap_or(0);
        self.next_source_id = self.next_source_id.max(max_source + 1).max(1);
        let max_article = self.articles.iter().map(|a| a.id).max().unwrap_or(0);
        self.next_article_id = self.next_article_id.max(max_article + 1).max(1);
    }

    pub(crate) fn list_sources(&self) -> Vec<Source> {
        self.sources.values().cloned().collect()
    }

    pub(crate) fn get_source(&self, id: SourceId) -> Result<Source, StoreError> {
        self.sources
            .get(&id)
            .cloned()
            .ok_or(StoreError::SourceNotFound(id))
    }

    pub(crate) fn upsert_source(&mut self, mut source: Source) -> Source {
        if source.id <= 0 {
            source.id = self.next_source_id.max(1);
        }
        self.next_source_id = self.next_source_id.max(source.id + 1);
        self.sources.insert(source.id, source.clone());
        source
    }

    pub(crate) fn existing_keys(&self, source_id: SourceId) -> HashSet<String> {
        self.keys.get(&source_id).cloned().unwrap_or_default()
    }

    pub(crate) fn insert_articles(&mut self, articles: Vec<NewArticle>, now: DateTime<Utc>) -> usize {
        let mut inserted = 0;
        for a in articles {
            let keys = self.keys.entry(a.source_id).or_default();
            if !keys.insert(a.dedup_key.clone()) {
                continue;
            }
            let id = self.next_article_id.max(1);
            self.next_article_id = id + 1;
            self.articles.push(Article::from_new(id, a, now));
            inserted += 1;
        }
        inserted
    }

    pub(crate) fn mark_fetched(&mut self, source_id: SourceId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let src = self
            .sources
            .get_mut(&source_id)
            .ok_or(StoreError::SourceNotFound(source_id))?;
        src.last_fetched_at = Some(at);
        Ok(())
    }

    pub(crate) fn list_articles(&self, query: &ArticleQuery) -> ArticlePage {
        query.apply(self.articles.iter())
    }

    pub(crate) fn article_stats(&self, since: DateTime<Utc>) -> ArticleStats {
        ArticleStats::collect(self.articles.iter(), since)
    }

    pub(crate) fn append_log(&mut self, log: FetchLog) {
        self.fetch_logs.push(log);
        if self.fetch_logs.len() > MAX_RETAINED_LOGS {
            let excess = self.fetch_logs.len() - MAX_RETAINED_LOGS;
            self.fetch_logs.drain(..excess);
        }
    }

    pub(crate) fn job_configs(&self) -> Vec<JobConfig> {
        self.job_configs.values().cloned().collect()
    }

    pub(crate) fn job_config(&self, job_type: &str) -> Option<JobConfig> {
        self.job_configs.get(job_type).cloned()
    }

    pub(crate) fn upsert_job_config(&mut self, config: JobConfig) -> JobConfig {
        self.job_configs
            .insert(config.job_type.clone(), config.clone());
        config
    }

    pub(crate) fn next_unprocessed(&self, team: Option<&str>) -> Option<Article> {
        self.articles
            .iter()
            .filter(|a| !a.is_ai_processed)
            .filter(|a| {
                team.map_or(true, |t| {
                    self.sources
                        .get(&a.source_id)
                        .and_then(|s| s.team.as_deref())
                        == Some(t)
                })
            })
            .min_by(|a, b| a.published_at.cmp(&b.published_at).then(a.id.cmp(&b.id)))
            .cloned()
    }

    pub(crate) fn mark_ai_processed(
        &mut self,
        article_id: ArticleId,
        job_type: &str,
        ai_type: Option<String>,
        ai_content: String,
    ) -> Result<(), StoreError> {
        let article = self
            .articles
            .iter_mut()
            .find(|a| a.id == article_id)
            .ok_or(StoreError::ArticleNotFound(article_id))?;
        article.ai_content = Some(ai_content);
        article.is_ai_processed = true;
        article.ai_type = ai_type.clone();
        if let Some(cfg) = self.job_configs.get_mut(job_type) {
            cfg.last_type_sent = ai_type;
        }
        Ok(())
    }

    pub(crate) fn recent_logs(&self, source_id: Option<SourceId>, limit: usize) -> Vec<FetchLog> {
        self.fetch_logs
            .iter()
            .rev()
            .filter(|l| source_id.map_or(true, |id| l.source_id == id))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Process-local store. Used by tests and by the CLI when no file is wanted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with sources (ids kept as given; non-positive ids get assigned).
    pub fn with_sources(sources: impl IntoIterator<Item = Source>) -> Self {
        let mut state = State::default();
        for s in sources {
            state.upsert_source(s);
        }
        state.reindex();
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self.lock()?.list_sources())
    }

    async fn get_source(&self, id: SourceId) -> Result<Source, StoreError> {
        self.lock()?.get_source(id)
    }

    async fn upsert_source(&self, source: Source) -> Result<Source, StoreError> {
        Ok(self.lock()?.upsert_source(source))
    }

    async fn existing_keys(&self, source_id: SourceId) -> Result<HashSet<String>, StoreError> {
        Ok(self.lock()?.existing_keys(source_id))
    }

    async fn insert_articles(&self, articles: Vec<NewArticle>) -> Result<usize, StoreError> {
        Ok(self.lock()?.insert_articles(articles, Utc::now()))
    }

    async fn mark_fetched(&self, source_id: SourceId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.lock()?.mark_fetched(source_id, at)
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<ArticlePage, StoreError> {
        Ok(self.lock()?.list_articles(query))
    }

    async fn article_stats(&self, since: DateTime<Utc>) -> Result<ArticleStats, StoreError> {
        Ok(self.lock()?.article_stats(since))
    }
}

#[async_trait]
impl FetchLogSink for MemoryStore {
    async fn append(&self, log: FetchLog) -> Result<(), StoreError> {
        self.lock()?.append_log(log);
        Ok(())
    }

    async fn recent(
        &self,
        source_id: Option<SourceId>,
        limit: usize,
    ) -> Result<Vec<FetchLog>, StoreError> {
        Ok(self.lock()?.recent_logs(source_id, limit))
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn job_configs(&self) -> Result<Vec<JobConfig>, StoreError> {
        Ok(self.lock()?.job_configs())
    }

    async fn job_config(&self, job_type: &str) -> Result<Option<JobConfig>, StoreError> {
        Ok(self.lock()?.job_config(job_type))
    }

    async fn upsert_job_config(&self, config: JobConfig) -> Result<JobConfig, StoreError> {
        Ok(self.lock()?.upsert_job_config(config))
    }

    async fn next_unprocessed(&self, team: Option<&str>) -> Result<Option<Article>, StoreError> {
        Ok(self.lock()?.next_unprocessed(team))
    }

    async fn mark_ai_processed(
        &self,
        article_id: ArticleId,
        job_type: &str,
        ai_type: Option<String>,
        ai_content: String,
    ) -> Result<(), StoreError> {
        self.lock()?
            .mark_ai_processed(article_id, job_type, ai_type, ai_content)
    }
}

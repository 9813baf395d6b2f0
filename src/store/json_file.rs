// src/store/json_file.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Mutex;

use super::memory::State;
use super::{ArticlePage, ArticleQuery, ArticleStats, FetchLogSink, JobStore, Store};
use crate::error::StoreError;
use crate::model::{Article, ArticleId, FetchLog, JobConfig, NewArticle, Source, SourceId};

/// How long a writer waits for `<path>.lock` before giving up.
const LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(20);
/// A lock file older than this is left over from a crashed writer.
const STALE_LOCK: Duration = Duration::from_secs(60);

/// Single-document JSON store that several processes may share.
///
/// Writers take `<path>.lock` (created exclusively), reload the document from
/// disk, apply their change, write `<path>.tmp` and rename it over `path`.
/// Readers reload whenever the file's size or mtime moved since they last
/// saw it. The cached state only changes once a write succeeded.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    cache: Mutex<Cached>,
}

#[derive(Debug, Default)]
struct Cached {
    state: State,
    stamp: Option<Stamp>,
}

/// What the file looked like when it was last loaded or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file doesn't exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (state, stamp) = load(&path).await?;
        tracing::info!(path = %path.display(), "json store opened");
        Ok(Self {
            lock_path: sibling(&path, ".lock"),
            path,
            cache: Mutex::new(Cached { state, stamp }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let mut cache = self.cache.lock().await;
        if stamp(&self.path).await? != cache.stamp {
            let (state, stamp) = load(&self.path).await?;
            *cache = Cached { state, stamp };
        }
        Ok(f(&cache.state))
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut cache = self.cache.lock().await;
        let _lock = FileLock::acquire(&self.lock_path).await?;

        // Another process may have written since our last look.
        let (mut next, _) = load(&self.path).await?;
        let out = f(&mut next)?;
        self.persist(&next).await?;
        let stamp = stamp(&self.path).await?;
        *cache = Cached { state: next, stamp };
        Ok(out)
    }

    async fn persist(&self, state: &State) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(state)?;
        let tmp = sibling(&self.path, ".tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

async fn stamp(path: &Path) -> Result<Option<Stamp>, StoreError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(Stamp {
            len: meta.len(),
            modified: meta.modified().ok(),
        })),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Missing or blank file = empty state.
async fn load(path: &Path) -> Result<(State, Option<Stamp>), StoreError> {
    let stamp = stamp(path).await?;
    let mut state = match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => State::default(),
        Ok(bytes) => serde_json::from_slice::<State>(&bytes)?,
        Err(e) if e.kind() == ErrorKind::NotFound => State::default(),
        Err(e) => return Err(e.into()),
    };
    state.reindex();
    Ok((state, stamp))
}

/// Exclusive `<path>.lock`, removed on drop.
#[derive(Debug)]
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    async fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let started = Instant::now();
        loop {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await;
            match created {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path).await {
                        tracing::warn!(lock = %path.display(), "removing stale store lock");
                        let _ = tokio::fs::remove_file(path).await;
                        continue;
                    }
                    if started.elapsed() >= LOCK_WAIT {
                        return Err(StoreError::Unavailable(format!(
                            "store is locked by another writer ({})",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

async fn is_stale(path: &Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|m| m.elapsed().ok())
        .is_some_and(|age| age > STALE_LOCK)
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        self.read(State::list_sources).await
    }

    async fn get_source(&self, id: SourceId) -> Result<Source, StoreError> {
        self.read(|s| s.get_source(id)).await?
    }

    async fn upsert_source(&self, source: Source) -> Result<Source, StoreError> {
        self.mutate(|s| Ok(s.upsert_source(source))).await
    }

    async fn existing_keys(&self, source_id: SourceId) -> Result<HashSet<String>, StoreError> {
        self.read(|s| s.existing_keys(source_id)).await
    }

    async fn insert_articles(&self, articles: Vec<NewArticle>) -> Result<usize, StoreError> {
        if articles.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        self.mutate(|s| Ok(s.insert_articles(articles, now))).await
    }

    async fn mark_fetched(&self, source_id: SourceId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(|s| s.mark_fetched(source_id, at)).await
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<ArticlePage, StoreError> {
        self.read(|s| s.list_articles(query)).await
    }

    async fn article_stats(&self, since: DateTime<Utc>) -> Result<ArticleStats, StoreError> {
        self.read(|s| s.article_stats(since)).await
    }
}

#[async_trait]
impl FetchLogSink for JsonFileStore {
    async fn append(&self, log: FetchLog) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.append_log(log);
            Ok(())
        })
        .await
    }

    async fn recent(
        &self,
        source_id: Option<SourceId>,
        limit: usize,
    ) -> Result<Vec<FetchLog>, StoreError> {
        self.read(|s| s.recent_logs(source_id, limit)).await
    }
}

#[async_trait]
impl JobStore for JsonFileStore {
    async fn job_configs(&self) -> Result<Vec<JobConfig>, StoreError> {
        self.read(State::job_configs).await
    }

    async fn job_config(&self, job_type: &str) -> Result<Option<JobConfig>, StoreError> {
        self.read(|s| s.job_config(job_type)).await
    }

    async fn upsert_job_config(&self, config: JobConfig) -> Result<JobConfig, StoreError> {
        self.mutate(|s| Ok(s.upsert_job_config(config))).await
    }

    async fn next_unprocessed(&self, team: Option<&str>) -> Result<Option<Article>, StoreError> {
        self.read(|s| s.next_unprocessed(team)).await
    }

    async fn mark_ai_processed(
        &self,
        article_id: ArticleId,
        job_type: &str,
        ai_type: Option<String>,
        ai_content: String,
    ) -> Result<(), StoreError> {
        self.mutate(|s| s.mark_ai_processed(article_id, job_type, ai_type, ai_content))
            .await
    }
}

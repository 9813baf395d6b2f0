// src/api.rs
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::error::{RunError, StoreError};
use crate::ingest::collector::{Collector, RunReport};
use crate::model::{Article, ContentType, FetchLog, JobConfig, SourceId};
use crate::store::{ArticleQuery, FetchLogSink, JobStore, Store};

/// Attempts considered by the success rate on `/api/stats`.
const STATS_LOG_WINDOW: usize = 100;
const TOP_SOURCES: usize = 5;
const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    pub store: Arc<dyn Store>,
    pub logs: Arc<dyn FetchLogSink>,
    pub jobs: Arc<dyn JobStore>,
    /// Cancelled on shutdown; HTTP-triggered runs stop starting new sources.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/collect", post(collect))
        .route("/api/articles", get(list_articles))
        .route("/api/sources", get(list_sources))
        .route("/api/stats", get(stats))
        .route("/api/fetch-logs", get(fetch_logs))
        .route("/api/job-config", get(list_job_configs).post(update_job_config))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Envelope + errors
// ---------------------------------------------------------------------------

fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "success": false, "error": msg }))).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SourceNotFound(id) => {
                ApiError::NotFound(format!("Source with ID {id} not found"))
            }
            StoreError::ArticleNotFound(id) => {
                ApiError::NotFound(format!("Article with ID {id} not found"))
            }
            other => {
                tracing::error!(error = %other, "store error while serving request");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<RunError> for ApiError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::SourceNotFound(id) | RunError::SourceInactive(id) => {
                ApiError::NotFound(format!("Source with ID {id} not found or inactive"))
            }
            RunError::Store(e) => e.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/collect
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CollectReq {
    source_id: Option<SourceId>,
    force: bool,
    team: Option<String>,
}

#[derive(Serialize)]
struct CollectResp {
    sources_processed: usize,
    successful_sources: usize,
    partial_sources: usize,
    failed_sources: usize,
    total_new_articles: usize,
    not_due: usize,
    not_attempted: Vec<SourceId>,
    warnings: Vec<String>,
    logs: Vec<FetchLog>,
}

impl From<RunReport> for CollectResp {
    fn from(r: RunReport) -> Self {
        let s = r.summary();
        Self {
            sources_processed: s.sources_processed,
            successful_sources: s.successful,
            partial_sources: s.partial,
            failed_sources: s.failed,
            total_new_articles: s.total_new_articles,
            not_due: r.not_due.len(),
            not_attempted: r.not_attempted,
            warnings: r.warnings,
            logs: r.logs,
        }
    }
}

async fn collect(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    // Empty body = collect everything that is due.
    let req: CollectReq = if body.iter().all(u8::is_ascii_whitespace) {
        CollectReq::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?
    };

    let report = match req.source_id {
        Some(id) => state.collector.collect_one(id, &state.shutdown).await?,
        None => {
            let team = req.team.as_deref().map(str::trim).filter(|t| !t.is_empty());
            state
                .collector
                .collect_active(req.force, team, &state.shutdown)
                .await?
        }
    };

    Ok(ok(CollectResp::from(report)))
}

// ---------------------------------------------------------------------------
// GET /api/articles
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SourceRef {
    id: SourceId,
    name: String,
    kind: String,
}

#[derive(Serialize)]
struct ArticleOut {
    id: i64,
    title: String,
    url: Option<String>,
    source: Option<SourceRef>,
    content_type: &'static str,
    published_at: String,
    created_at: String,
    summary: String,
    is_ai_processed: bool,
    ai_type: Option<String>,
    ai_content: Option<String>,
}

async fn list_articles(
    State(state): State<AppState>,
    query: Result<Query<ArticleQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    if let Some(ct) = q.content_type {
        ContentType::try_from(ct).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    }
    let page = state.store.list_articles(&q).await?;
    let sources: HashMap<SourceId, SourceRef> = state
        .store
        .list_sources()
        .await?
        .into_iter()
        .map(|s| {
            (
                s.id,
                SourceRef {
                    id: s.id,
                    name: s.name,
                    kind: s.kind.to_string(),
                },
            )
        })
        .collect();

    let articles: Vec<ArticleOut> = page
        .items
        .into_iter()
        .map(|a: Article| ArticleOut {
            id: a.id,
            source: sources.get(&a.source_id).map(|s| SourceRef {
                id: s.id,
                name: s.name.clone(),
                kind: s.kind.clone(),
            }),
            title: a.title,
            url: a.url,
            content_type: a.content_type.label(),
            published_at: a.published_at.to_rfc3339(),
            created_at: a.created_at.to_rfc3339(),
            summary: a.summary,
            is_ai_processed: a.is_ai_processed,
            ai_type: a.ai_type,
            ai_content: a.ai_content,
        })
        .collect();

    Ok(ok(json!({
        "articles": articles,
        "pagination": {
            "current_page": page.page,
            "total_pages": page.total_pages,
            "total_items": page.total,
            "has_next": page.page < page.total_pages,
            "has_previous": page.page > 1,
            "page_size": page.page_size,
        }
    })))
}

// ---------------------------------------------------------------------------
// GET /api/sources
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SourceOut {
    id: SourceId,
    name: String,
    url: String,
    kind: String,
    content_type: &'static str,
    team: Option<String>,
    is_active: bool,
    fetch_interval_secs: u64,
    last_fetched_at: Option<String>,
    articles_count: usize,
    last_fetch_status: Option<&'static str>,
    last_fetch_new_articles: usize,
}

async fn list_sources(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut sources = state.store.list_sources().await?;
    sources.sort_by(|a, b| a.name.cmp(&b.name));
    let stats = state.store.article_stats(Utc::now()).await?;

    let mut out = Vec::with_capacity(sources.len());
    for s in sources {
        let last = state.logs.recent(Some(s.id), 1).await?.pop();
        out.push(SourceOut {
            id: s.id,
            articles_count: stats.by_source.get(&s.id).copied().unwrap_or(0),
            last_fetch_status: last.as_ref().map(|l| l.status.as_str()),
            last_fetch_new_articles: last.as_ref().map_or(0, |l| l.counts.new),
            name: s.name,
            url: s.url,
            kind: s.kind.to_string(),
            content_type: s.content_type.label(),
            team: s.team,
            is_active: s.is_active,
            fetch_interval_secs: s.fetch_interval.as_secs(),
            last_fetched_at: s.last_fetched_at.map(|t| t.to_rfc3339()),
        });
    }

    let total = out.len();
    Ok(ok(json!({ "sources": out, "total_count": total })))
}

// ---------------------------------------------------------------------------
// GET /api/stats
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TopSource {
    id: SourceId,
    name: String,
    articles_count: usize,
}

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sources = state.store.list_sources().await?;
    let articles = state
        .store
        .article_stats(Utc::now() - ChronoDuration::hours(24))
        .await?;
    let recent_logs = state.logs.recent(None, STATS_LOG_WINDOW).await?;

    let success_rate = if recent_logs.is_empty() {
        0.0
    } else {
        let ok_count = recent_logs
            .iter()
            .filter(|l| l.status == crate::model::FetchStatus::Success)
            .count();
        let pct = ok_count as f64 / recent_logs.len() as f64 * 100.0;
        (pct * 100.0).round() / 100.0
    };

    let mut top: Vec<TopSource> = sources
        .iter()
        .map(|s| TopSource {
            id: s.id,
            name: s.name.clone(),
            articles_count: articles.by_source.get(&s.id).copied().unwrap_or(0),
        })
        .collect();
    top.sort_by(|a, b| b.articles_count.cmp(&a.articles_count).then(a.id.cmp(&b.id)));
    top.truncate(TOP_SOURCES);

    Ok(ok(json!({
        "total_sources": sources.len(),
        "active_sources": sources.iter().filter(|s| s.is_active).count(),
        "total_articles": articles.total,
        "articles_by_content_type": articles.by_content_type,
        "recent_articles_24h": articles.recent,
        "success_rate": success_rate,
        "top_sources": top,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/fetch-logs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogsQuery {
    source_id: Option<SourceId>,
    limit: Option<usize>,
}

async fn fetch_logs(
    State(state): State<AppState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(q) = query?;
    let limit = q.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let logs = state.logs.recent(q.source_id, limit).await?;
    Ok(ok(json!({ "logs": logs, "count": logs.len() })))
}

// ---------------------------------------------------------------------------
// GET/POST /api/job-config
// ---------------------------------------------------------------------------

async fn list_job_configs(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(ok(state.jobs.job_configs().await?))
}

/// Partial update; unknown job types are created disabled first.
#[derive(Debug, Deserialize)]
struct JobConfigUpdate {
    job_type: Option<String>,
    enabled: Option<bool>,
    limit: Option<u32>,
    round_robin_types: Option<Vec<String>>,
}

async fn update_job_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: JobConfigUpdate = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
    let job_type = req
        .job_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("job_type is required".into()))?;

    let mut cfg = state
        .jobs
        .job_config(job_type)
        .await?
        .unwrap_or_else(|| JobConfig::new(job_type));
    if let Some(enabled) = req.enabled {
        cfg.enabled = enabled;
    }
    if let Some(limit) = req.limit {
        if limit == 0 {
            return Err(ApiError::BadRequest("limit must be at least 1".into()));
        }
        cfg.limit = limit;
    }
    if let Some(types) = req.round_robin_types {
        cfg.round_robin_types = types
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }

    let saved = state.jobs.upsert_job_config(cfg).await?;
    tracing::info!(job_type = %saved.job_type, enabled = saved.enabled, limit = saved.limit, "job config updated");
    Ok(ok(saved))
}

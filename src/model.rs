// src/model.rs
//! Records shared by fetchers, the normalizer, the stores and the HTTP API.
//!
//! - [`Source`] is validated when it is constructed (or deserialized), so a
//!   source that exists always carries a params document matching its kind.
//! - [`Article`] is created once per dedup key and source; afterwards only
//!   its AI post-processing fields change.
//! - [`FetchLog`] is the immutable outcome of one attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CollectError, ErrorKind, SourceError};

pub type SourceId = i64;
pub type ArticleId = i64;

/// Default cadence for sources that don't specify one (seconds).
pub const DEFAULT_FETCH_INTERVAL_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// Source kind
// ---------------------------------------------------------------------------

/// Tag selecting the fetcher for a source. Open set: any tag is representable,
/// only tags known to the registry can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SourceKind(String);

impl SourceKind {
    pub const FEED: &'static str = "feed";
    pub const API: &'static str = "api";
    pub const AGENT_SCRAPE: &'static str = "agent_scrape";

    /// Lowercases the tag and folds legacy aliases (`rss`, `static`).
    pub fn new(tag: impl AsRef<str>) -> Self {
        let t = tag.as_ref().trim().to_ascii_lowercase();
        let canon = match t.as_str() {
            "rss" | "atom" => Self::FEED,
            "static" | "agentql" => Self::AGENT_SCRAPE,
            _ => return Self(t),
        };
        Self(canon.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SourceKind {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SourceKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<SourceKind> for String {
    fn from(k: SourceKind) -> Self {
        k.0
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Content type classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ContentType {
    Economy = 1,
    Social = 2,
    Technology = 3,
    General = 4,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Economy,
        ContentType::Social,
        ContentType::Technology,
        ContentType::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Economy => "Economy/Finance",
            Self::Social => "YouTube/Social Media",
            Self::Technology => "Technology",
            Self::General => "General News",
        }
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::General
    }
}

impl TryFrom<u8> for ContentType {
    type Error = SourceError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::Economy),
            2 => Ok(Self::Social),
            3 => Ok(Self::Technology),
            4 => Ok(Self::General),
            other => Err(SourceError::UnknownContentType(other)),
        }
    }
}

impl From<ContentType> for u8 {
    fn from(c: ContentType) -> Self {
        c as u8
    }
}

// ---------------------------------------------------------------------------
// Per-kind params
// ---------------------------------------------------------------------------

/// `api` kind: request decoration plus where the item list lives in the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiParams {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    /// Dot-separated path to the item array, e.g. `response.results`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_path: Option<String>,
}

/// `agent_scrape` kind: credentials and the natural-language extraction prompt.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentScrapeParams {
    pub api_key: String,
    pub prompt: String,
}

impl fmt::Debug for AgentScrapeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentScrapeParams")
            .field("api_key", &format_args!("<{} chars>", self.api_key.len()))
            .field("prompt", &self.prompt)
            .finish()
    }
}

/// Strongly typed view of a source's configuration document.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceParams {
    Feed,
    Api(ApiParams),
    AgentScrape(AgentScrapeParams),
    /// Kinds registered outside this crate keep their document as-is.
    Other(Value),
}

impl SourceParams {
    /// Validate `doc` against the shape required by `kind`.
    pub fn parse(kind: &SourceKind, doc: Value) -> Result<Self, SourceError> {
        let doc = match doc {
            Value::Null => Value::Object(Default::default()),
            d => d,
        };
        let invalid = |reason: String| SourceError::InvalidParams {
            kind: kind.to_string(),
            reason,
        };

        match kind.as_str() {
            SourceKind::FEED => {
                if doc.is_object() {
                    Ok(Self::Feed)
                } else {
                    Err(invalid("expected an object".into()))
                }
            }
            SourceKind::API => serde_json::from_value(doc)
                .map(Self::Api)
                .map_err(|e| invalid(e.to_string())),
            SourceKind::AGENT_SCRAPE => {
                let p: AgentScrapeParams =
                    serde_json::from_value(doc).map_err(|e| invalid(e.to_string()))?;
                if p.api_key.trim().is_empty() {
                    return Err(invalid("`api_key` must not be empty".into()));
                }
                if p.prompt.trim().is_empty() {
                    return Err(invalid("`prompt` must not be empty".into()));
                }
                Ok(Self::AgentScrape(p))
            }
            _ => Ok(Self::Other(doc)),
        }
    }

    pub fn to_document(&self) -> Value {
        match self {
            Self::Feed => Value::Object(Default::default()),
            Self::Api(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::AgentScrape(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::Other(v) => v.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SourceRecord", into = "SourceRecord")]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub params: SourceParams,
    pub content_type: ContentType,
    pub team: Option<String>,
    pub fetch_interval: Duration,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Source {
    /// Build an active source with the default cadence, validating the params
    /// document against `kind`.
    pub fn new(
        id: SourceId,
        name: impl Into<String>,
        kind: impl Into<SourceKind>,
        url: impl Into<String>,
        params: Value,
    ) -> Result<Self, SourceError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(SourceError::EmptyName);
        }
        let kind = kind.into();
        let url = url.into().trim().to_string();
        validate_locator(&url)?;
        let params = SourceParams::parse(&kind, params)?;

        Ok(Self {
            id,
            name,
            kind,
            url,
            params,
            content_type: ContentType::default(),
            team: None,
            fetch_interval: Duration::from_secs(DEFAULT_FETCH_INTERVAL_SECS),
            last_fetched_at: None,
            is_active: true,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.fetch_interval = interval;
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn with_last_fetched(mut self, at: DateTime<Utc>) -> Self {
        self.last_fetched_at = Some(at);
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

fn validate_locator(raw: &str) -> Result<(), SourceError> {
    let invalid = |reason: &str| SourceError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(invalid("scheme must be http or https")),
    }
}

/// Wire/disk shape of a source: the params stay an opaque document and are
/// validated again on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SourceRecord {
    id: SourceId,
    name: String,
    kind: SourceKind,
    url: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    content_type: ContentType,
    #[serde(default)]
    team: Option<String>,
    #[serde(default = "default_interval_secs")]
    fetch_interval_secs: u64,
    #[serde(default)]
    last_fetched_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_interval_secs() -> u64 {
    DEFAULT_FETCH_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

impl TryFrom<SourceRecord> for Source {
    type Error = SourceError;

    fn try_from(r: SourceRecord) -> Result<Self, Self::Error> {
        let mut s = Source::new(r.id, r.name, r.kind, r.url, r.params)?;
        s.content_type = r.content_type;
        s.team = r.team;
        s.fetch_interval = Duration::from_secs(r.fetch_interval_secs);
        s.last_fetched_at = r.last_fetched_at;
        s.is_active = r.is_active;
        Ok(s)
    }
}

impl From<Source> for SourceRecord {
    fn from(s: Source) -> Self {
        Self {
            id: s.id,
            name: s.name,
            kind: s.kind,
            url: s.url,
            params: s.params.to_document(),
            content_type: s.content_type,
            team: s.team,
            fetch_interval_secs: s.fetch_interval.as_secs(),
            last_fetched_at: s.last_fetched_at,
            is_active: s.is_active,
        }
    }
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

/// Normalizer output, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArticle {
    pub source_id: SourceId,
    /// Per-source unique key (canonical URL or synthetic `agent:` key).
    pub dedup_key: String,
    pub url: Option<String>,
    pub title: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub source_id: SourceId,
    pub dedup_key: String,
    pub url: Option<String>,
    pub title: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
    /// Text produced by the AI job, once it ran.
    #[serde(default)]
    pub ai_content: Option<String>,
    #[serde(default)]
    pub is_ai_processed: bool,
    /// Audience the AI text was written for (a team code).
    #[serde(default)]
    pub ai_type: Option<String>,
}

impl Article {
    pub fn from_new(id: ArticleId, a: NewArticle, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            source_id: a.source_id,
            dedup_key: a.dedup_key,
            url: a.url,
            title: a.title,
            summary: a.summary,
            published_at: a.published_at,
            content_type: a.content_type,
            created_at,
            ai_content: None,
            is_ai_processed: false,
            ai_type: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Background job settings
// ---------------------------------------------------------------------------

/// Job type of the AI post-processing job.
pub const OPENROUTER_JOB: &str = "openrouter";

/// Audiences cycled through when an article's source has no team.
pub const DEFAULT_ROUND_ROBIN_TYPES: [&str; 3] = ["dev", "ba", "system"];

/// Runtime switch + state of a background job, editable over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_type: String,
    #[serde(default)]
    pub enabled: bool,
    /// Articles handled per tick.
    #[serde(default = "default_job_limit")]
    pub limit: u32,
    #[serde(default)]
    pub round_robin_types: Vec<String>,
    #[serde(default)]
    pub last_type_sent: Option<String>,
}

fn default_job_limit() -> u32 {
    1
}

impl JobConfig {
    /// Disabled, one article per tick.
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            enabled: false,
            limit: default_job_limit(),
            round_robin_types: Vec::new(),
            last_type_sent: None,
        }
    }

    /// The audience after `last_type_sent`, wrapping around.
    pub fn next_round_robin_type(&self) -> String {
        let types: Vec<&str> = if self.round_robin_types.is_empty() {
            DEFAULT_ROUND_ROBIN_TYPES.to_vec()
        } else {
            self.round_robin_types.iter().map(String::as_str).collect()
        };
        let next = self
            .last_type_sent
            .as_deref()
            .and_then(|last| types.iter().position(|t| *t == last))
            .map_or(0, |i| (i + 1) % types.len());
        types[next].to_string()
    }
}

// ---------------------------------------------------------------------------
// Fetch logs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Partial,
    Failure,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    /// Raw items returned by the fetcher.
    pub fetched: usize,
    /// Articles actually created.
    pub new: usize,
    /// Already stored, repeated in the batch, or rejected by the store's unique key.
    pub duplicate: usize,
    /// Items without a usable dedup key.
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLogError {
    pub kind: ErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchLog {
    pub id: Uuid,
    pub source_id: SourceId,
    pub source_name: String,
    pub kind: SourceKind,
    pub status: FetchStatus,
    #[serde(flatten)]
    pub counts: ItemCounts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchLogError>,
    /// Start of the attempt.
    pub fetched_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl FetchLog {
    /// Log for an attempt that made it through persistence; `partial` when
    /// some items had to be dropped.
    pub fn completed(
        source: &Source,
        fetched_at: DateTime<Utc>,
        duration: Duration,
        counts: ItemCounts,
    ) -> Self {
        let (status, error) = if counts.dropped > 0 {
            (
                FetchStatus::Partial,
                Some(FetchLogError {
                    kind: ErrorKind::Parse,
                    detail: format!(
                        "{} of {} item(s) had no usable key and were dropped",
                        counts.dropped, counts.fetched
                    ),
                }),
            )
        } else {
            (FetchStatus::Success, None)
        };
        Self::build(source, status, counts, error, fetched_at, duration)
    }

    pub fn failed(
        source: &Source,
        fetched_at: DateTime<Utc>,
        duration: Duration,
        counts: ItemCounts,
        err: &CollectError,
    ) -> Self {
        let error = Some(FetchLogError {
            kind: err.kind(),
            detail: err.to_string(),
        });
        Self::build(source, FetchStatus::Failure, counts, error, fetched_at, duration)
    }

    fn build(
        source: &Source,
        status: FetchStatus,
        counts: ItemCounts,
        error: Option<FetchLogError>,
        fetched_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source.id,
            source_name: source.name.clone(),
            kind: source.kind.clone(),
            status,
            counts,
            error,
            fetched_at,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

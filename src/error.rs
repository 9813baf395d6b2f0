// src/error.rs
//! Error taxonomy of the collection engine.
//!
//! Everything that can go wrong while collecting one source ends up as a
//! [`CollectError`], which the orchestrator turns into a `failure` fetch log.
//! Only [`RunError`] ever reaches the caller of a collection run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{ArticleId, SourceId, SourceKind};

/// Transport-level failure while talking to a source (or to the extraction agent).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(e.to_string());
        }
        if e.is_connect() {
            return Self::Connect(e.to_string());
        }
        if let Some(status) = e.status() {
            return Self::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        Self::Transport(e.to_string())
    }
}

/// Persistence collaborator failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("source {0} not found")]
    SourceNotFound(SourceId),

    #[error("article {0} not found")]
    ArticleNotFound(ArticleId),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Per-source failure. Never propagated past the per-source boundary.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("no fetcher registered for source kind `{0}`")]
    UnknownKind(SourceKind),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl CollectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownKind(_) => ErrorKind::UnknownKind,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

/// Tag recorded on a fetch log next to the human-readable detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "UnknownKindError")]
    UnknownKind,
    #[serde(rename = "FetchError")]
    Fetch,
    #[serde(rename = "ParseError")]
    Parse,
    #[serde(rename = "PersistenceError")]
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownKind => "UnknownKindError",
            Self::Fetch => "FetchError",
            Self::Parse => "ParseError",
            Self::Persistence => "PersistenceError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected source definition (bad kind document, bad locator, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source name must not be empty")]
    EmptyName,

    #[error("invalid source url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid `{kind}` params: {reason}")]
    InvalidParams { kind: String, reason: String },

    #[error("unknown content type {0}")]
    UnknownContentType(u8),
}

/// Failure talking to the summarization provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    #[error("OpenRouter API key must start with `sk-or-`")]
    InvalidApiKey,

    #[error("AI provider HTTP {0}")]
    Status(u16),

    #[error("AI provider request failed: {0}")]
    Transport(String),

    #[error("AI provider returned no content")]
    EmptyResponse,
}

/// Errors surfaced to whoever triggered a collection run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("source {0} not found")]
    SourceNotFound(SourceId),

    #[error("source {0} is inactive")]
    SourceInactive(SourceId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RunError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SourceNotFound(id) => Self::SourceNotFound(id),
            other => Self::Store(other),
        }
    }
}

// src/ingest/providers/mod.rs
pub mod agent;
pub mod api;
pub mod feed;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::{Client, Response};

use crate::config::CollectorConfig;
use crate::error::{CollectError, FetchError};

/// Shared client for all built-in fetchers. Request timeout mirrors the
/// orchestrator's per-fetch budget so reqwest gives up at the same time.
pub fn build_http_client(cfg: &CollectorConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(cfg.user_agent.as_str())
        .connect_timeout(cfg.connect_timeout())
        .timeout(cfg.fetch_timeout())
        .build()
}

/// Map non-2xx to `FetchError::Status`.
pub(crate) fn ensure_success(resp: Response) -> Result<Response, CollectError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(FetchError::Status {
        status: status.as_u16(),
        url: resp.url().to_string(),
    }
    .into())
}

/// Body read failures are transport errors, decode failures are parse errors.
pub(crate) async fn read_json(resp: Response, what: &str) -> Result<serde_json::Value, CollectError> {
    resp.json().await.map_err(|e| {
        if e.is_decode() {
            CollectError::parse(format!("{what} body is not valid JSON: {e}"))
        } else {
            FetchError::from(e).into()
        }
    })
}

/// Offset-carrying layouts tried after RFC 2822 / 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%z"];

/// Layouts without an offset; read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// RFC 2822 (RSS) or RFC 3339 (Atom, most JSON APIs), then the looser
/// layouts real feeds use (`2025-03-04 08:30:00`, `04/03/2025 08:30`, a bare
/// date). Anything else is `None`.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(ts).or_else(|_| DateTime::parse_from_rfc3339(ts)) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(ts, f).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(ts, f).ok())
    {
        return Some(naive.and_utc());
    }
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(ts, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::CollectError;
use crate::model::Source;

/// One entry of an RSS/Atom document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub guid: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// One record returned by the extraction agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedRecord {
    pub url: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    /// The element exactly as the agent returned it.
    pub raw: Value,
}

/// Unnormalized fetcher output. Shape depends on the source kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Feed(FeedEntry),
    Api(Value),
    Scraped(ScrapedRecord),
}

/// Retrieves raw items for one source kind.
///
/// Implementations must not assume they are the only call in flight; the
/// orchestrator wraps every call in its own timeout.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, CollectError>;
    fn name(&self) -> &'static str;
}

// src/ingest/registry.rs
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::ingest::providers::{
    agent::AgentScrapeFetcher, api::ApiFetcher, build_http_client, feed::FeedFetcher,
};
use crate::ingest::types::Fetcher;
use crate::model::SourceKind;

/// Kind tag → fetcher. The only place that knows which kinds exist.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<SourceKind, Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in feed, api and agent_scrape fetchers sharing one HTTP client.
    pub fn with_defaults(cfg: &CollectorConfig) -> reqwest::Result<Self> {
        let client = build_http_client(cfg)?;
        Ok(Self::new()
            .with(SourceKind::FEED, Arc::new(FeedFetcher::new(client.clone())))
            .with(SourceKind::API, Arc::new(ApiFetcher::new(client.clone())))
            .with(
                SourceKind::AGENT_SCRAPE,
                Arc::new(AgentScrapeFetcher::new(client, cfg.agent_endpoint.clone())),
            ))
    }

    /// Associate `kind` with `fetcher`, returning the one it replaces.
    pub fn register(
        &mut self,
        kind: impl Into<SourceKind>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Option<Arc<dyn Fetcher>> {
        self.fetchers.insert(kind.into(), fetcher)
    }

    pub fn with(mut self, kind: impl Into<SourceKind>, fetcher: Arc<dyn Fetcher>) -> Self {
        self.register(kind, fetcher);
        self
    }

    pub fn create(&self, kind: &SourceKind) -> Result<Arc<dyn Fetcher>, CollectError> {
        self.fetchers
            .get(kind)
            .cloned()
            .ok_or_else(|| CollectError::UnknownKind(kind.clone()))
    }

    pub fn kinds(&self) -> Vec<&SourceKind> {
        let mut v: Vec<_> = self.fetchers.keys().collect();
        v.sort();
        v
    }
}

impl fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

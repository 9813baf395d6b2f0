// src/ingest/providers/agent.rs
//! Page discovery through an external natural-language extraction agent
//! (AgentQL-compatible `query-data` endpoint).
//!
//! The agent is untrusted: its answer may be slow (bounded by the client and
//! orchestrator timeouts) or shaped unexpectedly (parse error, never a panic).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{ensure_success, read_json};
use crate::error::{CollectError, FetchError};
use crate::ingest::types::{Fetcher, RawItem, ScrapedRecord};
use crate::model::{Source, SourceParams};

pub const DEFAULT_AGENT_ENDPOINT: &str = "https://api.agentql.com/v1/query-data";

#[derive(Serialize)]
struct AgentQuery<'a> {
    url: &'a str,
    prompt: &'a str,
}

pub struct AgentScrapeFetcher {
    client: Client,
    endpoint: String,
}

impl AgentScrapeFetcher {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Fetcher for AgentScrapeFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, CollectError> {
        let SourceParams::AgentScrape(params) = &source.params else {
            return Err(CollectError::parse(format!(
                "source `{}` has no agent_scrape params (api_key, prompt)",
                source.name
            )));
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-Key", params.api_key.as_str())
            .json(&AgentQuery {
                url: &source.url,
                prompt: &params.prompt,
            })
            .send()
            .await
            .map_err(FetchError::from)?;
        let body = read_json(ensure_success(resp)?, "agent").await?;
        let records = parse_agent_response(&body)?;

        tracing::debug!(source_id = source.id, records = records.len(), "agent response decoded");
        Ok(records.into_iter().map(RawItem::Scraped).collect())
    }

    fn name(&self) -> &'static str {
        "agent_scrape"
    }
}

/// Accepts `{"data": [...]}` or `{"data": {"<any key>": [...]}}` (first list in
/// key order). A null/empty `data` means the agent found nothing.
pub fn parse_agent_response(body: &Value) -> Result<Vec<ScrapedRecord>, CollectError> {
    let data = body
        .get("data")
        .ok_or_else(|| CollectError::parse("agent response has no `data` field"))?;

    let list = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(list) => list,
        Value::Object(map) => match map.values().find_map(Value::as_array) {
            Some(list) => list,
            None if map.values().all(Value::is_null) => return Ok(Vec::new()),
            None => {
                return Err(CollectError::parse(
                    "agent `data` object contains no list of results",
                ))
            }
        },
        other => {
            return Err(CollectError::parse(format!(
                "agent `data` has unexpected type: {}",
                json_type(other)
            )))
        }
    };

    Ok(list.iter().filter(|v| !v.is_null()).map(to_record).collect())
}

fn to_record(v: &Value) -> ScrapedRecord {
    match v {
        Value::String(s) => ScrapedRecord {
            url: Some(s.clone()),
            title: None,
            summary: None,
            raw: v.clone(),
        },
        Value::Object(_) => ScrapedRecord {
            url: first_str(v, &["url", "link", "href"]),
            title: first_str(v, &["title", "headline", "name"]),
            summary: first_str(v, &["summary", "description", "snippet"]),
            raw: v.clone(),
        },
        _ => ScrapedRecord {
            url: None,
            title: None,
            summary: None,
            raw: v.clone(),
        },
    }
}

fn first_str(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

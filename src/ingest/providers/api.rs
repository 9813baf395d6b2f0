// src/ingest/providers/api.rs
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{ensure_success, read_json};
use crate::error::{CollectError, FetchError};
use crate::ingest::types::{Fetcher, RawItem};
use crate::model::{ApiParams, Source, SourceParams};

/// Keys tried, in order, when a source doesn't say where its list lives.
const DEFAULT_LIST_KEYS: [&str; 3] = ["items", "articles", "data"];

/// GETs a JSON endpoint and yields one raw item per list element.
pub struct ApiFetcher {
    client: Client,
}

impl ApiFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for ApiFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, CollectError> {
        let default_params = ApiParams::default();
        let params = match &source.params {
            SourceParams::Api(p) => p,
            _ => &default_params,
        };

        let mut req = self.client.get(&source.url).query(&params.query_params);
        for (name, value) in &params.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req.send().await.map_err(FetchError::from)?;
        let body = read_json(ensure_success(resp)?, "api").await?;
        let items = extract_items(&body, params.items_path.as_deref())?;

        tracing::debug!(source_id = source.id, items = items.len(), "api response decoded");
        Ok(items.into_iter().map(RawItem::Api).collect())
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

/// Locate the item array: explicit dot path first, then the conventional
/// wrapper keys, then a bare top-level array.
pub fn extract_items(body: &Value, items_path: Option<&str>) -> Result<Vec<Value>, CollectError> {
    if let Some(path) = items_path.map(str::trim).filter(|p| !p.is_empty()) {
        let mut cur = body;
        for seg in path.split('.').filter(|s| !s.is_empty()) {
            cur = match cur {
                Value::Object(map) => map.get(seg),
                Value::Array(arr) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
                _ => None,
            }
            .ok_or_else(|| CollectError::parse(format!("items_path `{path}` not found in api response")))?;
        }
        return cur
            .as_array()
            .cloned()
            .ok_or_else(|| CollectError::parse(format!("items_path `{path}` is not a list")));
    }

    for key in DEFAULT_LIST_KEYS {
        if let Some(list) = body.get(key).and_then(Value::as_array) {
            return Ok(list.clone());
        }
    }
    if let Some(list) = body.as_array() {
        return Ok(list.clone());
    }
    Err(CollectError::parse(
        "no item list found in api response (expected `items`, `articles`, `data` or a top-level array)",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conventional_wrapper_keys_are_tried_in_order() {
        let body = json!({"articles": [{"url": "a"}], "data": [{"url": "b"}, {"url": "c"}]});
        let items = extract_items(&body, None).unwrap();
        assert_eq!(items, vec![json!({"url": "a"})]);

        let bare = json!([{"url": "x"}, {"url": "y"}]);
        assert_eq!(extract_items(&bare, None).unwrap().len(), 2);
    }

    #[test]
    fn explicit_path_wins_and_supports_indices() {
        let body = json!({
            "items": [{"url": "ignored"}],
            "response": {"pages": [{"results": [{"url": "deep"}]}]}
        });
        let items = extract_items(&body, Some("response.pages.0.results")).unwrap();
        assert_eq!(items, vec![json!({"url": "deep"})]);
    }

    #[test]
    fn missing_list_is_a_parse_error() {
        let err = extract_items(&json!({"status": "ok"}), None).unwrap_err();
        assert!(matches!(err, CollectError::Parse(_)));

        let err = extract_items(&json!({"response": {"results": 3}}), Some("response.results"))
            .unwrap_err();
        assert!(err.to_string().contains("not a list"));

        let err = extract_items(&json!({}), Some("response.results")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}

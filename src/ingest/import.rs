// src/ingest/import.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::error::{SourceError, StoreError};
use crate::model::{ContentType, Source, DEFAULT_FETCH_INTERVAL_SECS};
use crate::store::Store;

/// One entry of a sources file. Accepts the legacy field names (`source`,
/// `type`) next to the current ones (`name`, `kind`).
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    #[serde(alias = "source")]
    pub name: String,
    pub url: String,
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub content_type: Option<u8>,
    #[serde(default)]
    pub team: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub fetch_interval: Option<u64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl SourceSpec {
    /// Validate into a `Source` carrying `id` (0 = let the store assign one).
    pub fn into_source(self, id: i64) -> Result<Source, SourceError> {
        let content_type = match self.content_type {
            Some(ct) => ContentType::try_from(ct)?,
            None => ContentType::default(),
        };
        let mut s = Source::new(id, self.name, self.kind, self.url, self.params)?
            .with_content_type(content_type)
            .with_interval(Duration::from_secs(
                self.fetch_interval.unwrap_or(DEFAULT_FETCH_INTERVAL_SECS),
            ));
        s.team = self
            .team
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if self.is_active == Some(false) {
            s = s.deactivated();
        }
        Ok(s)
    }
}

/// Parse a JSON array of source specs.
pub fn parse_specs(json: &str) -> Result<Vec<SourceSpec>> {
    serde_json::from_str(json).context("sources file must be a JSON array of source objects")
}

pub fn load_specs(path: &Path) -> Result<Vec<SourceSpec>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    parse_specs(&content).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    /// Names that already existed (without `update`).
    pub skipped: Vec<String>,
    /// (name, reason) for specs that failed validation.
    pub invalid: Vec<(String, String)>,
}

/// Create sources by name. Existing names are skipped, or overwritten with
/// `update` (keeping their id and `last_fetched_at`).
pub async fn import_sources(
    store: &dyn Store,
    specs: Vec<SourceSpec>,
    update: bool,
) -> Result<ImportReport, StoreError> {
    let mut report = ImportReport::default();
    let mut existing = store.list_sources().await?;

    for spec in specs {
        let name = spec.name.trim().to_string();
        let current = existing.iter().position(|s| s.name == name);

        if current.is_some() && !update {
            tracing::warn!(source = %name, "source already exists, skipping");
            report.skipped.push(name);
            continue;
        }

        let id = current.map(|i| existing[i].id).unwrap_or(0);
        let mut source = match spec.into_source(id) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(source = %name, error = %e, "invalid source definition");
                report.invalid.push((name, e.to_string()));
                continue;
            }
        };

        match current {
            Some(i) => {
                source.last_fetched_at = existing[i].last_fetched_at;
                let stored = store.upsert_source(source).await?;
                existing[i] = stored;
                report.updated += 1;
            }
            None => {
                let stored = store.upsert_source(source).await?;
                existing.push(stored);
                report.created += 1;
            }
        }
    }

    tracing::info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped.len(),
        invalid = report.invalid.len(),
        "sources imported"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceKind, SourceParams};

    #[test]
    fn legacy_field_names_are_accepted() {
        let specs = parse_specs(
            r#"[
                {"source": "VnExpress", "url": "https://vnexpress.net/rss/kinh-doanh.rss", "type": "rss", "team": "ba"},
                {"name": "Scraped", "url": "https://example.com", "kind": "static",
                 "params": {"api_key": "k", "prompt": "list economy news urls"}, "content_type": 1}
            ]"#,
        )
        .unwrap();
        assert_eq!(specs.len(), 2);

        let feed = specs[0].clone().into_source(0).unwrap();
        assert_eq!(feed.kind.as_str(), SourceKind::FEED);
        assert_eq!(feed.team.as_deref(), Some("ba"));

        let agent = specs[1].clone().into_source(0).unwrap();
        assert_eq!(agent.content_type, ContentType::Economy);
        assert!(matches!(agent.params, SourceParams::AgentScrape(_)));
    }

    #[test]
    fn bad_content_type_is_rejected() {
        let spec = parse_specs(r#"[{"name": "x", "url": "https://x.example", "kind": "feed", "content_type": 9}]"#)
            .unwrap()
            .remove(0);
        assert!(matches!(
            spec.into_source(0),
            Err(SourceError::UnknownContentType(9))
        ));
    }

    #[test]
    fn non_array_document_is_an_error() {
        assert!(parse_specs(r#"{"name": "x"}"#).is_err());
    }
}

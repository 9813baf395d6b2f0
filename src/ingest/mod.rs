// src/ingest/mod.rs
pub mod collector;
pub mod import;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::ingest::providers::parse_timestamp;
use crate::ingest::types::{FeedEntry, RawItem, ScrapedRecord};
use crate::model::{NewArticle, Source};

const TITLE_MAX_CHARS: usize = 500;
const SUMMARY_MAX_CHARS: usize = 1500;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "collector_fetch_total",
            "Fetch attempts by status and source kind."
        );
        describe_counter!("collector_articles_new_total", "Articles created.");
        describe_counter!(
            "collector_articles_duplicate_total",
            "Items skipped because their dedup key was already known."
        );
        describe_counter!(
            "collector_items_dropped_total",
            "Items dropped for lack of a usable dedup key."
        );
        describe_counter!(
            "collector_log_sink_errors_total",
            "Fetch logs that could not be written."
        );
        describe_counter!("collector_runs_total", "Collection runs started.");
        describe_histogram!(
            "collector_fetch_duration_ms",
            "Per-source attempt duration in milliseconds."
        );
        describe_histogram!("collector_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "collector_last_run_ts",
            "Unix ts when a collection run last finished."
        );
        describe_counter!(
            "collector_ai_articles_total",
            "Articles handled by the AI job, by status."
        );
        describe_histogram!(
            "collector_ai_duration_ms",
            "Summarize + notify time per article in milliseconds."
        );
        describe_gauge!(
            "collector_ai_last_run_ts",
            "Unix ts when the AI job last ticked."
        );
    });
}

/// Decode entities, strip tags, fold typographic quotes, collapse whitespace,
/// cap at `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// Dedup key form of a link: http(s) only, no fragment, no `utm_*` params.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut u = url::Url::parse(raw.trim()).ok()?;
    if !matches!(u.scheme(), "http" | "https") || u.host_str().is_none() {
        return None;
    }
    u.set_fragment(None);

    if u.query().is_some() {
        let pairs: Vec<(String, String)> = u
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let kept: Vec<&(String, String)> =
            pairs.iter().filter(|(k, _)| !k.starts_with("utm_")).collect();
        if kept.is_empty() {
            u.set_query(None);
        } else if kept.len() != pairs.len() {
            u.query_pairs_mut()
                .clear()
                .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
    }
    Some(u.to_string())
}

/// Stable key for agent records that carry no URL: sha256 of the record's
/// JSON with object keys sorted.
pub fn synthetic_key(record: &Value) -> String {
    let bytes = serde_json::to_vec(&sorted_keys(record)).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut out = String::with_capacity(6 + digest.len() * 2);
    out.push_str("agent:");
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn sorted_keys(v: &Value) -> Value {
    match v {
        Value::Object(m) => {
            let mut keys: Vec<&String> = m.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), sorted_keys(&m[k])))
                    .collect(),
            )
        }
        Value::Array(a) => Value::Array(a.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}

/// Normalizer output for one source and one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub articles: Vec<NewArticle>,
    pub duplicates: usize,
    pub dropped: usize,
}

/// Shape raw items into articles and drop everything whose key is already
/// stored for `source` or was seen earlier in the batch.
pub fn normalize(
    source: &Source,
    raw_items: Vec<RawItem>,
    existing_keys: &HashSet<String>,
    fetched_at: DateTime<Utc>,
) -> Normalized {
    let mut out = Normalized::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(raw_items.len());

    for item in raw_items {
        let Some(article) = to_article(source, item, fetched_at) else {
            out.dropped += 1;
            continue;
        };
        if existing_keys.contains(&article.dedup_key) || !seen.insert(article.dedup_key.clone()) {
            out.duplicates += 1;
            continue;
        }
        out.articles.push(article);
    }
    out
}

struct Fields {
    key: String,
    url: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

fn to_article(source: &Source, item: RawItem, fetched_at: DateTime<Utc>) -> Option<NewArticle> {
    let f = match item {
        RawItem::Feed(e) => feed_fields(e)?,
        RawItem::Api(v) => api_fields(&v)?,
        RawItem::Scraped(r) => scraped_fields(r)?,
    };

    let title = f
        .title
        .map(|t| normalize_text(&t, TITLE_MAX_CHARS))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("Article from {}", source.name));
    let summary = f
        .summary
        .map(|s| normalize_text(&s, SUMMARY_MAX_CHARS))
        .unwrap_or_default();

    Some(NewArticle {
        source_id: source.id,
        dedup_key: f.key,
        url: f.url,
        title,
        summary,
        published_at: f.published_at.unwrap_or(fetched_at),
        content_type: source.content_type,
    })
}

fn feed_fields(e: FeedEntry) -> Option<Fields> {
    // RSS guids are often permalinks; use one when the link is missing.
    let url = e
        .link
        .as_deref()
        .and_then(canonical_url)
        .or_else(|| e.guid.as_deref().and_then(canonical_url))?;
    Some(Fields {
        key: url.clone(),
        url: Some(url),
        title: e.title,
        summary: e.summary,
        published_at: e.published_at,
    })
}

fn api_fields(v: &Value) -> Option<Fields> {
    let url = str_field(v, &["url", "link"]).and_then(|s| canonical_url(&s))?;
    let published_at = ["published_at", "pubDate", "publishedAt", "date"]
        .iter()
        .find_map(|k| v.get(*k))
        .and_then(|d| match d {
            Value::String(s) => parse_timestamp(s),
            Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
            _ => None,
        });
    Some(Fields {
        key: url.clone(),
        url: Some(url),
        title: str_field(v, &["title", "headline"]),
        summary: str_field(v, &["summary", "description"]),
        published_at,
    })
}

fn scraped_fields(r: ScrapedRecord) -> Option<Fields> {
    let url = r.url.as_deref().and_then(canonical_url);
    let key = match &url {
        Some(u) => u.clone(),
        None if is_meaningful(&r.raw) => synthetic_key(&r.raw),
        None => return None,
    };
    Some(Fields {
        key,
        url,
        title: r.title,
        summary: r.summary,
        published_at: None,
    })
}

fn str_field(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// A record worth keeping without a URL must carry some content.
fn is_meaningful(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
        _ => true,
    }
}

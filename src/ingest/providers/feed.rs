// src/ingest/providers/feed.rs
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use serde::Deserialize;

use super::{ensure_success, parse_timestamp};
use crate::error::{CollectError, FetchError};
use crate::ingest::types::{FeedEntry, Fetcher, RawItem};
use crate::model::Source;

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<Text>,
    link: Option<Text>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<Text>,
    description: Option<Text>,
}

// --- RSS 1.0 (RDF): items are siblings of the channel ---

#[derive(Debug, Deserialize)]
struct Rdf {
    #[serde(rename = "item", default)]
    item: Vec<RdfItem>,
}

#[derive(Debug, Deserialize)]
struct RdfItem {
    #[serde(rename = "@about", alias = "@rdf:about", default)]
    about: Option<String>,
    title: Option<Text>,
    link: Option<Text>,
    description: Option<Text>,
    #[serde(rename = "date", alias = "dc:date")]
    date: Option<Text>,
}

// --- Atom 1.0 ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<Text>,
    title: Option<Text>,
    summary: Option<Text>,
    content: Option<Text>,
    published: Option<Text>,
    updated: Option<Text>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: Option<String>,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

/// Element text; attributes such as `type="html"` or `isPermaLink` are ignored.
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

fn text(t: Option<Text>) -> Option<String> {
    t.map(|t| t.value.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, PartialEq, Eq)]
enum Format {
    Rss,
    Rdf,
    Atom,
}

/// Decided by the root element, ignoring any namespace prefix.
fn detect_format(doc: &str) -> Option<Format> {
    let mut reader = Reader::from_str(doc);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"rss" => Some(Format::Rss),
                    b"RDF" => Some(Format::Rdf),
                    b"feed" => Some(Format::Atom),
                    _ => None,
                };
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Fetches and parses RSS 2.0, RSS 1.0 (RDF) and Atom 1.0 documents.
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn parse_document(doc: &str) -> Result<Vec<FeedEntry>, CollectError> {
        let xml = scrub_html_entities_for_xml(doc);
        match detect_format(&xml) {
            Some(Format::Rss) => {
                let rss: Rss = from_str(&xml)
                    .map_err(|e| CollectError::parse(format!("malformed RSS document: {e}")))?;
                Ok(rss.channel.item.into_iter().map(rss_entry).collect())
            }
            Some(Format::Rdf) => {
                let rdf: Rdf = from_str(&xml)
                    .map_err(|e| CollectError::parse(format!("malformed RDF document: {e}")))?;
                Ok(rdf.item.into_iter().map(rdf_entry).collect())
            }
            Some(Format::Atom) => {
                let feed: AtomFeed = from_str(&xml)
                    .map_err(|e| CollectError::parse(format!("malformed Atom document: {e}")))?;
                Ok(feed.entry.into_iter().map(atom_entry).collect())
            }
            None => Err(CollectError::parse("document is not RSS, RDF or Atom")),
        }
    }
}

fn rss_entry(it: RssItem) -> FeedEntry {
    FeedEntry {
        guid: text(it.guid),
        link: text(it.link),
        title: text(it.title),
        summary: text(it.description),
        published_at: text(it.pub_date).as_deref().and_then(parse_timestamp),
    }
}

fn rdf_entry(it: RdfItem) -> FeedEntry {
    FeedEntry {
        guid: it.about.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
        link: text(it.link),
        title: text(it.title),
        summary: text(it.description),
        published_at: text(it.date).as_deref().and_then(parse_timestamp),
    }
}

fn atom_entry(it: AtomEntry) -> FeedEntry {
    let link = it
        .link
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| it.link.first())
        .and_then(|l| l.href.clone());
    let published = text(it.published).or_else(|| text(it.updated));
    FeedEntry {
        guid: text(it.id),
        link,
        title: text(it.title),
        summary: text(it.summary).or_else(|| text(it.content)),
        published_at: published.as_deref().and_then(parse_timestamp),
    }
}

#[async_trait]
impl Fetcher for FeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, CollectError> {
        let resp = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(FetchError::from)?;
        let body = ensure_success(resp)?
            .text()
            .await
            .map_err(FetchError::from)?;

        let t0 = std::time::Instant::now();
        let entries = Self::parse_document(&body)?;
        histogram!("collector_parse_ms", "kind" => "feed").record(t0.elapsed().as_secs_f64() * 1_000.0);

        tracing::debug!(source_id = source.id, entries = entries.len(), "feed parsed");
        Ok(entries.into_iter().map(RawItem::Feed).collect())
    }

    fn name(&self) -> &'static str {
        "feed"
    }
}

/// HTML entities that show up in real feeds but are not defined in XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

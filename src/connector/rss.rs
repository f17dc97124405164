// src/connector/rss.rs
//! RSS 2.0 / Atom connector. Endpoints are `http(s)://` URLs fetched with
//! reqwest, or `file:` paths read from disk (local mirrors, fixtures).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use super::{normalize_text, FeedConnector, RawItem};
use crate::error::FetchError;
use crate::model::Source;

const TITLE_MAX_CHARS: usize = 300;
const SUMMARY_MAX_CHARS: usize = 600;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<Text>,
}

/// Element whose attributes we don't care about.
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<Text>,
    summary: Option<Text>,
    content: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: String,
}

fn to_chrono(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822).ok().and_then(to_chrono)
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339).ok().and_then(to_chrono)
}

/// HTML entities that are not valid XML and would break the parser.
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

fn clean_link(link: Option<String>) -> Option<String> {
    link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())
}

pub struct RssConnector {
    client: reqwest::Client,
    timeout: Duration,
    max_items: usize,
}

impl RssConnector {
    pub fn new(timeout: Duration, max_items: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pulse-curator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            max_items: max_items.max(1),
        })
    }

    /// Parse an RSS or Atom document into normalized items (at most `max_items`).
    pub fn parse_feed(&self, xml: &str) -> Result<Vec<RawItem>, FetchError> {
        let t0 = std::time::Instant::now();
        let xml = scrub_html_entities_for_xml(xml);

        let is_atom = xml.contains("<feed") && !xml.contains("<rss");
        let mut items = if is_atom {
            parse_atom(&xml)?
        } else {
            parse_rss(&xml)?
        };
        items.truncate(self.max_items);

        histogram!("pulse_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("pulse_feed_items_total").increment(items.len() as u64);
        Ok(items)
    }

    async fn read_endpoint(&self, endpoint: &str) -> Result<String, FetchError> {
        if let Some(path) = endpoint
            .strip_prefix("file://")
            .or_else(|| endpoint.strip_prefix("file:"))
        {
            return tokio::fs::read_to_string(path)
                .await
                .map_err(|e| FetchError::Network(format!("{path}: {e}")));
        }

        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(FetchError::Unsupported(endpoint.to_string()));
        }

        let resp = self.client.get(endpoint).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Network(e.to_string())
            }
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        resp.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Network(e.to_string())
            }
        })
    }
}

fn parse_rss(xml: &str) -> Result<Vec<RawItem>, FetchError> {
    let rss: Rss = from_str(xml).map_err(|e| FetchError::Parse(format!("rss: {e}")))?;
    let mut out = Vec::with_capacity(rss.channel.items.len());
    for it in rss.channel.items {
        let title = normalize_text(it.title.as_deref().unwrap_or_default(), TITLE_MAX_CHARS);
        if title.is_empty() {
            continue;
        }
        out.push(RawItem {
            title,
            summary: normalize_text(
                it.description.as_deref().unwrap_or_default(),
                SUMMARY_MAX_CHARS,
            ),
            link: clean_link(it.link),
            tags: it
                .categories
                .into_iter()
                .map(|c| c.value.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
        });
    }
    Ok(out)
}

fn parse_atom(xml: &str) -> Result<Vec<RawItem>, FetchError> {
    let feed: AtomFeed = from_str(xml).map_err(|e| FetchError::Parse(format!("atom: {e}")))?;
    let mut out = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let title = normalize_text(
            entry.title.as_ref().map(|t| t.value.as_str()).unwrap_or_default(),
            TITLE_MAX_CHARS,
        );
        if title.is_empty() {
            continue;
        }
        let body = entry
            .summary
            .as_ref()
            .or(entry.content.as_ref())
            .map(|t| t.value.as_str())
            .unwrap_or_default();
        // Prefer rel="alternate" (or no rel) over self/edit links.
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
            .or(entry.links.first())
            .map(|l| l.href.clone());
        out.push(RawItem {
            title,
            summary: normalize_text(body, SUMMARY_MAX_CHARS),
            link: clean_link(link),
            tags: entry
                .categories
                .into_iter()
                .map(|c| c.term.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            published_at: entry
                .published
                .as_deref()
                .or(entry.updated.as_deref())
                .and_then(parse_rfc3339),
        });
    }
    Ok(out)
}

#[async_trait]
impl FeedConnector for RssConnector {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, FetchError> {
        let body = self.read_endpoint(source.endpoint.trim()).await?;
        self.parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}

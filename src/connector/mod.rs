// src/connector/mod.rs
//! Feed connectors: fetch raw items from one source and normalize them.
//! Connectors never touch the store; the curation service does.

pub mod classify;
pub mod rss;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::model::{normalize_tags, Source};

pub use classify::{CategoryRule, TagRule, Vocabulary, VocabularySpec};
pub use rss::RssConnector;

/// One normalized item as returned by a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    /// Tags supplied by the feed itself (RSS `<category>`, Atom `term`).
    #[serde(default)]
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl RawItem {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            link: None,
            tags: Vec::new(),
            published_at: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// A raw item enriched with tags and the source metadata classification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateItem {
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: String,
    pub source_name: String,
}

/// Most tags kept per candidate.
const MAX_TAGS: usize = 12;

impl CandidateItem {
    /// Tags = vocabulary matches over title + summary, plus the feed's own tags.
    pub fn from_raw(raw: RawItem, source: &Source, vocab: &Vocabulary) -> Self {
        let text = format!("{}. {}", raw.title, raw.summary);
        let mut tags = vocab.extract_tags(&text);
        tags.extend(raw.tags.iter().map(|t| t.to_lowercase()));
        let mut tags = normalize_tags(tags.iter());
        tags.truncate(MAX_TAGS);

        Self {
            title: raw.title,
            summary: raw.summary,
            link: raw.link,
            tags,
            published_at: raw.published_at,
            source_id: source.id.clone(),
            source_name: source.name.clone(),
        }
    }
}

#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, FetchError>;
    fn name(&self) -> &'static str;
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Normalize feed text: decode entities, strip HTML tags, ASCII quotes,
/// collapse whitespace, cap at `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    let out = html_escape::decode_html_entities(s).to_string();
    let out = RE_TAGS.replace_all(&out, " ");
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let out = RE_WS.replace_all(&out, " ");
    let out = out.trim();

    if out.chars().count() > max_chars {
        out.chars().take(max_chars).collect()
    } else {
        out.to_string()
    }
}

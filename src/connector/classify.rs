//! # Classification vocabulary
//!
//! Tag extraction and category inference as pure functions over an explicit
//! ruleset. Both are deterministic: same input, same output.
//!
//! - Tags: each [`TagRule`] lists phrases; a tag is emitted when any phrase
//!   appears in the text (case-insensitive, bounded by non-word characters).
//! - Categories: each [`CategoryRule`] scores +1 per item tag it claims and +1
//!   per source hint equal to a word of the source id/name. Highest score wins,
//!   ties go to the earlier category in [`Category::ALL`], zero → `General`.
//!
//! Loads from JSON or TOML, falls back to [`Vocabulary::default_seed`].

use anyhow::{Context, Result as AnyResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use super::CandidateItem;
use crate::error::{PulseError, Result};
use crate::model::Category;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_hints: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularySpec {
    #[serde(default)]
    pub tags: Vec<TagRule>,
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

/// Compiled vocabulary.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    spec: VocabularySpec,
    matchers: Vec<(String, Regex)>,
}

fn phrase_pattern(phrases: &[String]) -> Option<String> {
    let alts: Vec<String> = phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect();
    if alts.is_empty() {
        return None;
    }
    Some(format!(r"(?i)(?:^|\W)(?:{})(?:\W|$)", alts.join("|")))
}

fn words(s: &str) -> BTreeSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl Vocabulary {
    pub fn new(spec: VocabularySpec) -> Result<Self> {
        let mut matchers = Vec::with_capacity(spec.tags.len());
        for rule in &spec.tags {
            let tag = rule.tag.trim().to_lowercase();
            if tag.is_empty() {
                return Err(PulseError::validation("vocabulary tag must not be empty"));
            }
            let Some(pattern) = phrase_pattern(&rule.phrases) else {
                continue;
            };
            let re = Regex::new(&pattern).map_err(|e| {
                PulseError::validation(format!("bad phrases for tag '{tag}': {e}"))
            })?;
            matchers.push((tag, re));
        }
        Ok(Self { spec, matchers })
    }

    /// Load from a JSON or TOML file (by extension).
    pub fn load_from_file(path: &Path) -> AnyResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading vocabulary from {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let spec: VocabularySpec = if is_toml {
            toml::from_str(&content).context("parsing vocabulary toml")?
        } else {
            serde_json::from_str(&content).context("parsing vocabulary json")?
        };
        Ok(Self::new(spec)?)
    }

    pub fn spec(&self) -> &VocabularySpec {
        &self.spec
    }

    /// Deduplicated, sorted, lowercase tags whose phrases appear in `text`.
    pub fn extract_tags(&self, text: &str) -> Vec<String> {
        self.matchers
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(tag, _)| tag.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Exactly one category for the item. Never fails.
    pub fn infer_category(&self, item: &CandidateItem) -> Category {
        let item_tags: BTreeSet<&str> = item.tags.iter().map(String::as_str).collect();
        let mut source_words = words(&item.source_id);
        source_words.extend(words(&item.source_name));

        let mut best = Category::General;
        let mut best_score = 0usize;
        for category in Category::ALL {
            let score: usize = self
                .spec
                .categories
                .iter()
                .filter(|r| r.category == category)
                .map(|r| {
                    let tag_hits = r
                        .tags
                        .iter()
                        .filter(|t| item_tags.contains(t.to_lowercase().as_str()))
                        .count();
                    let hint_hits = r
                        .source_hints
                        .iter()
                        .filter(|h| source_words.contains(&h.to_lowercase()))
                        .count();
                    tag_hits + hint_hits
                })
                .sum();
            // Strictly greater keeps the earlier category on ties.
            if score > best_score {
                best = category;
                best_score = score;
            }
        }
        best
    }

    /// Built-in vocabulary used when no file is configured.
    pub fn default_seed() -> Self {
        let tags = SEED_TAGS
            .iter()
            .map(|(tag, phrases)| TagRule {
                tag: tag.to_string(),
                phrases: phrases.iter().map(|p| p.to_string()).collect(),
            })
            .collect();
        let categories = SEED_CATEGORIES
            .iter()
            .map(|(category, tags, hints)| CategoryRule {
                category: *category,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                source_hints: hints.iter().map(|h| h.to_string()).collect(),
            })
            .collect();

        Self::new(VocabularySpec { tags, categories }).expect("default vocabulary compiles")
    }
}

const SEED_TAGS: &[(&str, &[&str])] = &[
    ("ransomware", &["ransomware", "extortion"]),
    (
        "vulnerability",
        &["vulnerability", "vulnerabilities", "cve", "zero-day", "zero day", "exploit"],
    ),
    ("breach", &["data breach", "breach", "leaked", "leak"]),
    ("malware", &["malware", "trojan", "botnet", "spyware", "infostealer"]),
    ("phishing", &["phishing", "credential theft"]),
    ("patch", &["patch", "patched", "security update", "patch tuesday"]),
    ("ai", &["ai", "artificial intelligence", "genai"]),
    (
        "llm",
        &["llm", "llms", "large language model", "gpt", "chatgpt", "claude", "gemini", "ollama"],
    ),
    (
        "machine-learning",
        &["machine learning", "deep learning", "neural network", "training data"],
    ),
    ("agents", &["ai agent", "ai agents", "agentic"]),
    (
        "funding",
        &["funding", "raises", "series a", "series b", "seed round", "venture capital"],
    ),
    ("acquisition", &["acquisition", "acquires", "acquired", "merger"]),
    ("earnings", &["earnings", "revenue", "quarterly results", "profit"]),
    ("startup", &["startup", "startups", "founder"]),
    ("market", &["stock market", "shares", "ipo", "valuation"]),
    ("cloud", &["cloud", "aws", "azure", "gcp", "kubernetes"]),
    ("release", &["release", "released", "changelog", "new version"]),
    ("github", &["github", "pull request", "commit", "repository"]),
    ("meeting", &["meeting", "calendar", "standup", "agenda"]),
    ("deploy", &["deploy", "deployed", "deployment", "rollout"]),
];

const SEED_CATEGORIES: &[(Category, &[&str], &[&str])] = &[
    (
        Category::Security,
        &["ransomware", "vulnerability", "breach", "malware", "phishing", "patch"],
        &["security", "krebs", "cisa", "threat", "infosec"],
    ),
    (
        Category::Ai,
        &["ai", "llm", "machine-learning", "agents"],
        &["ai", "ml", "openai", "huggingface"],
    ),
    (
        Category::Business,
        &["funding", "acquisition", "earnings", "startup", "market", "cloud"],
        &["business", "finance", "techcrunch", "bloomberg"],
    ),
    (
        Category::Activity,
        &["release", "github", "meeting", "deploy"],
        &["github", "activity", "calendar"],
    ),
];

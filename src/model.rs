//! Domain types: cards, sources, curation requests, preferences and feedback.
//!
//! Everything here is plain serde data; the store owns persistence and the
//! curation service owns creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::PulseError;

/// Weight of a category or tag nobody has given feedback on yet.
pub const NEUTRAL_WEIGHT: f64 = 0.5;
/// Amount one `up`/`down` moves a weight.
pub const FEEDBACK_STEP: f64 = 0.1;
pub const MIN_WEIGHT: f64 = 0.0;
pub const MAX_WEIGHT: f64 = 1.0;

/* ----------------------------
Category
---------------------------- */

/// Closed category set. Declaration order is the tie-break order used by
/// category inference, `General` is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Ai,
    Business,
    Activity,
    General,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Security,
        Category::Ai,
        Category::Business,
        Category::Activity,
        Category::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Ai => "ai",
            Category::Business => "business",
            Category::Activity => "activity",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| PulseError::validation(format!("unknown category '{s}'")))
    }
}

/* ----------------------------
Card status & feedback
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    New,
    Seen,
    Archived,
    Dismissed,
}

impl CardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CardStatus::New => "new",
            CardStatus::Seen => "seen",
            CardStatus::Archived => "archived",
            CardStatus::Dismissed => "dismissed",
        }
    }

    /// Archived and dismissed cards are eligible for retention cleanup.
    pub fn is_terminal(self) -> bool {
        matches!(self, CardStatus::Archived | CardStatus::Dismissed)
    }

    fn rank(self) -> u8 {
        match self {
            CardStatus::New => 0,
            CardStatus::Seen => 1,
            CardStatus::Archived | CardStatus::Dismissed => 2,
        }
    }

    /// Forward-only: new → seen → archived|dismissed, terminal is final.
    /// Staying on the current status is always allowed.
    pub fn can_transition_to(self, next: CardStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(CardStatus::New),
            "seen" => Ok(CardStatus::Seen),
            "archived" => Ok(CardStatus::Archived),
            "dismissed" => Ok(CardStatus::Dismissed),
            other => Err(PulseError::validation(format!("unknown card status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Up,
    Down,
}

impl Feedback {
    pub fn as_str(self) -> &'static str {
        match self {
            Feedback::Up => "up",
            Feedback::Down => "down",
        }
    }

    fn delta(self) -> f64 {
        match self {
            Feedback::Up => FEEDBACK_STEP,
            Feedback::Down => -FEEDBACK_STEP,
        }
    }
}

impl FromStr for Feedback {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Feedback::Up),
            "down" => Ok(Feedback::Down),
            other => Err(PulseError::validation(format!("unknown feedback '{other}'"))),
        }
    }
}

/* ----------------------------
Cards
---------------------------- */

/// A curated card as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub source_id: String,
    pub tags: Vec<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fingerprint: String,
    pub relevance: f64,
    pub status: CardStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub feedback: Option<Feedback>,
    pub feedback_at: Option<DateTime<Utc>>,
}

impl Card {
    /// Content equality used for idempotent re-inserts. Lifecycle fields
    /// (status, feedback, timestamps) are ignored.
    pub fn same_content(&self, new: &NewCard) -> bool {
        self.title == new.title
            && self.summary == new.summary
            && self.category == new.category
            && self.source_id == new.source_id
            && self.tags == normalize_tags(new.tags.iter())
            && self.link == new.link
    }
}

/// Candidate card handed to the store; `id` is assigned when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCard {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub source_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default = "neutral_weight")]
    pub relevance: f64,
}

fn neutral_weight() -> f64 {
    NEUTRAL_WEIGHT
}

impl NewCard {
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        category: Category,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            summary: summary.into(),
            category,
            source_id: source_id.into(),
            tags: Vec::new(),
            link: None,
            published_at: None,
            fingerprint: String::new(),
            relevance: NEUTRAL_WEIGHT,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Lowercase, trimmed, deduplicated, sorted.
pub fn normalize_tags<'a, I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/* ----------------------------
Sources
---------------------------- */

/// Source definition as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub enabled: bool,
    pub last_fetched: Option<FetchMark>,
}

impl From<SourceSpec> for Source {
    fn from(spec: SourceSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            endpoint: spec.endpoint,
            enabled: spec.enabled,
            last_fetched: None,
        }
    }
}

/// Outcome of the last fetch attempt for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchMark {
    pub at: DateTime<Utc>,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FetchOutcome {
    Ok { items: usize },
    Failed { error: String },
}

impl FetchMark {
    pub fn ok(at: DateTime<Utc>, items: usize) -> Self {
        Self {
            at,
            outcome: FetchOutcome::Ok { items },
        }
    }

    pub fn failed(at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            at,
            outcome: FetchOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Failed { .. })
    }
}

/* ----------------------------
Curation requests
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Fulfilled,
}

/// Filter describing which cards satisfy a request. Empty matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestScope {
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub source_id: Option<String>,
}

impl RequestScope {
    pub fn category(category: Category) -> Self {
        Self {
            category: Some(category),
            source_id: None,
        }
    }

    pub fn source(source_id: impl Into<String>) -> Self {
        Self {
            category: None,
            source_id: Some(source_id.into()),
        }
    }

    pub fn matches(&self, card: &Card) -> bool {
        self.category.map_or(true, |c| c == card.category)
            && self
                .source_id
                .as_deref()
                .map_or(true, |s| s == card.source_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationRequest {
    pub id: String,
    pub scope: RequestScope,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub result_card_ids: Vec<String>,
}

/* ----------------------------
Preferences & feedback
---------------------------- */

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub category_weights: BTreeMap<Category, f64>,
    #[serde(default)]
    pub tag_weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub cadence_override_secs: Option<u64>,
    /// Empty means every category is curated.
    #[serde(default)]
    pub enabled_categories: BTreeSet<Category>,
}

impl Preferences {
    pub fn category_weight(&self, category: Category) -> f64 {
        self.category_weights
            .get(&category)
            .copied()
            .unwrap_or(NEUTRAL_WEIGHT)
    }

    pub fn tag_weight(&self, tag: &str) -> f64 {
        self.tag_weights.get(tag).copied().unwrap_or(NEUTRAL_WEIGHT)
    }

    pub fn is_category_enabled(&self, category: Category) -> bool {
        self.enabled_categories.is_empty() || self.enabled_categories.contains(&category)
    }

    /// Nudge the card's category and tag weights, clamped to bounds.
    pub fn apply_feedback(&mut self, category: Category, tags: &[String], feedback: Feedback) {
        let delta = feedback.delta();
        let w = self.category_weight(category);
        self.category_weights
            .insert(category, clamp_weight(w + delta));
        for tag in tags {
            let w = self.tag_weight(tag);
            self.tag_weights.insert(tag.clone(), clamp_weight(w + delta));
        }
    }

    /// Personalization score in [0, 1]: mean of the category weight and the
    /// mean tag weight, or the category weight alone for untagged items.
    pub fn relevance(&self, category: Category, tags: &[String]) -> f64 {
        let cat = self.category_weight(category);
        if tags.is_empty() {
            return cat;
        }
        let tag_mean = tags.iter().map(|t| self.tag_weight(t)).sum::<f64>() / tags.len() as f64;
        (cat + tag_mean) / 2.0
    }
}

/// Partial update: `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub category_weights: Option<BTreeMap<Category, f64>>,
    #[serde(default)]
    pub tag_weights: Option<BTreeMap<String, f64>>,
    /// `Some(0)` clears the override.
    #[serde(default)]
    pub cadence_override_secs: Option<u64>,
    #[serde(default)]
    pub enabled_categories: Option<BTreeSet<Category>>,
}

pub(crate) fn clamp_weight(x: f64) -> f64 {
    // Round off float drift so repeated steps land on exact values.
    ((x * 1000.0).round() / 1000.0).clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// One row of the feedback log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub card_id: String,
    pub feedback: Feedback,
    pub category: Category,
    pub tags: Vec<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackCounts {
    pub up: u64,
    pub down: u64,
}

impl FeedbackCounts {
    fn record(&mut self, feedback: Feedback) {
        match feedback {
            Feedback::Up => self.up += 1,
            Feedback::Down => self.down += 1,
        }
    }
}

/// Aggregate of current card feedback, computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total: FeedbackCounts,
    pub by_category: BTreeMap<Category, FeedbackCounts>,
    pub by_tag: BTreeMap<String, FeedbackCounts>,
}

impl FeedbackStats {
    pub(crate) fn record(&mut self, card: &Card) {
        let Some(fb) = card.feedback else {
            return;
        };
        self.total.record(fb);
        self.by_category.entry(card.category).or_default().record(fb);
        for tag in &card.tags {
            self.by_tag.entry(tag.clone()).or_default().record(fb);
        }
    }
}

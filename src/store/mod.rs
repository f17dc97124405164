//! # Card Store
//!
//! Sole authority on persisted state: cards, sources, curation requests,
//! preferences and the feedback log.
//!
//! Layout on disk (single JSON snapshot):
//! ```text
//! state/pulse.json
//! {
//!   "cards": { "<id>": Card, ... },
//!   "sources": { "<id>": Source, ... },
//!   "curation_requests": { "<id>": CurationRequest, ... },
//!   "preferences": Preferences | null,
//!   "feedback": [FeedbackEvent, ...]
//! }
//! ```
//!
//! Every write is a transaction: the closure runs against a clone of the
//! tables, the clone is written to `<path>.tmp` and renamed over the snapshot,
//! and only then swapped in as the live state. A failing closure or a failed
//! write leaves the live tables untouched.

mod cards;
mod preferences;
mod requests;
mod sources;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{Card, CurationRequest, FeedbackEvent, Preferences, Source};

pub use cards::MAX_RECENT_LIMIT;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    cards: BTreeMap<String, Card>,
    #[serde(default)]
    sources: BTreeMap<String, Source>,
    #[serde(default)]
    curation_requests: BTreeMap<String, CurationRequest>,
    #[serde(default)]
    preferences: Option<Preferences>,
    #[serde(default)]
    feedback: Vec<FeedbackEvent>,
    /// Watermark keeping `created_at` strictly increasing across inserts.
    #[serde(default)]
    last_created_at: Option<DateTime<Utc>>,
}

impl Tables {
    fn next_created_at(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + ChronoDuration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }
}

pub struct CardStore {
    path: Option<PathBuf>,
    tables: RwLock<Tables>,
    hard_ceiling_days: Option<u32>,
}

impl CardStore {
    /// Volatile store, nothing touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            tables: RwLock::new(Tables::default()),
            hard_ceiling_days: None,
        }
    }

    /// Open (or create) a store backed by a JSON snapshot at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            target: "pulse::store",
            path = %path.display(),
            cards = tables.cards.len(),
            sources = tables.sources.len(),
            "card store opened"
        );

        Ok(Self {
            path: Some(path),
            tables: RwLock::new(tables),
            hard_ceiling_days: None,
        })
    }

    /// Age after which even `new`/`seen` cards are removed by cleanup.
    /// Disabled (`None`) by default so unseen content is never lost silently.
    pub fn with_hard_ceiling(mut self, days: Option<u32>) -> Self {
        self.hard_ceiling_days = days;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let guard = self.tables.read().await;
        f(&guard)
    }

    /// All-or-nothing write. See module docs.
    async fn transact<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut live = self.tables.write().await;
        let mut staged = live.clone();
        let out = f(&mut staged)?;
        self.persist(&staged).await?;
        *live = staged;
        Ok(out)
    }

    async fn persist(&self, tables: &Tables) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(tables)?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, NewCard};

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("pulse.json");

        let id = {
            let store = CardStore::open(&path).await.unwrap();
            let card = store
                .insert_card(NewCard::new("Patch Tuesday", "fixes", Category::Security, "krebs"))
                .await
                .unwrap();
            card.id
        };

        let reopened = CardStore::open(&path).await.unwrap();
        let card = reopened.get_card_by_id(&id).await.unwrap();
        assert_eq!(card.title, "Patch Tuesday");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn created_at_watermark_is_strictly_increasing() {
        let mut t = Tables::default();
        let now = Utc::now();
        let a = t.next_created_at(now);
        let b = t.next_created_at(now);
        let c = t.next_created_at(now - ChronoDuration::seconds(5));
        assert!(a < b && b < c);
    }
}

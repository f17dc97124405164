use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use super::CardStore;
use crate::error::{PulseError, Result};
use crate::model::{FeedbackStats, Preferences, PreferencesPatch, MAX_WEIGHT, MIN_WEIGHT};

fn check_weight(key: &str, w: f64) -> Result<()> {
    if !w.is_finite() || !(MIN_WEIGHT..=MAX_WEIGHT).contains(&w) {
        return Err(PulseError::validation(format!(
            "weight for '{key}' must be within [{MIN_WEIGHT}, {MAX_WEIGHT}], got {w}"
        )));
    }
    Ok(())
}

fn validate_patch(patch: &PreferencesPatch) -> Result<()> {
    if let Some(weights) = &patch.category_weights {
        for (c, &w) in weights {
            check_weight(c.as_str(), w)?;
        }
    }
    if let Some(weights) = &patch.tag_weights {
        let mut keys = HashSet::with_capacity(weights.len());
        for (tag, &w) in weights {
            let key = tag.trim().to_lowercase();
            if key.is_empty() {
                return Err(PulseError::validation("tag must not be empty"));
            }
            check_weight(tag, w)?;
            if !keys.insert(key) {
                return Err(PulseError::validation(format!(
                    "tag '{tag}' collides with another tag after lowercasing"
                )));
            }
        }
    }
    Ok(())
}

impl CardStore {
    /// The preferences singleton, created with defaults on first access.
    pub async fn get_preferences(&self) -> Result<Preferences> {
        if let Some(p) = self.read(|t| t.preferences.clone()).await {
            return Ok(p);
        }
        self.transact(|t| Ok(t.preferences.get_or_insert_with(Default::default).clone()))
            .await
    }

    /// Overwrite only the fields present in `patch`.
    pub async fn update_preferences(&self, patch: PreferencesPatch) -> Result<Preferences> {
        validate_patch(&patch)?;
        self.transact(|t| {
            let prefs = t.preferences.get_or_insert_with(Default::default);
            if let Some(w) = patch.category_weights {
                prefs.category_weights = w;
            }
            if let Some(w) = patch.tag_weights {
                prefs.tag_weights = w
                    .into_iter()
                    .map(|(k, v)| (k.trim().to_lowercase(), v))
                    .collect();
            }
            if let Some(secs) = patch.cadence_override_secs {
                prefs.cadence_override_secs = (secs > 0).then_some(secs);
            }
            if let Some(cats) = patch.enabled_categories {
                prefs.enabled_categories = cats;
            }
            Ok(prefs.clone())
        })
        .await
    }

    /// Up/down counts from the current feedback on stored cards.
    pub async fn get_feedback_stats(&self) -> FeedbackStats {
        self.read(|t| {
            let mut stats = FeedbackStats::default();
            for card in t.cards.values() {
                stats.record(card);
            }
            stats
        })
        .await
    }

    /// Tags by descending preference weight; ties go to the tag with the most
    /// recent feedback, then alphabetical.
    pub async fn get_preferred_tags(&self, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Err(PulseError::validation("limit must be positive"));
        }
        let ranked = self
            .read(|t| {
                let Some(prefs) = &t.preferences else {
                    return Vec::new();
                };
                let mut last_seen: HashMap<&str, DateTime<Utc>> = HashMap::new();
                for ev in &t.feedback {
                    for tag in &ev.tags {
                        let slot = last_seen.entry(tag.as_str()).or_insert(ev.at);
                        if ev.at > *slot {
                            *slot = ev.at;
                        }
                    }
                }
                let mut tags: Vec<(String, f64, Option<DateTime<Utc>>)> = prefs
                    .tag_weights
                    .iter()
                    .map(|(tag, &w)| (tag.clone(), w, last_seen.get(tag.as_str()).copied()))
                    .collect();
                tags.sort_by(|a, b| {
                    b.1.total_cmp(&a.1)
                        .then_with(|| b.2.cmp(&a.2))
                        .then_with(|| a.0.cmp(&b.0))
                });
                tags
            })
            .await;
        Ok(ranked.into_iter().take(limit).map(|(tag, _, _)| tag).collect())
    }
}

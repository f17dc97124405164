use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use std::collections::HashSet;

use super::{CardStore, Tables};
use crate::error::{PulseError, Result};
use crate::model::{
    normalize_tags, Card, CardStatus, Category, Feedback, FeedbackEvent, NewCard,
};

/// Upper bound for `get_recent_cards`.
pub const MAX_RECENT_LIMIT: usize = 200;

fn newest_first(cards: &mut [Card]) {
    cards.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Local midnight starting `day`, in UTC. `None` if that midnight was
/// skipped by a DST jump.
fn local_midnight(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|t| t.with_timezone(&Utc))
}

/// `[start, end)` of the local calendar day containing `now`, in UTC.
fn local_day_bounds(now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = now.date_naive();
    // Midnight skipped by a DST jump: fall back to 24h ago.
    let start = local_midnight(day)
        .unwrap_or_else(|| (now - ChronoDuration::hours(24)).with_timezone(&Utc));
    let end = day
        .succ_opt()
        .and_then(local_midnight)
        .unwrap_or_else(|| start + ChronoDuration::hours(24));
    (start, end)
}

/// `now - days`, or `None` when that lies before the representable range.
fn days_before(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    ChronoDuration::try_days(i64::from(days)).and_then(|d| now.checked_sub_signed(d))
}

fn stage_card(tables: &mut Tables, new: NewCard, now: DateTime<Utc>) -> Result<Card> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(PulseError::validation("card title must not be empty"));
    }
    if new.source_id.trim().is_empty() {
        return Err(PulseError::validation("card source_id must not be empty"));
    }

    if let Some(id) = new.id.as_deref() {
        if let Some(existing) = tables.cards.get(id) {
            if existing.same_content(&new) {
                return Ok(existing.clone());
            }
            return Err(PulseError::Conflict(id.to_string()));
        }
    }

    let id = new
        .id
        .clone()
        .unwrap_or_else(|| format!("card-{}", uuid::Uuid::new_v4()));
    let created_at = tables.next_created_at(now);
    let relevance = if new.relevance.is_finite() {
        new.relevance.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let card = Card {
        id: id.clone(),
        title: new.title,
        summary: new.summary,
        category: new.category,
        source_id: new.source_id,
        tags: normalize_tags(new.tags.iter()),
        link: new.link,
        published_at: new.published_at,
        fingerprint: new.fingerprint,
        relevance,
        status: CardStatus::New,
        created_at,
        updated_at: created_at,
        feedback: None,
        feedback_at: None,
    };
    tables.cards.insert(id, card.clone());
    Ok(card)
}

impl CardStore {
    pub async fn insert_card(&self, card: NewCard) -> Result<Card> {
        let mut out = self.insert_cards(vec![card]).await?;
        out.pop()
            .ok_or_else(|| PulseError::validation("insert produced no card"))
    }

    /// Insert a batch in one transaction. Returns stored cards in input order.
    pub async fn insert_cards(&self, cards: Vec<NewCard>) -> Result<Vec<Card>> {
        if cards.is_empty() {
            return Ok(Vec::new());
        }
        let n = cards.len();
        let stored = self
            .transact(|t| {
                let now = Utc::now();
                cards
                    .into_iter()
                    .map(|c| stage_card(t, c, now))
                    .collect::<Result<Vec<_>>>()
            })
            .await?;
        tracing::debug!(target: "pulse::store", batch = n, "cards inserted");
        Ok(stored)
    }

    pub async fn get_card_by_id(&self, id: &str) -> Result<Card> {
        self.read(|t| t.cards.get(id).cloned())
            .await
            .ok_or_else(|| PulseError::not_found("card", id))
    }

    /// Cards created within the current local day, newest first.
    pub async fn get_today_cards(&self) -> Vec<Card> {
        self.today_cards_as_of(Local::now()).await
    }

    pub async fn today_cards_as_of(&self, now: DateTime<Local>) -> Vec<Card> {
        // Upper bound is the end of the day, not `now`: the created_at
        // watermark may sit slightly ahead of the wall clock.
        let (start, end) = local_day_bounds(now);
        let mut out: Vec<Card> = self
            .read(|t| {
                t.cards
                    .values()
                    .filter(|c| c.created_at >= start && c.created_at < end)
                    .cloned()
                    .collect()
            })
            .await;
        newest_first(&mut out);
        out
    }

    pub async fn get_cards_by_category(&self, category: Category) -> Vec<Card> {
        let mut out: Vec<Card> = self
            .read(|t| {
                t.cards
                    .values()
                    .filter(|c| c.category == category)
                    .cloned()
                    .collect()
            })
            .await;
        newest_first(&mut out);
        out
    }

    /// Newest `limit` cards; `limit` must be positive and is clamped to
    /// [`MAX_RECENT_LIMIT`].
    pub async fn get_recent_cards(&self, limit: usize) -> Result<Vec<Card>> {
        if limit == 0 {
            return Err(PulseError::validation("limit must be positive"));
        }
        let limit = limit.min(MAX_RECENT_LIMIT);
        let mut out: Vec<Card> = self.read(|t| t.cards.values().cloned().collect()).await;
        newest_first(&mut out);
        out.truncate(limit);
        Ok(out)
    }

    pub async fn count_cards(&self) -> usize {
        self.read(|t| t.cards.len()).await
    }

    /// Fingerprints of a source's cards created at or after `since`.
    pub async fn recent_fingerprints(
        &self,
        source_id: &str,
        since: DateTime<Utc>,
    ) -> HashSet<String> {
        self.read(|t| {
            t.cards
                .values()
                .filter(|c| c.source_id == source_id && c.created_at >= since)
                .filter(|c| !c.fingerprint.is_empty())
                .map(|c| c.fingerprint.clone())
                .collect()
        })
        .await
    }

    pub async fn update_card_status(&self, id: &str, status: CardStatus) -> Result<Card> {
        self.transact(|t| {
            let card = t
                .cards
                .get_mut(id)
                .ok_or_else(|| PulseError::not_found("card", id))?;
            if !card.status.can_transition_to(status) {
                return Err(PulseError::validation(format!(
                    "card {id} cannot move from {} to {status}",
                    card.status
                )));
            }
            card.status = status;
            card.updated_at = Utc::now();
            Ok(card.clone())
        })
        .await
    }

    /// Record feedback on a card and fold it into the preference weights.
    /// `None` clears the card's feedback without touching weights.
    pub async fn update_card_feedback(&self, id: &str, feedback: Option<Feedback>) -> Result<Card> {
        self.transact(|t| {
            let now = Utc::now();
            let card = t
                .cards
                .get_mut(id)
                .ok_or_else(|| PulseError::not_found("card", id))?;
            card.feedback = feedback;
            card.feedback_at = feedback.map(|_| now);
            card.updated_at = now;
            let card = card.clone();

            if let Some(fb) = feedback {
                t.preferences
                    .get_or_insert_with(Default::default)
                    .apply_feedback(card.category, &card.tags, fb);
                t.feedback.push(FeedbackEvent {
                    card_id: card.id.clone(),
                    feedback: fb,
                    category: card.category,
                    tags: card.tags.clone(),
                    at: now,
                });
            }
            Ok(card)
        })
        .await
    }

    pub async fn cleanup_old_cards(&self, max_age_days: u32) -> Result<usize> {
        self.cleanup_old_cards_as_of(max_age_days, Utc::now()).await
    }

    /// Delete terminal cards older than `max_age_days` relative to `now`.
    /// `new`/`seen` cards survive unless the hard ceiling is set and exceeded.
    pub async fn cleanup_old_cards_as_of(
        &self,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        // A threshold reaching past the representable range means nothing
        // is old enough.
        let cutoff = days_before(now, max_age_days);
        let ceiling = self.hard_ceiling_days.and_then(|d| days_before(now, d));
        if cutoff.is_none() && ceiling.is_none() {
            return Ok(0);
        }

        let deleted = self
            .transact(|t| {
                let before = t.cards.len();
                t.cards.retain(|_, c| {
                    let expired =
                        c.status.is_terminal() && cutoff.is_some_and(|limit| c.created_at < limit);
                    let over_ceiling = ceiling.is_some_and(|limit| c.created_at < limit);
                    !(expired || over_ceiling)
                });
                let deleted = before - t.cards.len();
                if deleted > 0 {
                    // Feedback rows of removed cards go with them.
                    let cards = &t.cards;
                    t.feedback.retain(|ev| cards.contains_key(&ev.card_id));
                }
                Ok(deleted)
            })
            .await?;

        if deleted > 0 {
            tracing::info!(target: "pulse::store", deleted, max_age_days, "retention cleanup");
        }
        Ok(deleted)
    }
}

// src/curation/cycle.rs
//! One curation cycle: fetch → classify → dedupe → weight → persist →
//! fulfil requests → cleanup.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge, histogram};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::report::{CycleOutcome, CycleReport, SourceFailure};
use super::CurationService;
use crate::connector::{CandidateItem, RawItem, Vocabulary};
use crate::error::FetchError;
use crate::metrics::ensure_metrics_described;
use crate::model::{FetchMark, NewCard, Preferences, Source};

/// Dedup key: sha256 over the normalized title and link, hex encoded.
pub fn fingerprint(title: &str, link: Option<&str>) -> String {
    let title = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    let link = link
        .map(|l| l.trim().trim_end_matches('/').to_lowercase())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(link.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tally {
    pub deduplicated: usize,
    pub filtered: usize,
}

/// Turn one source's items into weighted card candidates. Items whose
/// fingerprint is in `seen` are dropped; kept fingerprints are added to it.
/// Returns `None` if cancelled part way through.
#[allow(clippy::too_many_arguments)]
pub(crate) fn select_candidates(
    source: &Source,
    items: Vec<RawItem>,
    seen: &mut HashSet<String>,
    vocab: &Vocabulary,
    prefs: &Preferences,
    min_weight: f64,
    tally: &mut Tally,
    cancel: &CancellationToken,
) -> Option<Vec<NewCard>> {
    let mut out = Vec::with_capacity(items.len());
    for raw in items {
        if cancel.is_cancelled() {
            return None;
        }
        let item = CandidateItem::from_raw(raw, source, vocab);
        let fp = fingerprint(&item.title, item.link.as_deref());
        if !seen.insert(fp.clone()) {
            tally.deduplicated += 1;
            continue;
        }

        let category = vocab.infer_category(&item);
        if !prefs.is_category_enabled(category) {
            tally.filtered += 1;
            continue;
        }
        let relevance = prefs.relevance(category, &item.tags);
        if relevance < min_weight {
            tally.filtered += 1;
            continue;
        }

        out.push(NewCard {
            id: None,
            title: item.title,
            summary: item.summary,
            category,
            source_id: item.source_id,
            tags: item.tags,
            link: item.link,
            published_at: item.published_at,
            fingerprint: fp,
            relevance,
        });
    }
    Some(out)
}

type FetchResult = Option<Result<Vec<RawItem>, FetchError>>;

impl CurationService {
    async fn fetch_all(
        &self,
        sources: Vec<Source>,
        cancel: &CancellationToken,
    ) -> Vec<(usize, Source, FetchResult)> {
        let timeout = self.config.fetch_timeout();
        let mut results: Vec<_> = stream::iter(sources.into_iter().enumerate())
            .map(|(idx, source)| {
                let connector = self.connector.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (idx, source, None);
                    }
                    // A fetch already started runs to completion or timeout.
                    let res = tokio::time::timeout(timeout, connector.fetch(&source))
                        .await
                        .unwrap_or(Err(FetchError::Timeout(timeout)));
                    (idx, source, Some(res))
                }
            })
            .buffer_unordered(self.config.fetch_concurrency.max(1))
            .collect()
            .await;
        // Completion order is arbitrary; process in source order.
        results.sort_by_key(|(idx, _, _)| *idx);
        results
    }

    /// Run one full cycle. Never fails: problems end up in the report.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        ensure_metrics_described();
        let t0 = Instant::now();
        let mut report = CycleReport::started(Utc::now());

        let sources = self.store.get_enabled_sources().await;
        report.sources_total = sources.len();
        tracing::info!(target: "pulse::curation", sources = sources.len(), "cycle started");

        if !sources.is_empty() {
            self.ingest(sources, &mut report, cancel).await;
        }

        if !report.cancelled {
            match self.store.cleanup_old_cards(self.config.retention_days).await {
                Ok(n) => {
                    report.cleaned_up = n;
                    counter!("pulse_cleanup_deleted_total").increment(n as u64);
                }
                Err(e) => tracing::warn!(target: "pulse::curation", error = %e, "retention cleanup failed"),
            }
        }

        report.outcome = if report.store_error.is_some() {
            CycleOutcome::Failed
        } else if report.cancelled {
            // Abandoned work is never reported as a clean success.
            CycleOutcome::Partial
        } else {
            CycleOutcome::from_counts(report.sources_total, report.failures.len())
        };

        let last_created = report.finished_at;
        report.finished_at = Utc::now().max(last_created);

        counter!("pulse_cycles_total", "outcome" => report.outcome.as_str()).increment(1);
        histogram!("pulse_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("pulse_cycle_last_run_ts").set(report.finished_at.timestamp() as f64);

        tracing::info!(
            target: "pulse::curation",
            outcome = %report.outcome,
            kept = report.inserted.len(),
            dedup = report.deduplicated,
            filtered = report.filtered,
            failed_sources = report.failures.len(),
            cleaned = report.cleaned_up,
            cancelled = report.cancelled,
            "cycle finished"
        );
        report
    }

    async fn ingest(
        &self,
        sources: Vec<Source>,
        report: &mut CycleReport,
        cancel: &CancellationToken,
    ) {
        let prefs = match self.store.get_preferences().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(target: "pulse::curation", error = %e, "preferences unavailable, using defaults");
                Preferences::default()
            }
        };
        let since: DateTime<Utc> = report
            .started_at
            .checked_sub_signed(self.config.dedup_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let fetched = self.fetch_all(sources, cancel).await;
        let mut marks: Vec<(String, FetchMark)> = Vec::with_capacity(fetched.len());
        let mut candidates: Vec<NewCard> = Vec::new();
        let mut tally = Tally::default();

        for (_, source, result) in fetched {
            let now = Utc::now();
            match result {
                None => report.cancelled = true,
                Some(Err(e)) => {
                    tracing::warn!(target: "pulse::curation", source = %source.id, error = %e, "source fetch failed");
                    counter!("pulse_source_errors_total").increment(1);
                    marks.push((source.id.clone(), FetchMark::failed(now, e.to_string())));
                    report.failures.push(SourceFailure {
                        source_id: source.id,
                        error: e.to_string(),
                    });
                }
                Some(Ok(items)) => {
                    let n = items.len();
                    report.fetched += n;
                    report.sources_ok += 1;
                    marks.push((source.id.clone(), FetchMark::ok(now, n)));
                    tracing::debug!(target: "pulse::curation", source = %source.id, items = n, "source fetched");

                    if report.cancelled {
                        continue;
                    }
                    let mut seen = self.store.recent_fingerprints(&source.id, since).await;
                    match select_candidates(
                        &source,
                        items,
                        &mut seen,
                        &self.vocabulary,
                        &prefs,
                        self.config.min_weight,
                        &mut tally,
                        cancel,
                    ) {
                        Some(mut cards) => candidates.append(&mut cards),
                        None => report.cancelled = true,
                    }
                }
            }
        }

        report.deduplicated = tally.deduplicated;
        report.filtered = tally.filtered;
        counter!("pulse_dedup_total").increment(tally.deduplicated as u64);
        counter!("pulse_filtered_total").increment(tally.filtered as u64);

        // Sources that were fetched keep their mark even if the cycle stops here.
        self.record_marks(marks).await;

        if report.cancelled {
            tracing::info!(target: "pulse::curation", "cycle cancelled before persisting");
            return;
        }

        // Stable: equal relevance keeps source/feed order. Stored least
        // relevant first so newest-first reads lead with the best card.
        candidates.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        candidates.reverse();

        let mut inserted = match self.store.insert_cards(candidates).await {
            Ok(cards) => cards,
            Err(e) => {
                tracing::error!(target: "pulse::curation", error = %e, "persisting cards failed");
                report.store_error = Some(e.to_string());
                Vec::new()
            }
        };
        counter!("pulse_cards_inserted_total").increment(inserted.len() as u64);
        if let Some(last) = inserted.iter().map(|c| c.created_at).max() {
            report.finished_at = last;
        }
        inserted.reverse();
        report.inserted = inserted.iter().map(|c| c.id.clone()).collect();

        if inserted.is_empty() {
            return;
        }
        for req in self.store.get_pending_curation_requests().await {
            let ids: Vec<String> = inserted
                .iter()
                .filter(|c| req.scope.matches(c))
                .map(|c| c.id.clone())
                .collect();
            if ids.is_empty() {
                continue;
            }
            match self.store.fulfill_curation_request(&req.id, ids).await {
                Ok(_) => report.requests_fulfilled += 1,
                Err(e) => {
                    tracing::warn!(target: "pulse::curation", request = %req.id, error = %e, "fulfilling request failed")
                }
            }
        }
    }

    async fn record_marks(&self, marks: Vec<(String, FetchMark)>) {
        for (id, mark) in marks {
            if let Err(e) = self.store.update_source_last_fetched(&id, mark).await {
                tracing::warn!(target: "pulse::curation", source = %id, error = %e, "recording fetch mark failed");
            }
        }
    }
}

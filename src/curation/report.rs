use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleOutcome {
    /// No enabled sources.
    Idle,
    Success,
    /// Some sources failed, the rest were processed.
    Partial,
    /// Every source failed, or the batch insert did.
    Failed,
}

impl CycleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleOutcome::Idle => "idle",
            CycleOutcome::Success => "success",
            CycleOutcome::Partial => "partial",
            CycleOutcome::Failed => "failed",
        }
    }

    pub(crate) fn from_counts(total: usize, failed: usize) -> Self {
        match (total, failed) {
            (0, _) => CycleOutcome::Idle,
            (_, 0) => CycleOutcome::Success,
            (t, f) if f >= t => CycleOutcome::Failed,
            _ => CycleOutcome::Partial,
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub error: String,
}

/// Summary of one curation cycle. Failures are data here, never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub sources_total: usize,
    pub sources_ok: usize,
    pub failures: Vec<SourceFailure>,
    /// Items returned by connectors before dedup and filtering.
    pub fetched: usize,
    pub deduplicated: usize,
    pub filtered: usize,
    /// Ids of cards persisted by this cycle, in relevance order.
    pub inserted: Vec<String>,
    pub requests_fulfilled: usize,
    pub cleaned_up: usize,
    pub cancelled: bool,
    pub store_error: Option<String>,
}

impl CycleReport {
    pub(crate) fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            finished_at: at,
            outcome: CycleOutcome::Idle,
            sources_total: 0,
            sources_ok: 0,
            failures: Vec::new(),
            fetched: 0,
            deduplicated: 0,
            filtered: 0,
            inserted: Vec::new(),
            requests_fulfilled: 0,
            cleaned_up: 0,
            cancelled: false,
            store_error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == CycleOutcome::Failed
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

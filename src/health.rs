use serde::{Deserialize, Serialize};

use crate::curation::CycleOutcome;
use crate::model::Source;
use crate::scheduler::{SchedulerState, SchedulerStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Last cycle failed outright, or an enabled source's last fetch failed.
    Degraded,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub scheduler: SchedulerStatus,
    pub cards_total: usize,
    pub sources_enabled: usize,
    /// Ids of enabled sources whose last fetch failed.
    pub sources_failing: Vec<String>,
}

impl HealthReport {
    pub fn evaluate(scheduler: SchedulerStatus, cards_total: usize, sources: &[Source]) -> Self {
        let enabled: Vec<&Source> = sources.iter().filter(|s| s.enabled).collect();
        let sources_failing: Vec<String> = enabled
            .iter()
            .filter(|s| s.last_fetched.as_ref().is_some_and(|m| m.is_failure()))
            .map(|s| s.id.clone())
            .collect();
        let last_failed = scheduler
            .last_cycle
            .as_ref()
            .is_some_and(|c| c.outcome == CycleOutcome::Failed);

        let status = if scheduler.state == SchedulerState::Stopped {
            HealthStatus::Stopped
        } else if last_failed || !sources_failing.is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            scheduler,
            cards_total,
            sources_enabled: enabled.len(),
            sources_failing,
        }
    }
}

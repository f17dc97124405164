// src/scheduler.rs
//! Periodic driver for curation cycles.
//!
//! State machine `Stopped ⇄ Running`. While running, a timer task ticks at
//! the configured cadence (or the preferences' `cadence_override_secs`) and
//! launches a cycle per tick. At most one cycle is in flight at any time:
//! ticks that land while one is running are skipped and counted, never queued.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::curation::{CurationService, CycleOutcome, CycleReport};
use crate::error::{PulseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Condensed view of the last finished cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub inserted: usize,
    pub failed_sources: usize,
    pub cancelled: bool,
}

impl From<&CycleReport> for CycleSummary {
    fn from(r: &CycleReport) -> Self {
        Self {
            finished_at: r.finished_at,
            outcome: r.outcome,
            inserted: r.inserted.len(),
            failed_sources: r.failures.len(),
            cancelled: r.cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Period the timer is currently armed with.
    pub cadence_secs: Option<u64>,
    pub in_flight: bool,
    pub cycles_run: u64,
    pub ticks_skipped: u64,
    pub last_cycle: Option<CycleSummary>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct InFlight {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

struct Shared {
    service: Arc<CurationService>,
    in_flight: AtomicBool,
    cycles_run: AtomicU64,
    ticks_skipped: AtomicU64,
    armed_secs: AtomicU64,
    last: Mutex<Option<CycleSummary>>,
    current: Mutex<Option<InFlight>>,
}

/// Holds the single-flight flag; dropping it (normal exit, abort or panic of
/// the cycle task) releases the flag.
struct FlightGuard(Arc<Shared>);

impl FlightGuard {
    fn acquire(shared: &Arc<Shared>) -> Option<Self> {
        shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(shared.clone()))
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

impl Shared {
    /// Spawn a cycle unless one is already in flight.
    fn launch(self: &Arc<Self>) -> Option<oneshot::Receiver<CycleReport>> {
        let guard = FlightGuard::acquire(self)?;
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        // Held across spawn so a fast follow-up launch can't be overwritten
        // by this one's slot assignment.
        let mut slot = lock(&self.current);
        let shared = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            let report = shared.service.run_cycle(&token).await;
            shared.cycles_run.fetch_add(1, Ordering::Relaxed);
            *lock(&shared.last) = Some(CycleSummary::from(&report));
            let _ = tx.send(report);
        });
        *slot = Some(InFlight { handle, cancel });
        Some(rx)
    }

    async fn effective_cadence(&self, base: Duration) -> Duration {
        match self.service.store().get_preferences().await {
            Ok(p) => p
                .cadence_override_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(base),
            Err(e) => {
                tracing::warn!(target: "pulse::scheduler", error = %e, "reading cadence override failed");
                base
            }
        }
    }
}

fn arm(period: Duration, fire_now: bool) -> Interval {
    let mut ticker = if fire_now {
        interval(period)
    } else {
        interval_at(Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn timer_loop(
    shared: Arc<Shared>,
    base: Duration,
    run_on_start: bool,
    cancel: CancellationToken,
) {
    let mut period = shared.effective_cadence(base).await;
    shared.armed_secs.store(period.as_secs(), Ordering::Relaxed);
    let mut ticker = arm(period, run_on_start);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if shared.launch().is_none() {
            let skipped = shared.ticks_skipped.fetch_add(1, Ordering::Relaxed) + 1;
            counter!("pulse_ticks_skipped_total").increment(1);
            tracing::info!(target: "pulse::scheduler", skipped, "tick skipped, cycle still in flight");
        }

        let next = shared.effective_cadence(base).await;
        if next != period {
            tracing::info!(
                target: "pulse::scheduler",
                from_secs = period.as_secs(),
                to_secs = next.as_secs(),
                "cadence changed, re-arming timer"
            );
            period = next;
            shared.armed_secs.store(period.as_secs(), Ordering::Relaxed);
            ticker = arm(period, false);
        }
    }
    shared.armed_secs.store(0, Ordering::Relaxed);
}

struct Running {
    timer: JoinHandle<()>,
    cancel: CancellationToken,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
    grace: Duration,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(service: Arc<CurationService>, shutdown_grace: Duration, run_on_start: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                service,
                in_flight: AtomicBool::new(false),
                cycles_run: AtomicU64::new(0),
                ticks_skipped: AtomicU64::new(0),
                armed_secs: AtomicU64::new(0),
                last: Mutex::new(None),
                current: Mutex::new(None),
            }),
            running: Mutex::new(None),
            grace: shutdown_grace,
            run_on_start,
        }
    }

    pub fn service(&self) -> &Arc<CurationService> {
        &self.shared.service
    }

    /// Start ticking. No-op when already running. Must be called from within
    /// a tokio runtime.
    pub fn start(&self, cadence: Duration) -> Result<()> {
        if cadence.is_zero() {
            return Err(PulseError::validation("cadence must be positive"));
        }
        let mut running = lock(&self.running);
        if running.is_some() {
            tracing::debug!(target: "pulse::scheduler", "start ignored, already running");
            return Ok(());
        }
        let cancel = CancellationToken::new();
        let timer = tokio::spawn(timer_loop(
            self.shared.clone(),
            cadence,
            self.run_on_start,
            cancel.clone(),
        ));
        *running = Some(Running { timer, cancel });
        tracing::info!(target: "pulse::scheduler", cadence_secs = cadence.as_secs(), "scheduler started");
        Ok(())
    }

    /// Run a cycle now and wait for it. `None` if one is already in flight.
    pub async fn run_now(&self) -> Option<CycleReport> {
        let rx = self.shared.launch()?;
        rx.await.ok()
    }

    /// Launch a cycle in the background. `false` if one is already in flight.
    pub fn trigger(&self) -> bool {
        self.shared.launch().is_some()
    }

    /// Stop the timer and wind down the in-flight cycle. Past the grace
    /// period the cycle is aborted and `Timeout` returned; the scheduler is
    /// stopped either way.
    pub async fn stop(&self) -> Result<()> {
        let running = lock(&self.running).take();
        if let Some(r) = running {
            r.cancel.cancel();
            if let Err(e) = r.timer.await {
                tracing::warn!(target: "pulse::scheduler", error = %e, "timer task ended abnormally");
            }
        }

        let in_flight = lock(&self.shared.current).take();
        if let Some(InFlight { handle, cancel }) = in_flight {
            cancel.cancel();
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.grace, handle).await.is_err() {
                abort.abort();
                tracing::warn!(
                    target: "pulse::scheduler",
                    grace_ms = self.grace.as_millis() as u64,
                    "cycle did not finish within grace period, aborted"
                );
                return Err(PulseError::Timeout(self.grace));
            }
        }
        tracing::info!(target: "pulse::scheduler", "scheduler stopped");
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        if lock(&self.running).is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state();
        let armed = self.shared.armed_secs.load(Ordering::Relaxed);
        SchedulerStatus {
            state,
            cadence_secs: (state == SchedulerState::Running && armed > 0).then_some(armed),
            in_flight: self.shared.in_flight.load(Ordering::Acquire),
            cycles_run: self.shared.cycles_run.load(Ordering::Relaxed),
            ticks_skipped: self.shared.ticks_skipped.load(Ordering::Relaxed),
            last_cycle: lock(&self.shared.last).clone(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(r) = lock(&self.running).take() {
            r.cancel.cancel();
        }
    }
}

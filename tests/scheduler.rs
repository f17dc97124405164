mod common;

use common::{curation_config, item, service_with, spec, Behavior, MockConnector};
use pulse_curator::model::{FetchOutcome, PreferencesPatch};
use pulse_curator::{PulseError, Scheduler, SchedulerState};
use std::sync::atomic::Ordering;
use std::time::Duration;

async fn slow_scheduler(
    fetch: Duration,
    grace: Duration,
) -> (Scheduler, std::sync::Arc<MockConnector>) {
    let connector = MockConnector::new();
    connector.set("a", Behavior::Slow(fetch, vec![item("Slow story", "body")]));
    let mut cfg = curation_config();
    cfg.fetch_timeout_secs = 60;
    let svc = service_with(&[spec("a", "Alpha")], connector.clone(), cfg).await;
    (Scheduler::new(svc, grace, true), connector)
}

#[tokio::test(start_paused = true)]
async fn overlapping_ticks_are_skipped_not_queued() {
    let (scheduler, connector) =
        slow_scheduler(Duration::from_millis(450), Duration::from_secs(5)).await;

    scheduler.start(Duration::from_millis(100)).unwrap();
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    scheduler.stop().await.unwrap();

    let status = scheduler.status();
    assert_eq!(connector.max_active.load(Ordering::SeqCst), 1);
    assert!(status.cycles_run >= 2, "cycles_run = {}", status.cycles_run);
    assert!(status.ticks_skipped >= 4, "ticks_skipped = {}", status.ticks_skipped);
    assert_eq!(status.state, SchedulerState::Stopped);
    assert!(!status.in_flight);
}

#[tokio::test]
async fn start_is_idempotent_and_rejects_zero_cadence() {
    let (scheduler, _) = slow_scheduler(Duration::from_millis(1), Duration::from_secs(1)).await;

    assert!(matches!(
        scheduler.start(Duration::ZERO),
        Err(PulseError::Validation(_))
    ));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    scheduler.start(Duration::from_secs(3600)).unwrap();
    scheduler.start(Duration::from_secs(3600)).unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Running);

    scheduler.stop().await.unwrap();
    scheduler.stop().await.unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn run_now_declines_while_a_cycle_is_in_flight() {
    let (scheduler, connector) =
        slow_scheduler(Duration::from_secs(2), Duration::from_secs(5)).await;

    assert!(scheduler.trigger());
    assert!(scheduler.run_now().await.is_none());
    assert!(!scheduler.trigger());

    tokio::time::sleep(Duration::from_secs(3)).await;
    let report = scheduler.run_now().await.expect("idle again");
    // Second pass over the same item dedups it.
    assert_eq!(report.deduplicated, 1);
    assert_eq!(connector.calls.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.status().cycles_run, 2);
}

#[tokio::test(start_paused = true)]
async fn stop_past_grace_aborts_and_times_out() {
    let (scheduler, _) =
        slow_scheduler(Duration::from_secs(30), Duration::from_millis(100)).await;

    scheduler.start(Duration::from_secs(3600)).unwrap();
    // Let the immediate first tick launch its cycle.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(scheduler.status().in_flight);

    let err = scheduler.stop().await.unwrap_err();
    assert!(matches!(err, PulseError::Timeout(d) if d == Duration::from_millis(100)));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    // The aborted task releases the single-flight flag.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!scheduler.status().in_flight);
}

#[tokio::test(start_paused = true)]
async fn stop_within_grace_lets_the_cycle_wind_down() {
    let (scheduler, _) =
        slow_scheduler(Duration::from_millis(200), Duration::from_secs(5)).await;

    scheduler.start(Duration::from_secs(3600)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    scheduler.stop().await.unwrap();
    let last = scheduler.status().last_cycle.expect("cycle finished");
    assert!(last.cancelled);
    assert_eq!(last.inserted, 0);

    // The fetch finished before the stop took effect, so its mark is kept.
    let source = scheduler.service().store().get_source("a").await.unwrap();
    assert_eq!(
        source.last_fetched.map(|m| m.outcome),
        Some(FetchOutcome::Ok { items: 1 })
    );
}

#[tokio::test(start_paused = true)]
async fn cadence_override_rearms_the_timer() {
    let (scheduler, _) = slow_scheduler(Duration::from_millis(1), Duration::from_secs(5)).await;

    scheduler.start(Duration::from_secs(10)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scheduler.status().cadence_secs, Some(10));

    scheduler_service_override(&scheduler, 60).await;
    // Next tick at t=10s notices the override.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(scheduler.status().cadence_secs, Some(60));

    scheduler.stop().await.unwrap();
    assert_eq!(scheduler.status().cadence_secs, None);
}

async fn scheduler_service_override(scheduler: &Scheduler, secs: u64) {
    scheduler
        .service()
        .update_preferences(PreferencesPatch {
            cadence_override_secs: Some(secs),
            ..Default::default()
        })
        .await
        .unwrap();
}

mod common;

use common::{curation_config, item, service_with, spec, Behavior, MockConnector};
use pulse_curator::model::{
    Category, FetchOutcome, PreferencesPatch, RequestScope, RequestStatus,
};
use pulse_curator::{CycleOutcome, FetchError};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn one_timed_out_source_yields_partial_cycle() {
    let connector = MockConnector::new();
    connector.set(
        "a",
        Behavior::Items(vec![
            item("Ransomware hits hospital", "extortion demand"),
            item("New LLM agents framework", "agentic tooling"),
            item("Startup raises series A", "funding round"),
        ]),
    );
    connector.set("b", Behavior::Slow(Duration::from_secs(30), vec![]));
    let svc = service_with(
        &[spec("a", "Alpha News"), spec("b", "Beta Wire")],
        connector.clone(),
        curation_config(),
    )
    .await;

    let report = svc.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.outcome, CycleOutcome::Partial);
    assert_eq!(report.inserted.len(), 3);
    assert_eq!(report.sources_ok, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source_id, "b");
    assert!(report.failures[0].error.contains("timed out"));
    assert_eq!(svc.store().count_cards().await, 3);

    let a = svc.store().get_source("a").await.unwrap();
    assert_eq!(
        a.last_fetched.map(|m| m.outcome),
        Some(FetchOutcome::Ok { items: 3 })
    );
    let b = svc.store().get_source("b").await.unwrap();
    assert!(b.last_fetched.unwrap().is_failure());
}

#[tokio::test]
async fn cards_have_unique_ids_and_timestamps_inside_the_cycle() {
    let connector = MockConnector::new();
    connector.set(
        "a",
        Behavior::Items(
            (0..20)
                .map(|i| item(&format!("Story number {i}"), "body"))
                .collect(),
        ),
    );
    let svc = service_with(&[spec("a", "Alpha")], connector, curation_config()).await;

    let report = svc.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.outcome, CycleOutcome::Success);
    assert_eq!(report.inserted.len(), 20);

    let mut ids = std::collections::HashSet::new();
    for id in &report.inserted {
        let card = svc.get_card(id).await.unwrap();
        assert!(ids.insert(card.id.clone()));
        assert!(card.created_at >= report.started_at);
        assert!(card.created_at <= report.finished_at);
    }
}

#[tokio::test]
async fn repeated_items_are_deduplicated_across_cycles() {
    let connector = MockConnector::new();
    let items = vec![
        item("Patch Tuesday fixes", "security update"),
        item("Patch Tuesday fixes", "same link, repeated in the feed"),
        item("Cloud outage report", "aws region down"),
    ];
    connector.set("a", Behavior::Items(items));
    let svc = service_with(&[spec("a", "Alpha")], connector, curation_config()).await;

    let first = svc.run_cycle(&CancellationToken::new()).await;
    assert_eq!(first.inserted.len(), 2);
    assert_eq!(first.deduplicated, 1);

    let second = svc.run_cycle(&CancellationToken::new()).await;
    assert!(second.inserted.is_empty());
    assert_eq!(second.deduplicated, 3);
    assert_eq!(second.outcome, CycleOutcome::Success);
    assert_eq!(svc.store().count_cards().await, 2);
}

#[tokio::test]
async fn preferences_filter_and_order_candidates() {
    let connector = MockConnector::new();
    connector.set(
        "a",
        Behavior::Items(vec![
            item("Ransomware wave continues", "extortion"),
            item("Claude and GPT agents compared", "llm agents"),
            item("Gardening tips for spring", "nothing to see"),
        ]),
    );
    let svc = service_with(&[spec("a", "Alpha")], connector, curation_config()).await;
    svc.update_preferences(PreferencesPatch {
        category_weights: Some(BTreeMap::from([
            (Category::Security, 0.0),
            (Category::Ai, 1.0),
        ])),
        tag_weights: Some(BTreeMap::from([("ransomware".to_string(), 0.0)])),
        ..Default::default()
    })
    .await
    .unwrap();

    let report = svc.run_cycle(&CancellationToken::new()).await;
    // Security card scores 0.0 and is dropped.
    assert_eq!(report.filtered, 1);
    assert_eq!(report.inserted.len(), 2);

    let top = svc.get_card(&report.inserted[0]).await.unwrap();
    assert_eq!(top.category, Category::Ai);
    let second = svc.get_card(&report.inserted[1]).await.unwrap();
    assert_eq!(second.category, Category::General);
    assert!(top.relevance > second.relevance);
}

#[tokio::test]
async fn newest_first_reads_lead_with_the_most_relevant_card() {
    let connector = MockConnector::new();
    connector.set(
        "a",
        Behavior::Items(vec![
            item("Gardening tips for spring", "nothing to see"),
            item("Claude and GPT agents compared", "llm agents"),
        ]),
    );
    let svc = service_with(&[spec("a", "Alpha")], connector, curation_config()).await;
    svc.update_preferences(PreferencesPatch {
        category_weights: Some(BTreeMap::from([(Category::Ai, 1.0)])),
        ..Default::default()
    })
    .await
    .unwrap();

    let report = svc.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.inserted.len(), 2);

    let recent = svc.get_recent_cards(10).await.unwrap();
    assert_eq!(recent[0].category, Category::Ai);
    assert_eq!(recent[1].category, Category::General);
    assert!(recent[0].created_at > recent[1].created_at);
    assert_eq!(recent[0].id, report.inserted[0]);

    let today = svc.get_today_cards().await;
    assert_eq!(today[0].category, Category::Ai);
}

#[tokio::test(start_paused = true)]
async fn fetches_are_bounded_by_fetch_concurrency() {
    let connector = MockConnector::new();
    let specs: Vec<_> = (0..5)
        .map(|i| {
            let id = format!("s{i}");
            connector.set(
                &id,
                Behavior::Slow(
                    Duration::from_millis(100),
                    vec![item(&format!("Story from source {i}"), "body")],
                ),
            );
            spec(&id, &format!("Source {i}"))
        })
        .collect();
    let mut config = curation_config();
    config.fetch_concurrency = 2;
    config.fetch_timeout_secs = 5;
    let svc = service_with(&specs, connector.clone(), config).await;

    let report = svc.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.outcome, CycleOutcome::Success);
    assert_eq!(report.sources_ok, 5);
    assert_eq!(report.inserted.len(), 5);
    assert_eq!(connector.calls.load(std::sync::atomic::Ordering::SeqCst), 5);
    assert_eq!(connector.max_active.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn every_source_failing_is_failed_not_error() {
    let connector = MockConnector::new();
    connector.set("a", Behavior::Fail(FetchError::Status(503)));
    connector.set("b", Behavior::Fail(FetchError::Parse("bad xml".into())));
    let svc = service_with(
        &[spec("a", "Alpha"), spec("b", "Beta")],
        connector,
        curation_config(),
    )
    .await;

    let report = svc.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.outcome, CycleOutcome::Failed);
    assert!(report.is_failed());
    assert_eq!(report.failures.len(), 2);
    assert_eq!(svc.store().count_cards().await, 0);
}

#[tokio::test]
async fn no_enabled_sources_is_idle() {
    let connector = MockConnector::new();
    let svc = service_with(&[spec("a", "Alpha")], connector.clone(), curation_config()).await;
    svc.toggle_source("a", false).await.unwrap();

    let report = svc.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.outcome, CycleOutcome::Idle);
    assert_eq!(connector.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pending_security_request_is_fulfilled_by_the_cycle() {
    let connector = MockConnector::new();
    connector.set(
        "krebs",
        Behavior::Items(vec![item("Ransomware hits hospital", "extortion")]),
    );
    let svc = service_with(
        &[spec("krebs", "Krebs on Security")],
        connector,
        curation_config(),
    )
    .await;

    let security = svc
        .request_curation(RequestScope::category(Category::Security))
        .await
        .unwrap();
    let ai = svc
        .request_curation(RequestScope::category(Category::Ai))
        .await
        .unwrap();

    let report = svc.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.requests_fulfilled, 1);

    let done = svc.get_curation_request(&security.id).await.unwrap();
    assert_eq!(done.status, RequestStatus::Fulfilled);
    assert_eq!(done.result_card_ids, report.inserted);
    let card = svc.get_card(&done.result_card_ids[0]).await.unwrap();
    assert_eq!(card.category, Category::Security);

    let still = svc.get_curation_request(&ai.id).await.unwrap();
    assert_eq!(still.status, RequestStatus::Pending);
}

#[tokio::test]
async fn cancelled_cycle_persists_nothing() {
    let connector = MockConnector::new();
    connector.set("a", Behavior::Items(vec![item("Anything", "at all")]));
    let svc = service_with(&[spec("a", "Alpha")], connector.clone(), curation_config()).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = svc.run_cycle(&cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.outcome, CycleOutcome::Partial);
    assert!(report.inserted.is_empty());
    assert_eq!(connector.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(svc.store().count_cards().await, 0);
}

use pulse_curator::model::{Category, NewCard};
use pulse_curator::{CardStore, PulseError};

fn card(title: &str) -> NewCard {
    NewCard::new(title, "summary", Category::Security, "krebs")
}

#[tokio::test]
async fn conflict_mid_batch_leaves_nothing_behind() {
    let store = CardStore::in_memory();
    store
        .insert_card(card("original").with_id("card-fixed"))
        .await
        .unwrap();

    let err = store
        .insert_cards(vec![
            card("first new"),
            card("divergent").with_id("card-fixed"),
            card("never reached"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, PulseError::Conflict(ref id) if id == "card-fixed"));
    assert_eq!(err.status_code(), 409);

    assert_eq!(store.count_cards().await, 1);
    let recent = store.get_recent_cards(10).await.unwrap();
    assert_eq!(recent[0].title, "original");
}

#[tokio::test]
async fn duplicate_id_inside_one_batch_conflicts() {
    let store = CardStore::in_memory();
    let err = store
        .insert_cards(vec![
            card("a").with_id("card-dup"),
            card("b").with_id("card-dup"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, PulseError::Conflict(_)));
    assert_eq!(store.count_cards().await, 0);
}

#[tokio::test]
async fn persistence_failure_is_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state");
    let path = state.join("pulse.json");
    let store = CardStore::open(&path).await.unwrap();
    store.insert_card(card("kept")).await.unwrap();

    // Pull the directory out from under the store so the next write fails.
    std::fs::remove_dir_all(&state).unwrap();

    let err = store
        .insert_cards(vec![card("lost one"), card("lost two")])
        .await
        .unwrap_err();
    assert!(matches!(err, PulseError::Storage(_)));
    assert_eq!(err.status_code(), 500);

    assert_eq!(store.count_cards().await, 1);
    let titles: Vec<String> = store
        .get_recent_cards(10)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(titles, vec!["kept".to_string()]);
}

#[tokio::test]
async fn snapshot_reload_preserves_lifecycle_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulse.json");

    let id = {
        let store = CardStore::open(&path).await.unwrap();
        let c = store.insert_card(card("persisted")).await.unwrap();
        store
            .update_card_status(&c.id, pulse_curator::model::CardStatus::Archived)
            .await
            .unwrap();
        c.id
    };

    let store = CardStore::open(&path).await.unwrap();
    let c = store.get_card_by_id(&id).await.unwrap();
    assert_eq!(c.status, pulse_curator::model::CardStatus::Archived);
    assert!(c.updated_at >= c.created_at);
}

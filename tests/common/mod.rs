// Shared helpers for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use pulse_curator::config::CurationConfig;
use pulse_curator::connector::{FeedConnector, RawItem, Vocabulary};
use pulse_curator::model::{Source, SourceSpec};
use pulse_curator::{CardStore, CurationService, FetchError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug)]
pub enum Behavior {
    Items(Vec<RawItem>),
    Fail(FetchError),
    /// Sleep, then return the items.
    Slow(Duration, Vec<RawItem>),
}

/// Scripted connector keyed by source id. Tracks concurrent fetches.
#[derive(Default)]
pub struct MockConnector {
    script: Mutex<HashMap<String, Behavior>>,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, source_id: &str, behavior: Behavior) {
        self.script
            .lock()
            .unwrap()
            .insert(source_id.to_string(), behavior);
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FeedConnector for MockConnector {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let behavior = self.script.lock().unwrap().get(&source.id).cloned();
        match behavior {
            Some(Behavior::Items(items)) => Ok(items),
            Some(Behavior::Fail(e)) => Err(e),
            Some(Behavior::Slow(d, items)) => {
                tokio::time::sleep(d).await;
                Ok(items)
            }
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub fn spec(id: &str, name: &str) -> SourceSpec {
    SourceSpec {
        id: id.into(),
        name: name.into(),
        endpoint: format!("mock:{id}"),
        enabled: true,
    }
}

pub fn item(title: &str, summary: &str) -> RawItem {
    RawItem::new(title, summary).with_link(format!(
        "https://news.example/{}",
        title.to_lowercase().replace(' ', "-")
    ))
}

pub fn curation_config() -> CurationConfig {
    CurationConfig {
        fetch_timeout_secs: 1,
        ..CurationConfig::default()
    }
}

/// In-memory store seeded with `sources`, wrapped in a service.
pub async fn service_with(
    sources: &[SourceSpec],
    connector: Arc<MockConnector>,
    config: CurationConfig,
) -> Arc<CurationService> {
    let store = CardStore::in_memory();
    store.sync_sources(sources).await.unwrap();
    Arc::new(CurationService::new(
        Arc::new(store),
        connector,
        Arc::new(Vocabulary::default_seed()),
        config,
    ))
}

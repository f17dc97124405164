// src/runtime.rs
//! Wiring: builds the store, vocabulary, connector, service and scheduler
//! once from a [`PulseConfig`]. Nothing lives in globals.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::PulseConfig;
use crate::connector::{FeedConnector, RssConnector, Vocabulary};
use crate::curation::CurationService;
use crate::health::HealthReport;
use crate::model::{CurationRequest, RequestScope};
use crate::scheduler::Scheduler;
use crate::store::CardStore;

pub struct PulseRuntime {
    config: PulseConfig,
    service: Arc<CurationService>,
    scheduler: Scheduler,
}

impl PulseRuntime {
    /// Build with the RSS/Atom connector.
    pub async fn init(config: PulseConfig) -> Result<Self> {
        let connector = RssConnector::new(
            config.curation.fetch_timeout(),
            config.curation.max_items_per_source,
        )
        .context("building feed connector")?;
        Self::with_connector(config, Arc::new(connector)).await
    }

    pub async fn with_connector(
        config: PulseConfig,
        connector: Arc<dyn FeedConnector>,
    ) -> Result<Self> {
        let store = match &config.store.path {
            Some(path) => CardStore::open(path)
                .await
                .with_context(|| format!("opening card store at {}", path.display()))?,
            None => CardStore::in_memory(),
        }
        .with_hard_ceiling(config.curation.hard_ceiling_days);
        store
            .sync_sources(&config.sources)
            .await
            .context("syncing configured sources")?;

        let vocabulary = match &config.curation.vocabulary_path {
            Some(path) => Vocabulary::load_from_file(path)?,
            None => Vocabulary::default_seed(),
        };

        let service = Arc::new(CurationService::new(
            Arc::new(store),
            connector,
            Arc::new(vocabulary),
            config.curation.clone(),
        ));
        let scheduler = Scheduler::new(
            service.clone(),
            config.shutdown_grace(),
            config.scheduler.run_on_start,
        );

        tracing::info!(
            target: "pulse::runtime",
            sources = config.sources.len(),
            cadence_secs = config.scheduler.cadence_secs,
            persistent = config.store.path.is_some(),
            "pulse runtime initialized"
        );
        Ok(Self {
            config,
            service,
            scheduler,
        })
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<CurationService> {
        &self.service
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn start(&self) -> crate::Result<()> {
        self.scheduler.start(self.config.cadence())
    }

    pub async fn shutdown(&self) -> crate::Result<()> {
        tracing::info!(target: "pulse::runtime", "shutting down");
        self.scheduler.stop().await
    }

    /// Queue a request and kick off a cycle unless one is already running.
    pub async fn request_curation(&self, scope: RequestScope) -> crate::Result<CurationRequest> {
        let req = self.service.request_curation(scope).await?;
        if !self.scheduler.trigger() {
            tracing::debug!(target: "pulse::runtime", request = %req.id, "cycle in flight, request waits for it");
        }
        Ok(req)
    }

    pub async fn health(&self) -> HealthReport {
        let store = self.service.store();
        let sources = store.get_sources().await;
        HealthReport::evaluate(self.scheduler.status(), store.count_cards().await, &sources)
    }
}

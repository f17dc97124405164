//! # Curation service
//!
//! Orchestrates cycles (see [`cycle`]) and fronts the store for callers.
//! The facade methods are plain delegation; every rule lives in the store.

pub mod cycle;
pub mod report;

use std::sync::Arc;

use crate::config::CurationConfig;
use crate::connector::{FeedConnector, Vocabulary};
use crate::error::Result;
use crate::model::{
    Card, CardStatus, Category, CurationRequest, Feedback, FeedbackStats, Preferences,
    PreferencesPatch, RequestScope, Source,
};
use crate::store::CardStore;

pub use cycle::fingerprint;
pub use report::{CycleOutcome, CycleReport, SourceFailure};

pub struct CurationService {
    store: Arc<CardStore>,
    connector: Arc<dyn FeedConnector>,
    vocabulary: Arc<Vocabulary>,
    config: CurationConfig,
}

impl CurationService {
    pub fn new(
        store: Arc<CardStore>,
        connector: Arc<dyn FeedConnector>,
        vocabulary: Arc<Vocabulary>,
        config: CurationConfig,
    ) -> Self {
        Self {
            store,
            connector,
            vocabulary,
            config,
        }
    }

    pub fn store(&self) -> &Arc<CardStore> {
        &self.store
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    /* ---- read facade ---- */

    pub async fn get_today_cards(&self) -> Vec<Card> {
        self.store.get_today_cards().await
    }

    pub async fn get_cards_by_category(&self, category: Category) -> Vec<Card> {
        self.store.get_cards_by_category(category).await
    }

    pub async fn get_recent_cards(&self, limit: usize) -> Result<Vec<Card>> {
        self.store.get_recent_cards(limit).await
    }

    pub async fn get_card(&self, id: &str) -> Result<Card> {
        self.store.get_card_by_id(id).await
    }

    pub async fn get_feedback_stats(&self) -> FeedbackStats {
        self.store.get_feedback_stats().await
    }

    pub async fn get_preferred_tags(&self, limit: usize) -> Result<Vec<String>> {
        self.store.get_preferred_tags(limit).await
    }

    pub async fn get_sources(&self) -> Vec<Source> {
        self.store.get_sources().await
    }

    pub async fn get_preferences(&self) -> Result<Preferences> {
        self.store.get_preferences().await
    }

    pub async fn get_curation_request(&self, id: &str) -> Result<CurationRequest> {
        self.store.get_curation_request(id).await
    }

    /* ---- write facade ---- */

    pub async fn update_card_status(&self, id: &str, status: CardStatus) -> Result<Card> {
        self.store.update_card_status(id, status).await
    }

    pub async fn update_card_feedback(&self, id: &str, feedback: Option<Feedback>) -> Result<Card> {
        self.store.update_card_feedback(id, feedback).await
    }

    pub async fn toggle_source(&self, id: &str, enabled: bool) -> Result<Source> {
        self.store.toggle_source(id, enabled).await
    }

    /// Queue a request; the next cycle producing a matching card fulfils it.
    pub async fn request_curation(&self, scope: RequestScope) -> Result<CurationRequest> {
        self.store.insert_curation_request(scope).await
    }

    pub async fn update_preferences(&self, patch: PreferencesPatch) -> Result<Preferences> {
        self.store.update_preferences(patch).await
    }
}

use super::CardStore;
use crate::error::{PulseError, Result};
use crate::model::{FetchMark, Source, SourceSpec};

impl CardStore {
    pub async fn get_sources(&self) -> Vec<Source> {
        self.read(|t| t.sources.values().cloned().collect()).await
    }

    pub async fn get_enabled_sources(&self) -> Vec<Source> {
        self.read(|t| t.sources.values().filter(|s| s.enabled).cloned().collect())
            .await
    }

    pub async fn get_source(&self, id: &str) -> Result<Source> {
        self.read(|t| t.sources.get(id).cloned())
            .await
            .ok_or_else(|| PulseError::not_found("source", id))
    }

    /// Reconcile configured sources with stored ones: new ids are inserted,
    /// name/endpoint refreshed; `enabled` and fetch history of known sources
    /// are kept. Sources missing from config stay stored (history retained).
    pub async fn sync_sources(&self, specs: &[SourceSpec]) -> Result<()> {
        for spec in specs {
            if spec.id.trim().is_empty() {
                return Err(PulseError::validation("source id must not be empty"));
            }
        }
        self.transact(|t| {
            for spec in specs {
                match t.sources.get_mut(&spec.id) {
                    Some(existing) => {
                        existing.name = spec.name.clone();
                        existing.endpoint = spec.endpoint.clone();
                    }
                    None => {
                        t.sources
                            .insert(spec.id.clone(), Source::from(spec.clone()));
                    }
                }
            }
            Ok(())
        })
        .await?;
        tracing::debug!(target: "pulse::store", sources = specs.len(), "sources synced");
        Ok(())
    }

    pub async fn update_source_last_fetched(&self, id: &str, mark: FetchMark) -> Result<()> {
        self.transact(|t| {
            let source = t
                .sources
                .get_mut(id)
                .ok_or_else(|| PulseError::not_found("source", id))?;
            source.last_fetched = Some(mark);
            Ok(())
        })
        .await
    }

    pub async fn toggle_source(&self, id: &str, enabled: bool) -> Result<Source> {
        let source = self
            .transact(|t| {
                let source = t
                    .sources
                    .get_mut(id)
                    .ok_or_else(|| PulseError::not_found("source", id))?;
                source.enabled = enabled;
                Ok(source.clone())
            })
            .await?;
        tracing::info!(target: "pulse::store", source = id, enabled, "source toggled");
        Ok(source)
    }
}

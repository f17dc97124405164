use chrono::Utc;

use super::CardStore;
use crate::error::{PulseError, Result};
use crate::model::{CurationRequest, RequestScope, RequestStatus};

impl CardStore {
    pub async fn insert_curation_request(&self, scope: RequestScope) -> Result<CurationRequest> {
        let req = CurationRequest {
            id: format!("req-{}", uuid::Uuid::new_v4()),
            scope,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            fulfilled_at: None,
            result_card_ids: Vec::new(),
        };
        let stored = req.clone();
        self.transact(move |t| {
            t.curation_requests.insert(req.id.clone(), req);
            Ok(())
        })
        .await?;
        tracing::debug!(target: "pulse::store", request = %stored.id, "curation request queued");
        Ok(stored)
    }

    pub async fn get_curation_request(&self, id: &str) -> Result<CurationRequest> {
        self.read(|t| t.curation_requests.get(id).cloned())
            .await
            .ok_or_else(|| PulseError::not_found("curation request", id))
    }

    /// Pending requests, oldest first.
    pub async fn get_pending_curation_requests(&self) -> Vec<CurationRequest> {
        let mut out: Vec<CurationRequest> = self
            .read(|t| {
                t.curation_requests
                    .values()
                    .filter(|r| r.status == RequestStatus::Pending)
                    .cloned()
                    .collect()
            })
            .await;
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Mark a request fulfilled. Already-fulfilled requests are returned as-is.
    pub async fn fulfill_curation_request(
        &self,
        id: &str,
        result_card_ids: Vec<String>,
    ) -> Result<CurationRequest> {
        {
            let current = self.get_curation_request(id).await?;
            if current.status == RequestStatus::Fulfilled {
                return Ok(current);
            }
        }
        self.transact(|t| {
            let req = t
                .curation_requests
                .get_mut(id)
                .ok_or_else(|| PulseError::not_found("curation request", id))?;
            // Re-checked under the write lock.
            if req.status == RequestStatus::Pending {
                req.status = RequestStatus::Fulfilled;
                req.fulfilled_at = Some(Utc::now());
                req.result_card_ids = result_card_ids;
            }
            Ok(req.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    #[tokio::test]
    async fn fulfil_is_idempotent() {
        let store = CardStore::in_memory();
        let req = store
            .insert_curation_request(RequestScope::category(Category::Security))
            .await
            .unwrap();
        assert_eq!(store.get_pending_curation_requests().await.len(), 1);

        let done = store
            .fulfill_curation_request(&req.id, vec!["card-1".into()])
            .await
            .unwrap();
        assert_eq!(done.status, RequestStatus::Fulfilled);

        let again = store
            .fulfill_curation_request(&req.id, vec!["card-2".into()])
            .await
            .unwrap();
        assert_eq!(again.result_card_ids, vec!["card-1".to_string()]);
        assert_eq!(again.fulfilled_at, done.fulfilled_at);
        assert!(store.get_pending_curation_requests().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let store = CardStore::in_memory();
        let err = store
            .fulfill_curation_request("req-missing", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}

//! Append-only in-memory response log.

use async_trait::async_trait;
use tokio::sync::RwLock;

use gil_core::model::ResponseRecord;
use gil_core::traits::ResponseStore;

use crate::error::StoreError;

#[derive(Default)]
pub struct InMemoryResponseStore {
    records: RwLock<Vec<ResponseRecord>>,
}

impl InMemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record in append order.
    pub async fn all(&self) -> Vec<ResponseRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn append_response(&self, record: &ResponseRecord) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::DuplicateResponse(record.id).into());
        }
        records.push(record.clone());
        Ok(())
    }

    async fn responses_for_case(&self, case_id: &str) -> anyhow::Result<Vec<ResponseRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn responses_for_user(
        &self,
        user_id: &str,
        domain: &str,
    ) -> anyhow::Result<Vec<ResponseRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id && r.domain == domain)
            .cloned()
            .collect())
    }
}

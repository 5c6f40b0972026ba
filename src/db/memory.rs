use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::db::{RefreshRecord, RefreshStore};
use crate::error::StoreError;

/// Process-local store. Every operation runs under a single lock acquisition.
#[derive(Default, Clone)]
pub struct InMemoryRefreshStore {
    records: Arc<Mutex<HashMap<String, RefreshRecord>>>,
}

impl InMemoryRefreshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record regardless of state, for inspection in tests and tooling.
    pub async fn snapshot(&self) -> Vec<RefreshRecord> {
        self.records.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl RefreshStore for InMemoryRefreshStore {
    async fn insert(&self, record: RefreshRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.token_id) {
            return Err(StoreError::Duplicate);
        }
        records.insert(record.token_id.clone(), record);
        Ok(())
    }

    async fn find_active(&self, token_id: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let now = Utc::now();
        Ok(self
            .records
            .lock()
            .await
            .get(token_id)
            .filter(|record| record.is_active(now))
            .cloned())
    }

    async fn rotate(&self, old_token_id: &str, new_record: RefreshRecord) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut records = self.records.lock().await;

        if records.contains_key(&new_record.token_id) {
            return Err(StoreError::Duplicate);
        }
        match records.get_mut(old_token_id) {
            Some(old) if old.is_active(now) => old.revoked = true,
            _ => return Err(StoreError::Conflict),
        }
        debug!(old = %old_token_id, new = %new_record.token_id, "refresh record rotated");
        records.insert(new_record.token_id.clone(), new_record);
        Ok(())
    }

    async fn revoke_lineage(&self, username: &str) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for record in self.records.lock().await.values_mut() {
            if record.username == username && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke(&self, token_id: &str) -> Result<(), StoreError> {
        if let Some(record) = self.records.lock().await.get_mut(token_id) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

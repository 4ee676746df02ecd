//! In-process implementation of the core store traits.
//!
//! Used when no database is configured and throughout the test suites.
//! Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use relay_core::account::{same_month, Account};
use relay_core::error::CoreError;
use relay_core::records::{FullGenerationRecord, HistoryEntry};
use relay_core::store::{AccountStore, RecordStore};

/// Account and record store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
    /// Per-credential history in insertion order.
    history: RwLock<HashMap<String, Vec<HistoryEntry>>>,
    records: RwLock<HashMap<String, FullGenerationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account.
    pub async fn insert_account(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.credential.clone(), account);
    }

    /// All history entries for a credential, oldest first.
    pub async fn history_for(&self, credential: &str) -> Vec<HistoryEntry> {
        self.history
            .read()
            .await
            .get(credential)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn lookup(&self, credential: &str) -> Result<Option<Account>, CoreError> {
        Ok(self.accounts.read().await.get(credential).cloned())
    }

    async fn increment_usage(&self, credential: &str) -> Result<(), CoreError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(credential).ok_or_else(|| CoreError::NotFound {
            entity: "account",
            id: "<credential>".into(),
        })?;
        let now = Utc::now();
        if !same_month(account.usage_reset_at, now) {
            account.usage_count = 0;
            account.usage_reset_at = now;
        }
        account.usage_count += 1;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn append_history(
        &self,
        credential: &str,
        entry: &HistoryEntry,
    ) -> Result<(), CoreError> {
        self.history
            .write()
            .await
            .entry(credential.to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn find_generation(
        &self,
        credential: &str,
        id: &str,
    ) -> Result<Option<HistoryEntry>, CoreError> {
        Ok(self
            .history
            .read()
            .await
            .get(credential)
            .and_then(|entries| entries.iter().rev().find(|e| e.is_generation_for(id)).cloned()))
    }

    async fn create_record(&self, record: &FullGenerationRecord) -> Result<(), CoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(CoreError::Conflict(format!("Record {} already exists", record.id)));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_record(&self, record: &FullGenerationRecord) -> Result<(), CoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound {
                entity: "full_generation",
                id: record.id.clone(),
            }),
        }
    }

    async fn get_record(&self, id: &str) -> Result<Option<FullGenerationRecord>, CoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list_records(
        &self,
        credential: &str,
        limit: i64,
    ) -> Result<Vec<FullGenerationRecord>, CoreError> {
        let mut owned: Vec<FullGenerationRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.owner == credential)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        owned.truncate(limit.max(0) as usize);
        Ok(owned)
    }
}

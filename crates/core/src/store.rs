//! Seams to the external account and record stores.
//!
//! Implementations live in `relay-db` (PostgreSQL and in-memory).

use async_trait::async_trait;

use crate::account::Account;
use crate::error::CoreError;
use crate::records::{FullGenerationRecord, HistoryEntry};

/// Read access to caller accounts plus usage bookkeeping.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up the account for an API credential.
    async fn lookup(&self, credential: &str) -> Result<Option<Account>, CoreError>;

    /// Count one generation against the account's monthly usage.
    ///
    /// Implementations reset the counter first when the stored reset
    /// timestamp is in an earlier calendar month.
    async fn increment_usage(&self, credential: &str) -> Result<(), CoreError>;
}

/// Durable history and full-generation records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append_history(&self, credential: &str, entry: &HistoryEntry) -> Result<(), CoreError>;

    /// Most recent generation entry whose task id or external message id
    /// equals `id`.
    async fn find_generation(
        &self,
        credential: &str,
        id: &str,
    ) -> Result<Option<HistoryEntry>, CoreError>;

    async fn create_record(&self, record: &FullGenerationRecord) -> Result<(), CoreError>;

    async fn update_record(&self, record: &FullGenerationRecord) -> Result<(), CoreError>;

    async fn get_record(&self, id: &str) -> Result<Option<FullGenerationRecord>, CoreError>;

    /// Newest-first records owned by `credential`.
    async fn list_records(
        &self,
        credential: &str,
        limit: i64,
    ) -> Result<Vec<FullGenerationRecord>, CoreError>;
}

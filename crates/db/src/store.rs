//! PostgreSQL implementation of the core store traits.

use async_trait::async_trait;
use relay_core::account::Account;
use relay_core::error::CoreError;
use relay_core::records::{FullGenerationRecord, HistoryEntry};
use relay_core::store::{AccountStore, RecordStore};

use crate::repositories::{AccountRepo, FullGenerationRepo, HistoryRepo};
use crate::DbPool;

/// Account and record store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn store_error(e: sqlx::Error) -> CoreError {
    tracing::error!(error = %e, "Database query failed");
    CoreError::Store(e.to_string())
}

#[async_trait]
impl AccountStore for PgStore {
    async fn lookup(&self, credential: &str) -> Result<Option<Account>, CoreError> {
        let row = AccountRepo::find_by_key(&self.pool, credential)
            .await
            .map_err(store_error)?;
        Ok(row.map(Account::from))
    }

    async fn increment_usage(&self, credential: &str) -> Result<(), CoreError> {
        let updated = AccountRepo::increment_usage(&self.pool, credential)
            .await
            .map_err(store_error)?;
        if !updated {
            return Err(CoreError::NotFound {
                entity: "account",
                id: "<credential>".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn append_history(
        &self,
        credential: &str,
        entry: &HistoryEntry,
    ) -> Result<(), CoreError> {
        HistoryRepo::append(&self.pool, credential, entry)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn find_generation(
        &self,
        credential: &str,
        id: &str,
    ) -> Result<Option<HistoryEntry>, CoreError> {
        let row = HistoryRepo::find_generation(&self.pool, credential, id)
            .await
            .map_err(store_error)?;
        Ok(row.map(|r| r.entry.0))
    }

    async fn create_record(&self, record: &FullGenerationRecord) -> Result<(), CoreError> {
        FullGenerationRepo::create(&self.pool, record)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn update_record(&self, record: &FullGenerationRecord) -> Result<(), CoreError> {
        let updated = FullGenerationRepo::update(&self.pool, record)
            .await
            .map_err(store_error)?;
        if !updated {
            return Err(CoreError::NotFound {
                entity: "full_generation",
                id: record.id.clone(),
            });
        }
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<FullGenerationRecord>, CoreError> {
        let row = FullGenerationRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_error)?;
        Ok(row.map(FullGenerationRecord::from))
    }

    async fn list_records(
        &self,
        credential: &str,
        limit: i64,
    ) -> Result<Vec<FullGenerationRecord>, CoreError> {
        let rows = FullGenerationRepo::list_for_key(&self.pool, credential, limit)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(FullGenerationRecord::from).collect())
    }
}

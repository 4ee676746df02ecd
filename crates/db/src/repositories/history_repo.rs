//! Repository for the append-only `generation_history` table.

use relay_core::records::HistoryEntry;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::history::HistoryRow;

const COLUMNS: &str = "id, api_key, action, task_id, external_message_id, entry, created_at";

/// Provides append and lookup for history entries.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Append one entry. Entries are never updated.
    pub async fn append(
        pool: &PgPool,
        api_key: &str,
        entry: &HistoryEntry,
    ) -> Result<HistoryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_history (api_key, action, task_id, external_message_id, entry) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(api_key)
            .bind(entry.action())
            .bind(entry.task_id())
            .bind(entry.external_message_id())
            .bind(Json(entry))
            .fetch_one(pool)
            .await
    }

    /// Most recent generation entry matching either the internal task id
    /// or the backend message id.
    pub async fn find_generation(
        pool: &PgPool,
        api_key: &str,
        id: &str,
    ) -> Result<Option<HistoryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_history \
             WHERE api_key = $1 AND action = 'generation' \
               AND (task_id = $2 OR external_message_id = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(api_key)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest-first history for an account.
    pub async fn list_for_key(
        pool: &PgPool,
        api_key: &str,
        limit: i64,
    ) -> Result<Vec<HistoryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_history \
             WHERE api_key = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, HistoryRow>(&query)
            .bind(api_key)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}

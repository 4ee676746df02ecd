//! Repository for the `full_generations` table.

use relay_core::records::FullGenerationRecord;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::full_generation::FullGenerationRow;

const COLUMNS: &str = "id, api_key, status, record, created_at, updated_at";

/// Maximum page size for listings.
const MAX_LIMIT: i64 = 100;

/// Provides CRUD operations for full generation records.
pub struct FullGenerationRepo;

impl FullGenerationRepo {
    pub async fn create(
        pool: &PgPool,
        record: &FullGenerationRecord,
    ) -> Result<FullGenerationRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO full_generations (id, api_key, status, record, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FullGenerationRow>(&query)
            .bind(&record.id)
            .bind(&record.owner)
            .bind(record.status.as_str())
            .bind(Json(record))
            .bind(record.started_at)
            .fetch_one(pool)
            .await
    }

    /// Replace the stored record. Returns `false` if no row has this id.
    pub async fn update(pool: &PgPool, record: &FullGenerationRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE full_generations \
             SET status = $2, record = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(&record.id)
        .bind(record.status.as_str())
        .bind(Json(record))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: &str,
    ) -> Result<Option<FullGenerationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM full_generations WHERE id = $1");
        sqlx::query_as::<_, FullGenerationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest-first records for an account, capped at 100.
    pub async fn list_for_key(
        pool: &PgPool,
        api_key: &str,
        limit: i64,
    ) -> Result<Vec<FullGenerationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM full_generations \
             WHERE api_key = $1 \
             ORDER BY created_at DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, FullGenerationRow>(&query)
            .bind(api_key)
            .bind(limit.clamp(1, MAX_LIMIT))
            .fetch_all(pool)
            .await
    }
}

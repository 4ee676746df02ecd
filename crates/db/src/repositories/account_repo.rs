//! Repository for the `accounts` table.

use sqlx::PgPool;

use crate::models::account::{AccountRow, UpsertAccount};

const COLUMNS: &str = "\
    api_key, label, server_id, channel_id, salai_token, \
    monthly_limit, usage_count, is_admin, is_blocked, \
    usage_reset_at, created_at, updated_at";

/// Provides lookups and usage bookkeeping for caller accounts.
pub struct AccountRepo;

impl AccountRepo {
    /// Find an account by its API key.
    pub async fn find_by_key(
        pool: &PgPool,
        api_key: &str,
    ) -> Result<Option<AccountRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM accounts WHERE api_key = $1");
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(api_key)
            .fetch_optional(pool)
            .await
    }

    /// Insert an account, or refresh its identity fields if the key exists.
    ///
    /// Usage counters and the blocked flag are left untouched on update.
    pub async fn upsert(pool: &PgPool, input: &UpsertAccount) -> Result<AccountRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO accounts \
                (api_key, label, server_id, channel_id, salai_token, monthly_limit, is_admin) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (api_key) DO UPDATE SET \
                label = EXCLUDED.label, \
                server_id = EXCLUDED.server_id, \
                channel_id = EXCLUDED.channel_id, \
                salai_token = EXCLUDED.salai_token, \
                monthly_limit = EXCLUDED.monthly_limit, \
                is_admin = EXCLUDED.is_admin, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountRow>(&query)
            .bind(&input.api_key)
            .bind(&input.label)
            .bind(&input.server_id)
            .bind(&input.channel_id)
            .bind(&input.salai_token)
            .bind(input.monthly_limit)
            .bind(input.is_admin)
            .fetch_one(pool)
            .await
    }

    /// Add one to the usage counter.
    ///
    /// When the last reset falls in an earlier calendar month the counter
    /// restarts at 1 and the reset timestamp moves to now. Returns `false`
    /// when no account has this key.
    pub async fn increment_usage(pool: &PgPool, api_key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE accounts SET \
                usage_count = CASE \
                    WHEN date_trunc('month', usage_reset_at AT TIME ZONE 'UTC') \
                       < date_trunc('month', NOW() AT TIME ZONE 'UTC') THEN 1 \
                    ELSE usage_count + 1 END, \
                usage_reset_at = CASE \
                    WHEN date_trunc('month', usage_reset_at AT TIME ZONE 'UTC') \
                       < date_trunc('month', NOW() AT TIME ZONE 'UTC') THEN NOW() \
                    ELSE usage_reset_at END, \
                updated_at = NOW() \
             WHERE api_key = $1",
        )
        .bind(api_key)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Block or unblock an account.
    pub async fn set_blocked(
        pool: &PgPool,
        api_key: &str,
        blocked: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE accounts SET is_blocked = $2, updated_at = NOW() WHERE api_key = $1",
        )
        .bind(api_key)
        .bind(blocked)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

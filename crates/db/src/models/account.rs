//! Caller account rows.

use relay_core::account::{Account, AccountRole};
use relay_core::types::Timestamp;
use serde::Deserialize;
use sqlx::FromRow;

/// A row from the `accounts` table.
#[derive(Clone, FromRow)]
pub struct AccountRow {
    pub api_key: String,
    pub label: String,
    pub server_id: String,
    pub channel_id: String,
    pub salai_token: String,
    pub monthly_limit: i32,
    pub usage_count: i32,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub usage_reset_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            credential: row.api_key,
            label: row.label,
            server_id: row.server_id,
            channel_id: row.channel_id,
            token: row.salai_token,
            monthly_limit: row.monthly_limit,
            usage_count: row.usage_count,
            role: if row.is_admin {
                AccountRole::Admin
            } else {
                AccountRole::User
            },
            blocked: row.is_blocked,
            usage_reset_at: row.usage_reset_at,
        }
    }
}

/// DTO for creating or refreshing an account.
#[derive(Clone, Deserialize)]
pub struct UpsertAccount {
    pub api_key: String,
    pub label: String,
    pub server_id: String,
    pub channel_id: String,
    pub salai_token: String,
    pub monthly_limit: i32,
    pub is_admin: bool,
}

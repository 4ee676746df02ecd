//! Generation history rows.

use relay_core::records::HistoryEntry;
use relay_core::types::Timestamp;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `generation_history` table.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub id: i64,
    pub api_key: String,
    pub action: String,
    pub task_id: String,
    pub external_message_id: String,
    pub entry: Json<HistoryEntry>,
    pub created_at: Timestamp,
}

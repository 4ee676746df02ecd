//! Full generation rows.

use relay_core::records::FullGenerationRecord;
use relay_core::types::Timestamp;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `full_generations` table.
///
/// The record itself is stored as JSONB; `status` is denormalized for
/// filtering.
#[derive(Debug, Clone, FromRow)]
pub struct FullGenerationRow {
    pub id: String,
    pub api_key: String,
    pub status: String,
    pub record: Json<FullGenerationRecord>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<FullGenerationRow> for FullGenerationRecord {
    fn from(row: FullGenerationRow) -> Self {
        row.record.0
    }
}

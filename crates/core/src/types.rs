/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of an in-memory generation task (`task_<uuid>`).
pub type TaskId = String;

/// Identifier of a full-generation record (`full_<uuid>`).
pub type FullGenerationId = String;

/// Mint a new generation task id.
pub fn new_task_id() -> TaskId {
    format!("task_{}", uuid::Uuid::now_v7().simple())
}

/// Mint a new full-generation record id.
pub fn new_full_generation_id() -> FullGenerationId {
    format!("full_{}", uuid::Uuid::now_v7().simple())
}

//! Generation tasks, full-generation records, and history entries.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::image::ImageReference;
use crate::status::{FullGenerationStatus, TaskStatus};
use crate::types::{FullGenerationId, TaskId, Timestamp};
use crate::variant::{ExecutionMode, VariantIndex, VariantSelection};

// ---------------------------------------------------------------------------
// GenerationTask
// ---------------------------------------------------------------------------

/// An in-flight or recently finished generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    pub id: TaskId,
    pub status: TaskStatus,
    pub prompt: String,
    /// Credential of the owning account.
    pub owner: String,
    pub owner_label: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Set when the task reaches a terminal status.
    pub finished_at: Option<Timestamp>,
    /// Last reported progress percentage (0-100).
    pub progress: Option<u8>,
    pub result: Option<ImageReference>,
    pub error: Option<String>,
}

impl GenerationTask {
    pub fn new(
        id: TaskId,
        prompt: impl Into<String>,
        owner: impl Into<String>,
        owner_label: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            prompt: prompt.into(),
            owner: owner.into(),
            owner_label: owner_label.into(),
            created_at: now,
            updated_at: now,
            finished_at: None,
            progress: None,
            result: None,
            error: None,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Task {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    pub fn mark_processing(&mut self) -> Result<(), CoreError> {
        self.transition(TaskStatus::Processing)
    }

    /// Record a progress report. Last value wins; ignored once terminal.
    pub fn set_progress(&mut self, percent: u8) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.progress = Some(percent.min(100));
        self.updated_at = Utc::now();
        true
    }

    pub fn complete(&mut self, image: ImageReference) -> Result<(), CoreError> {
        self.transition(TaskStatus::Completed)?;
        self.progress = Some(100);
        self.result = Some(image);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Upscale outcomes and stats
// ---------------------------------------------------------------------------

/// Result of upscaling one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleOutcome {
    pub variant_index: VariantIndex,
    pub success: bool,
    pub image: Option<ImageReference>,
    pub error: Option<String>,
    pub finished_at: Timestamp,
}

impl UpscaleOutcome {
    pub fn succeeded(variant_index: VariantIndex, image: ImageReference) -> Self {
        Self {
            variant_index,
            success: true,
            image: Some(image),
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(variant_index: VariantIndex, error: impl Into<String>) -> Self {
        Self {
            variant_index,
            success: false,
            image: None,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }
}

/// Aggregate counters reported when a full generation completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub total_images: u32,
    pub successful_upscales: u32,
    pub failed_upscales: u32,
    pub duration_seconds: f64,
}

impl GenerationStats {
    /// Stats for a set of upscale outcomes on top of the original grid.
    pub fn from_outcomes(outcomes: &[UpscaleOutcome], duration: chrono::Duration) -> Self {
        let successful = outcomes.iter().filter(|o| o.success).count() as u32;
        let failed = outcomes.len() as u32 - successful;
        Self {
            total_images: 1 + successful,
            successful_upscales: successful,
            failed_upscales: failed,
            duration_seconds: duration.num_milliseconds().max(0) as f64 / 1000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// FullGenerationRecord
// ---------------------------------------------------------------------------

/// Durable record of a generate-then-upscale run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullGenerationRecord {
    pub id: FullGenerationId,
    pub owner: String,
    pub prompt: String,
    pub status: FullGenerationStatus,
    pub variants: VariantSelection,
    pub mode: ExecutionMode,
    /// Registry task driving the initial generation.
    pub task_id: TaskId,
    pub original: Option<ImageReference>,
    /// Sorted by variant index once the record completes.
    pub upscaled: Vec<UpscaleOutcome>,
    pub stats: Option<GenerationStats>,
    pub started_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub error: Option<String>,
}

impl FullGenerationRecord {
    pub fn new(
        id: FullGenerationId,
        owner: impl Into<String>,
        prompt: impl Into<String>,
        variants: VariantSelection,
        mode: ExecutionMode,
        task_id: TaskId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner: owner.into(),
            prompt: prompt.into(),
            status: FullGenerationStatus::Generating,
            variants,
            mode,
            task_id,
            original: None,
            upscaled: Vec::new(),
            stats: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        }
    }

    fn transition(&mut self, next: FullGenerationStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Full generation {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn mark_generated(&mut self, original: ImageReference) -> Result<(), CoreError> {
        self.transition(FullGenerationStatus::Generated)?;
        self.original = Some(original);
        Ok(())
    }

    pub fn begin_upscaling(&mut self) -> Result<(), CoreError> {
        self.transition(FullGenerationStatus::Upscaling)
    }

    /// Complete with the given outcomes, sorted by variant index.
    ///
    /// An empty outcome list yields `total_images = 1`.
    pub fn complete(&mut self, mut outcomes: Vec<UpscaleOutcome>) -> Result<(), CoreError> {
        self.transition(FullGenerationStatus::Completed)?;
        outcomes.sort_by_key(|o| o.variant_index);
        let finished = self.completed_at.unwrap_or_else(Utc::now);
        self.stats = Some(GenerationStats::from_outcomes(&outcomes, finished - self.started_at));
        self.upscaled = outcomes;
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.transition(FullGenerationStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

/// Compact listing row for a full generation.
#[derive(Debug, Clone, Serialize)]
pub struct FullGenerationSummary {
    pub full_generation_id: FullGenerationId,
    pub prompt: String,
    pub status: FullGenerationStatus,
    pub total_images: u32,
    pub successful_upscales: u32,
    pub duration_seconds: f64,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<&FullGenerationRecord> for FullGenerationSummary {
    fn from(record: &FullGenerationRecord) -> Self {
        let stats = record.stats.as_ref();
        Self {
            full_generation_id: record.id.clone(),
            prompt: record.prompt.clone(),
            status: record.status,
            total_images: stats.map_or(0, |s| s.total_images),
            successful_upscales: stats.map_or(0, |s| s.successful_upscales),
            duration_seconds: stats.map_or(0.0, |s| s.duration_seconds),
            created_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Immutable entry in an account's generation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HistoryEntry {
    Generation {
        task_id: TaskId,
        external_message_id: String,
        prompt: String,
        image_url: String,
        content_hash: Option<String>,
        timestamp: Timestamp,
    },
    Upscale {
        source_task_id: TaskId,
        /// Grid the variant was taken from.
        #[serde(default)]
        source_message_id: String,
        external_message_id: String,
        variant_index: VariantIndex,
        image_url: String,
        timestamp: Timestamp,
    },
}

impl HistoryEntry {
    pub fn generation(task_id: &str, prompt: &str, image: &ImageReference) -> Self {
        HistoryEntry::Generation {
            task_id: task_id.to_string(),
            external_message_id: image.external_message_id.clone(),
            prompt: prompt.to_string(),
            image_url: image.url.clone(),
            content_hash: image.content_hash.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            HistoryEntry::Generation { .. } => "generation",
            HistoryEntry::Upscale { .. } => "upscale",
        }
    }

    /// Internal task id this entry is filed under.
    pub fn task_id(&self) -> &str {
        match self {
            HistoryEntry::Generation { task_id, .. } => task_id,
            HistoryEntry::Upscale { source_task_id, .. } => source_task_id,
        }
    }

    pub fn external_message_id(&self) -> &str {
        match self {
            HistoryEntry::Generation { external_message_id, .. }
            | HistoryEntry::Upscale { external_message_id, .. } => external_message_id,
        }
    }

    /// Whether this is a generation entry reachable by `id`, which may be
    /// either the internal task id or the backend message id.
    pub fn is_generation_for(&self, id: &str) -> bool {
        matches!(self, HistoryEntry::Generation { .. })
            && (self.task_id() == id || self.external_message_id() == id)
    }
}

//! Lifecycle statuses for generation tasks and full-generation records.
//!
//! Transitions only move forward; terminal states never change again.

use serde::{Deserialize, Serialize};

/// Status of a single generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects monotonicity.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Status of a full-generation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullGenerationStatus {
    Generating,
    Generated,
    Upscaling,
    Completed,
    Failed,
}

impl FullGenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FullGenerationStatus::Completed | FullGenerationStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            FullGenerationStatus::Generating => 0,
            FullGenerationStatus::Generated => 1,
            FullGenerationStatus::Upscaling => 2,
            FullGenerationStatus::Completed | FullGenerationStatus::Failed => 3,
        }
    }

    pub fn can_transition_to(self, next: FullGenerationStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FullGenerationStatus::Generating => "generating",
            FullGenerationStatus::Generated => "generated",
            FullGenerationStatus::Upscaling => "upscaling",
            FullGenerationStatus::Completed => "completed",
            FullGenerationStatus::Failed => "failed",
        }
    }
}

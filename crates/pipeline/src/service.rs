//! Caller-facing facade.
//!
//! [`RelayService`] is the task API an outer surface (HTTP, CLI) calls.
//! It authenticates the credential, validates input, enforces quota,
//! and hands work to the orchestrator, executor, and pipeline. Every
//! method returns a [`CoreError`] whose `to_body()` is the structured
//! error shown to callers.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use relay_core::account::Account;
use relay_core::error::CoreError;
use relay_core::image::{extract_content_hash, ImageReference};
use relay_core::records::{
    FullGenerationRecord, FullGenerationSummary, GenerationStats, GenerationTask, HistoryEntry,
    UpscaleOutcome,
};
use relay_core::status::{FullGenerationStatus, TaskStatus};
use relay_core::store::{AccountStore, RecordStore};
use relay_core::types::{FullGenerationId, TaskId, Timestamp};
use relay_core::validation::validate_prompt;
use relay_core::variant::{ExecutionMode, VariantIndex, VariantSelection};
use relay_discord::backend::BackendClient;

use crate::config::PipelineConfig;
use crate::full::FullGenerationPipeline;
use crate::orchestrator::JobOrchestrator;
use crate::registry::TaskRegistry;
use crate::upscale::UpscaleExecutor;

/// Default page size for full generation listings.
pub const DEFAULT_LIST_LIMIT: i64 = 20;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// Status of a generation task as shown to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub owner: String,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
}

impl From<GenerationTask> for TaskView {
    fn from(task: GenerationTask) -> Self {
        let (image_url, external_message_id, content_hash) = match task.result {
            Some(image) => (Some(image.url), Some(image.external_message_id), image.content_hash),
            None => (None, None, None),
        };
        Self {
            task_id: task.id,
            status: task.status,
            prompt: task.prompt,
            progress: task.progress,
            image_url,
            external_message_id,
            content_hash,
            error: task.error,
            owner: task.owner_label,
            created_at: task.created_at,
            finished_at: task.finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpscaleView {
    pub source_task_id: TaskId,
    pub variant_index: VariantIndex,
    pub image_url: String,
    pub external_message_id: String,
}

/// Input for [`RelayService::generate_full`].
#[derive(Debug, Clone)]
pub struct FullGenerationRequest {
    pub prompt: String,
    pub variants: VariantSelection,
    pub mode: ExecutionMode,
    /// Block until the run finishes, up to the configured cap.
    pub wait: bool,
}

/// A full generation record as shown to callers.
#[derive(Debug, Clone, Serialize)]
pub struct FullGenerationView {
    pub full_generation_id: FullGenerationId,
    pub task_id: TaskId,
    pub prompt: String,
    pub status: FullGenerationStatus,
    /// Live progress of the initial generation while it runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub variants: VariantSelection,
    pub mode: ExecutionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<ImageReference>,
    pub upscaled: Vec<UpscaleOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<GenerationStats>,
    pub started_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FullGenerationView {
    fn new(record: FullGenerationRecord, progress: Option<u8>) -> Self {
        Self {
            full_generation_id: record.id,
            task_id: record.task_id,
            prompt: record.prompt,
            status: record.status,
            progress,
            variants: record.variants,
            mode: record.mode,
            original: record.original,
            upscaled: record.upscaled,
            stats: record.stats,
            started_at: record.started_at,
            completed_at: record.completed_at,
            error: record.error,
        }
    }
}

/// Where an upscale's source grid lives.
struct UpscaleSource {
    task_id: TaskId,
    message_id: String,
    content_hash: String,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Caller-facing operations, authorized per credential.
pub struct RelayService {
    accounts: Arc<dyn AccountStore>,
    records: Arc<dyn RecordStore>,
    registry: Arc<TaskRegistry>,
    orchestrator: Arc<JobOrchestrator>,
    executor: Arc<UpscaleExecutor>,
    pipeline: Arc<FullGenerationPipeline>,
    config: Arc<PipelineConfig>,
}

impl RelayService {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        accounts: Arc<dyn AccountStore>,
        records: Arc<dyn RecordStore>,
        config: PipelineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(TaskRegistry::new(config.task_ttl));
        let orchestrator = Arc::new(JobOrchestrator::new(
            Arc::clone(&backend),
            Arc::clone(&accounts),
            Arc::clone(&records),
            Arc::clone(&registry),
            Arc::clone(&config),
        ));
        let executor = Arc::new(UpscaleExecutor::new(Arc::clone(&backend), &config));
        let pipeline = Arc::new(FullGenerationPipeline::new(
            Arc::clone(&orchestrator),
            Arc::clone(&executor),
            Arc::clone(&records),
            Arc::clone(&config),
        ));
        Self {
            accounts,
            records,
            registry,
            orchestrator,
            executor,
            pipeline,
            config,
        }
    }

    pub fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve a credential to its account. Blocked accounts are refused.
    pub async fn authenticate(&self, credential: &str) -> Result<Account, CoreError> {
        if credential.trim().is_empty() {
            return Err(CoreError::Unauthorized("API key is required".into()));
        }
        let account = self
            .accounts
            .lookup(credential)
            .await?
            .ok_or_else(|| CoreError::Unauthorized("Invalid API key".into()))?;
        if account.blocked {
            return Err(CoreError::Forbidden("Account is blocked".into()));
        }
        Ok(account)
    }

    /// Start a generation. Returns once the task id exists.
    pub async fn generate(
        &self,
        credential: &str,
        prompt: &str,
    ) -> Result<GenerateResponse, CoreError> {
        let account = self.authenticate(credential).await?;
        let prompt = validate_prompt(prompt)?;
        account.authorize(Utc::now())?;

        let task_id = self.orchestrator.submit(&account, prompt).await;
        Ok(GenerateResponse {
            task_id,
            status: TaskStatus::Pending,
        })
    }

    pub async fn get_task(&self, credential: &str, task_id: &str) -> Result<TaskView, CoreError> {
        let account = self.authenticate(credential).await?;
        let task = self.registry.get(task_id, &account.caller()).await?;
        Ok(task.into())
    }

    /// Tasks visible to the caller: all of them for admins, own otherwise.
    pub async fn list_tasks(&self, credential: &str) -> Result<Vec<TaskView>, CoreError> {
        let account = self.authenticate(credential).await?;
        let tasks = self.registry.list(&account.caller()).await;
        Ok(tasks.into_iter().map(TaskView::from).collect())
    }

    /// Upscale one variant of a finished generation.
    ///
    /// `task_id` may be an internal task id or the backend message id of
    /// the grid. Live tasks are checked first, then durable history.
    pub async fn upscale(
        &self,
        credential: &str,
        task_id: &str,
        variant_index: u8,
    ) -> Result<UpscaleView, CoreError> {
        let account = self.authenticate(credential).await?;
        let index = VariantIndex::try_from(variant_index)?;
        if task_id.trim().is_empty() {
            return Err(CoreError::Validation("task_id is required".into()));
        }
        account.authorize(Utc::now())?;

        let source = self.find_upscale_source(&account, task_id).await?;
        tracing::info!(
            task_id = %source.task_id,
            message_id = %source.message_id,
            variant = index.get(),
            "Upscale requested",
        );

        let image = self
            .executor
            .upscale(&account, &source.message_id, index, &source.content_hash)
            .await?;

        let entry = HistoryEntry::Upscale {
            source_task_id: source.task_id.clone(),
            source_message_id: source.message_id.clone(),
            external_message_id: image.external_message_id.clone(),
            variant_index: index,
            image_url: image.url.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.records.append_history(&account.credential, &entry).await {
            tracing::error!(
                task_id = %source.task_id,
                error = %e,
                "Failed to append upscale history",
            );
        }

        Ok(UpscaleView {
            source_task_id: source.task_id,
            variant_index: index,
            image_url: image.url,
            external_message_id: image.external_message_id,
        })
    }

    async fn find_upscale_source(
        &self,
        account: &Account,
        id: &str,
    ) -> Result<UpscaleSource, CoreError> {
        match self.registry.get(id, &account.caller()).await {
            Ok(task) => match (task.status, task.result) {
                (TaskStatus::Completed, Some(image)) => {
                    let content_hash = image.effective_hash().ok_or_else(missing_hash)?;
                    return Ok(UpscaleSource {
                        task_id: task.id,
                        message_id: image.external_message_id,
                        content_hash,
                    });
                }
                (status, _) if !status.is_terminal() => {
                    return Err(CoreError::Conflict(format!(
                        "Task {id} is still {}; wait for it to complete",
                        status.as_str()
                    )));
                }
                _ => {}
            },
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        match self.records.find_generation(&account.credential, id).await? {
            Some(HistoryEntry::Generation {
                task_id,
                external_message_id,
                image_url,
                content_hash,
                ..
            }) => {
                if external_message_id.is_empty() {
                    return Err(CoreError::Validation(format!(
                        "Generation {id} has no backend message id; generate again"
                    )));
                }
                let content_hash = content_hash
                    .filter(|h| !h.is_empty())
                    .or_else(|| extract_content_hash(&image_url))
                    .ok_or_else(missing_hash)?;
                Ok(UpscaleSource {
                    task_id,
                    message_id: external_message_id,
                    content_hash,
                })
            }
            _ => Err(CoreError::NotFound {
                entity: "generation",
                id: id.to_string(),
            }),
        }
    }

    /// Start a full generation, optionally waiting for it to finish.
    pub async fn generate_full(
        &self,
        credential: &str,
        request: FullGenerationRequest,
    ) -> Result<FullGenerationView, CoreError> {
        let account = self.authenticate(credential).await?;
        let prompt = validate_prompt(&request.prompt)?;
        account.authorize(Utc::now())?;

        let record = if request.wait {
            self.pipeline
                .start_and_wait(
                    &account,
                    prompt,
                    request.variants,
                    request.mode,
                    self.config.wait_cap,
                )
                .await?
        } else {
            self.pipeline
                .start(&account, prompt, request.variants, request.mode)
                .await?
        };
        let progress = self.live_progress(&record).await;
        Ok(FullGenerationView::new(record, progress))
    }

    pub async fn get_full_generation(
        &self,
        credential: &str,
        id: &str,
    ) -> Result<FullGenerationView, CoreError> {
        let account = self.authenticate(credential).await?;
        let record = self.records.get_record(id).await?.ok_or_else(|| CoreError::NotFound {
            entity: "full_generation",
            id: id.to_string(),
        })?;
        if !account.caller().can_access(&record.owner) {
            return Err(CoreError::Forbidden("Full generation belongs to another account".into()));
        }
        let progress = self.live_progress(&record).await;
        Ok(FullGenerationView::new(record, progress))
    }

    /// Newest-first summaries of the caller's full generations.
    pub async fn list_full_generations(
        &self,
        credential: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FullGenerationSummary>, CoreError> {
        let account = self.authenticate(credential).await?;
        let records = self
            .records
            .list_records(&account.credential, limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        Ok(records.iter().map(FullGenerationSummary::from).collect())
    }

    async fn live_progress(&self, record: &FullGenerationRecord) -> Option<u8> {
        if record.status != FullGenerationStatus::Generating {
            return None;
        }
        self.registry.peek(&record.task_id).await.and_then(|t| t.progress)
    }
}

fn missing_hash() -> CoreError {
    CoreError::Validation("Source image has no content hash; generate again".into())
}

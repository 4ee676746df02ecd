//! Single generation requests, from submission to finalization.
//!
//! [`JobOrchestrator::submit`] registers the task and returns its id
//! before anything touches the network; the rest runs on a spawned task
//! that writes back into the [`TaskRegistry`]. Submission to the backend
//! is never retried: each call starts a distinct backend job.

use std::sync::Arc;

use tokio::sync::mpsc;

use relay_core::account::Account;
use relay_core::error::CoreError;
use relay_core::image::ImageReference;
use relay_core::records::{GenerationTask, HistoryEntry};
use relay_core::store::{AccountStore, RecordStore};
use relay_core::types::{new_task_id, TaskId};
use relay_discord::backend::BackendClient;

use crate::config::PipelineConfig;
use crate::registry::TaskRegistry;
use crate::resolver::{AttachmentResolver, Resolution};

/// Drives background generation tasks from submission to a terminal state.
pub struct JobOrchestrator {
    backend: Arc<dyn BackendClient>,
    accounts: Arc<dyn AccountStore>,
    records: Arc<dyn RecordStore>,
    registry: Arc<TaskRegistry>,
    resolver: AttachmentResolver,
    config: Arc<PipelineConfig>,
}

impl JobOrchestrator {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        accounts: Arc<dyn AccountStore>,
        records: Arc<dyn RecordStore>,
        registry: Arc<TaskRegistry>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        let resolver = AttachmentResolver::new(Arc::clone(&backend), config.resolver_policy());
        Self {
            backend,
            accounts,
            records,
            registry,
            resolver,
            config,
        }
    }

    /// Register a pending task for `prompt`.
    pub async fn register(&self, account: &Account, prompt: &str) -> TaskId {
        let task_id = new_task_id();
        self.registry
            .insert(GenerationTask::new(
                task_id.clone(),
                prompt,
                account.credential.clone(),
                account.label.clone(),
            ))
            .await;
        task_id
    }

    /// Register a task and run it in the background. Returns the task id
    /// immediately.
    pub async fn submit(self: &Arc<Self>, account: &Account, prompt: String) -> TaskId {
        let task_id = self.register(account, &prompt).await;
        tracing::info!(task_id = %task_id, account = %account.label, "Generation submitted");

        let this = Arc::clone(self);
        let account = account.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            // Failures are already recorded on the task.
            let _ = this.execute(&id, &account, &prompt).await;
        });

        task_id
    }

    /// Run a registered task to completion.
    ///
    /// On success the caller's usage is incremented (unless unlimited),
    /// ephemeral media is resolved within the configured budget, the task
    /// completes, and one history entry is appended. On failure the task
    /// fails with the backend error verbatim.
    pub async fn execute(
        &self,
        task_id: &str,
        account: &Account,
        prompt: &str,
    ) -> Result<ImageReference, CoreError> {
        self.registry.mark_processing(task_id).await?;

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let generation = self.backend.submit_generation(account, prompt, progress_tx);
        tokio::pin!(generation);

        let result = loop {
            tokio::select! {
                result = &mut generation => break result,
                Some(percent) = progress_rx.recv() => {
                    self.registry.update_progress(task_id, percent).await;
                }
            }
        };
        while let Ok(percent) = progress_rx.try_recv() {
            self.registry.update_progress(task_id, percent).await;
        }

        let generated = match result {
            Ok(generated) => generated,
            Err(e) => {
                let message = e.to_string();
                tracing::error!(task_id, error = %message, "Generation failed");
                self.registry.fail(task_id, message.clone()).await?;
                return Err(CoreError::BackendSubmission(message));
            }
        };

        let image =
            ImageReference::new(generated.url, generated.message_id, generated.content_hash);
        tracing::info!(
            task_id,
            message_id = %image.external_message_id,
            ephemeral = image.ephemeral,
            "Generation returned image",
        );

        if !account.is_unlimited() {
            if let Err(e) = self.accounts.increment_usage(&account.credential).await {
                tracing::error!(task_id, error = %e, "Failed to increment usage");
            }
        }

        let image = if image.ephemeral {
            self.settle(task_id, account, image).await
        } else {
            image
        };

        self.registry.complete(task_id, image.clone()).await?;

        let entry = HistoryEntry::generation(task_id, prompt, &image);
        if let Err(e) = self.records.append_history(&account.credential, &entry).await {
            tracing::error!(task_id, error = %e, "Failed to append generation history");
        }

        tracing::info!(task_id, url = %image.url, "Generation completed");
        Ok(image)
    }

    /// Promote an ephemeral reference, giving up after the resolution
    /// budget and keeping the ephemeral one.
    async fn settle(
        &self,
        task_id: &str,
        account: &Account,
        image: ImageReference,
    ) -> ImageReference {
        let resolution = tokio::time::timeout(
            self.config.resolution_budget,
            self.resolver
                .resolve(account, &image.external_message_id, self.config.resolver_attempts),
        )
        .await;

        match resolution {
            Ok(Resolution::Resolved { image: mut resolved, .. }) => {
                if resolved.content_hash.is_none() {
                    resolved.content_hash = image.content_hash.clone();
                }
                resolved
            }
            Ok(Resolution::Timeout { attempts }) => {
                tracing::warn!(task_id, attempts, "Keeping ephemeral URL after resolver timeout");
                image
            }
            Err(_) => {
                tracing::warn!(
                    task_id,
                    budget_secs = self.config.resolution_budget.as_secs(),
                    "Keeping ephemeral URL after resolution budget elapsed",
                );
                image
            }
        }
    }
}

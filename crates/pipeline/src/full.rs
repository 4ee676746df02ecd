//! Full generations: generate a grid, then upscale selected variants.
//!
//! The record moves `generating -> generated -> upscaling -> completed`,
//! or to `failed` if the generation itself fails. Per-variant failures
//! are captured as outcomes and never fail the record. In concurrent mode
//! each variant runs on its own task and reports back `(slot, outcome)`,
//! so every requested index fills exactly one slot regardless of
//! completion order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};

use relay_core::account::Account;
use relay_core::error::CoreError;
use relay_core::image::ImageReference;
use relay_core::records::{FullGenerationRecord, UpscaleOutcome};
use relay_core::store::RecordStore;
use relay_core::types::new_full_generation_id;
use relay_core::variant::{ExecutionMode, VariantIndex, VariantSelection};

use crate::config::PipelineConfig;
use crate::orchestrator::JobOrchestrator;
use crate::upscale::UpscaleExecutor;

const MISSING_HASH: &str = "No content hash available for the original image";

/// Runs a generation followed by upscales of the selected variants.
pub struct FullGenerationPipeline {
    orchestrator: Arc<JobOrchestrator>,
    executor: Arc<UpscaleExecutor>,
    records: Arc<dyn RecordStore>,
    config: Arc<PipelineConfig>,
}

impl FullGenerationPipeline {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        executor: Arc<UpscaleExecutor>,
        records: Arc<dyn RecordStore>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            orchestrator,
            executor,
            records,
            config,
        }
    }

    /// Create and persist the record, then run it in the background.
    pub async fn start(
        self: &Arc<Self>,
        account: &Account,
        prompt: String,
        variants: VariantSelection,
        mode: ExecutionMode,
    ) -> Result<FullGenerationRecord, CoreError> {
        let (record, _handle) = self.launch(account, prompt, variants, mode).await?;
        Ok(record)
    }

    /// Start a run and wait up to `wait` for it to finish.
    ///
    /// If the wait elapses first the run continues in the background and
    /// the latest persisted state is returned.
    pub async fn start_and_wait(
        self: &Arc<Self>,
        account: &Account,
        prompt: String,
        variants: VariantSelection,
        mode: ExecutionMode,
        wait: Duration,
    ) -> Result<FullGenerationRecord, CoreError> {
        let wait = wait.min(self.config.wait_cap);
        let (record, handle) = self.launch(account, prompt, variants, mode).await?;

        match tokio::time::timeout(wait, handle).await {
            Ok(Ok(finished)) => Ok(finished),
            Ok(Err(e)) => Err(CoreError::Internal(format!("Full generation task panicked: {e}"))),
            Err(_) => {
                tracing::info!(
                    full_generation_id = %record.id,
                    "Wait elapsed, run continues in background",
                );
                Ok(self.records.get_record(&record.id).await?.unwrap_or(record))
            }
        }
    }

    async fn launch(
        self: &Arc<Self>,
        account: &Account,
        prompt: String,
        variants: VariantSelection,
        mode: ExecutionMode,
    ) -> Result<(FullGenerationRecord, JoinHandle<FullGenerationRecord>), CoreError> {
        let task_id = self.orchestrator.register(account, &prompt).await;
        let record = FullGenerationRecord::new(
            new_full_generation_id(),
            account.credential.clone(),
            prompt,
            variants,
            mode,
            task_id,
        );
        self.records.create_record(&record).await?;

        tracing::info!(
            full_generation_id = %record.id,
            task_id = %record.task_id,
            variants = record.variants.len(),
            mode = ?record.mode,
            "Full generation started",
        );

        let this = Arc::clone(self);
        let account = account.clone();
        let initial = record.clone();
        let handle = tokio::spawn(async move { this.run(initial, &account).await });
        Ok((record, handle))
    }

    /// Drive a record to a terminal state.
    pub async fn run(
        &self,
        mut record: FullGenerationRecord,
        account: &Account,
    ) -> FullGenerationRecord {
        let original = match self
            .orchestrator
            .execute(&record.task_id, account, &record.prompt)
            .await
        {
            Ok(image) => image,
            Err(e) => {
                tracing::error!(
                    full_generation_id = %record.id,
                    error = %e,
                    "Full generation failed",
                );
                self.transition(&mut record, |r| r.fail(e.to_string())).await;
                return record;
            }
        };

        self.transition(&mut record, |r| r.mark_generated(original.clone()))
            .await;

        if record.variants.is_empty() {
            self.transition(&mut record, |r| r.complete(Vec::new())).await;
            return record;
        }

        self.transition(&mut record, |r| r.begin_upscaling()).await;

        let settle = if original.ephemeral {
            self.config.ephemeral_settle_delay
        } else {
            self.config.settle_delay
        };
        tracing::debug!(
            full_generation_id = %record.id,
            settle_ms = settle.as_millis() as u64,
            "Settling before upscales",
        );
        tokio::time::sleep(settle).await;

        let outcomes = match original.effective_hash() {
            Some(hash) => match record.mode {
                ExecutionMode::Sequential => {
                    self.run_sequential(account, &original, &hash, &record.variants)
                        .await
                }
                ExecutionMode::Concurrent => {
                    self.run_concurrent(account, &original, &hash, &record.variants)
                        .await
                }
            },
            None => record
                .variants
                .iter()
                .map(|index| UpscaleOutcome::failed(index, MISSING_HASH))
                .collect(),
        };

        self.transition(&mut record, |r| r.complete(outcomes)).await;
        if let Some(stats) = &record.stats {
            tracing::info!(
                full_generation_id = %record.id,
                successful = stats.successful_upscales,
                failed = stats.failed_upscales,
                duration_seconds = stats.duration_seconds,
                "Full generation completed",
            );
        }
        record
    }

    async fn run_sequential(
        &self,
        account: &Account,
        original: &ImageReference,
        hash: &str,
        variants: &VariantSelection,
    ) -> Vec<UpscaleOutcome> {
        let mut outcomes = Vec::with_capacity(variants.len());
        for (position, index) in variants.iter().enumerate() {
            if position > 0 {
                tokio::time::sleep(self.config.sequential_delay).await;
            }
            let outcome = upscale_outcome(
                &self.executor,
                account,
                &original.external_message_id,
                index,
                hash,
            )
            .await;
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_concurrent(
        &self,
        account: &Account,
        original: &ImageReference,
        hash: &str,
        variants: &VariantSelection,
    ) -> Vec<UpscaleOutcome> {
        let indices: Vec<VariantIndex> = variants.iter().collect();
        let mut slots: Vec<Option<UpscaleOutcome>> = vec![None; indices.len()];
        let mut set = JoinSet::new();

        for (slot, index) in indices.iter().copied().enumerate() {
            let executor = Arc::clone(&self.executor);
            let account = account.clone();
            let message_id = original.external_message_id.clone();
            let hash = hash.to_string();
            let offset = self.config.concurrent_stagger * slot as u32;
            set.spawn(async move {
                tokio::time::sleep(offset).await;
                let outcome = upscale_outcome(&executor, &account, &message_id, index, &hash).await;
                (slot, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "Upscale task did not finish"),
            }
        }

        slots
            .into_iter()
            .zip(indices)
            .map(|(slot, index)| {
                slot.unwrap_or_else(|| UpscaleOutcome::failed(index, "Upscale task did not finish"))
            })
            .collect()
    }

    /// Apply a state change and persist it. Store failures are logged; the
    /// in-memory record stays authoritative for the rest of the run.
    async fn transition<F>(&self, record: &mut FullGenerationRecord, change: F)
    where
        F: FnOnce(&mut FullGenerationRecord) -> Result<(), CoreError>,
    {
        if let Err(e) = change(record) {
            tracing::error!(
                full_generation_id = %record.id,
                error = %e,
                "Invalid record transition",
            );
            return;
        }
        if let Err(e) = self.records.update_record(record).await {
            tracing::error!(
                full_generation_id = %record.id,
                error = %e,
                "Failed to persist record",
            );
        }
    }
}

async fn upscale_outcome(
    executor: &UpscaleExecutor,
    account: &Account,
    message_id: &str,
    index: VariantIndex,
    hash: &str,
) -> UpscaleOutcome {
    match executor.upscale(account, message_id, index, hash).await {
        Ok(image) => UpscaleOutcome::succeeded(index, image),
        Err(e) => {
            tracing::warn!(message_id, variant = index.get(), error = %e, "Variant upscale failed");
            UpscaleOutcome::failed(index, e.to_string())
        }
    }
}

//! Per-variant upscale execution.
//!
//! An upscale goes through three phases:
//!
//! 1. **Eligibility**: the source message must be younger than the
//!    backend's interaction window. Checked before any network call.
//! 2. **Submission**: the upscale button id is not documented and has
//!    changed between bot revisions, so each configured
//!    [`TokenTemplate`] is rendered and submitted in order until one is
//!    accepted. A rate limit retries the same candidate after the
//!    requested delay, up to a cap.
//! 3. **Awaiting result**: recent channel messages are polled for the
//!    bot's reply to the source message, matched by reply reference or by
//!    the `Image #N` marker.
//!
//! No caller-visible state changes before success, so a failed call can
//! simply be retried.

use std::sync::Arc;

use chrono::Utc;

use relay_core::account::Account;
use relay_core::error::CoreError;
use relay_core::image::ImageReference;
use relay_core::retry::{poll, Polled, RetryPolicy};
use relay_core::snowflake;
use relay_core::variant::VariantIndex;
use relay_discord::api::InteractionOutcome;
use relay_discord::backend::{BackendClient, BackendError};
use relay_discord::messages::Message;
use relay_discord::tokens::TokenTemplate;

use crate::config::PipelineConfig;

/// Errors from a single upscale.
#[derive(Debug, thiserror::Error)]
pub enum UpscaleError {
    #[error("Invalid upscale input: {0}")]
    InvalidInput(String),

    #[error("Source message is {age_secs}s old, past the upscale window")]
    EligibilityExpired { age_secs: i64 },

    #[error(
        "No candidate token was accepted (last error: {})",
        .last_error.as_deref().unwrap_or("none")
    )]
    ProtocolMismatch { last_error: Option<String> },

    #[error(
        "Upscale result not found after {attempts} polls (last error: {})",
        .last_error.as_deref().unwrap_or("none")
    )]
    ResultTimeout { attempts: u32, last_error: Option<String> },
}

impl From<UpscaleError> for CoreError {
    fn from(e: UpscaleError) -> Self {
        match e {
            UpscaleError::InvalidInput(msg) => CoreError::Validation(msg),
            UpscaleError::EligibilityExpired { age_secs } => {
                CoreError::EligibilityExpired { age_secs }
            }
            other @ UpscaleError::ProtocolMismatch { .. } => {
                CoreError::ProtocolMismatch(other.to_string())
            }
            other @ UpscaleError::ResultTimeout { .. } => CoreError::Timeout(other.to_string()),
        }
    }
}

/// Submits one variant upscale and waits for the bot's reply.
pub struct UpscaleExecutor {
    backend: Arc<dyn BackendClient>,
    templates: Vec<TokenTemplate>,
    result_policy: RetryPolicy,
    message_window: u8,
    rate_limit_retries: u32,
}

impl UpscaleExecutor {
    pub fn new(backend: Arc<dyn BackendClient>, config: &PipelineConfig) -> Self {
        Self {
            backend,
            templates: config.upscale_templates.clone(),
            result_policy: config.result_policy(),
            message_window: config.message_window,
            rate_limit_retries: config.rate_limit_retries,
        }
    }

    /// Upscale one variant of the grid in `message_id`.
    pub async fn upscale(
        &self,
        account: &Account,
        message_id: &str,
        index: VariantIndex,
        content_hash: &str,
    ) -> Result<ImageReference, UpscaleError> {
        if content_hash.trim().is_empty() {
            return Err(UpscaleError::InvalidInput("content hash is empty".into()));
        }
        match snowflake::check_upscale_eligibility(message_id, Utc::now()) {
            Ok(()) => {}
            Err(CoreError::EligibilityExpired { age_secs }) => {
                tracing::info!(
                    message_id,
                    variant = index.get(),
                    age_secs,
                    "Upscale rejected: source too old",
                );
                return Err(UpscaleError::EligibilityExpired { age_secs });
            }
            Err(e) => return Err(UpscaleError::InvalidInput(e.to_string())),
        }

        let token = self.submit(account, message_id, index, content_hash).await?;
        tracing::info!(message_id, variant = index.get(), token = %token, "Upscale accepted");

        self.await_result(account, message_id, index).await
    }

    /// Try each candidate token until one is accepted. Returns the
    /// accepted token.
    async fn submit(
        &self,
        account: &Account,
        message_id: &str,
        index: VariantIndex,
        content_hash: &str,
    ) -> Result<String, UpscaleError> {
        let mut last_error = None;

        for template in &self.templates {
            let token = template.render(index, content_hash);
            let mut rate_limited = 0;

            loop {
                let submitted = self
                    .backend
                    .submit_interaction(account, &token, message_id)
                    .await;
                let response = match submitted {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(
                            variant = index.get(),
                            token = %token,
                            error = %e,
                            "Upscale submission failed",
                        );
                        last_error = Some(format!("{token}: {e}"));
                        break;
                    }
                };

                match response.outcome() {
                    InteractionOutcome::Accepted => return Ok(token),
                    InteractionOutcome::RateLimited(delay)
                        if rate_limited < self.rate_limit_retries =>
                    {
                        rate_limited += 1;
                        tracing::warn!(
                            variant = index.get(),
                            token = %token,
                            delay_ms = delay.as_millis() as u64,
                            retry = rate_limited,
                            "Upscale rate limited, retrying same token",
                        );
                        tokio::time::sleep(delay).await;
                    }
                    InteractionOutcome::RateLimited(_) => {
                        last_error = Some(format!(
                            "{token}: still rate limited after {rate_limited} retries"
                        ));
                        break;
                    }
                    InteractionOutcome::NotFound => {
                        tracing::debug!(
                            variant = index.get(),
                            token = %token,
                            "Upscale token not found",
                        );
                        last_error = Some(format!("{token}: not found (404)"));
                        break;
                    }
                    InteractionOutcome::InvalidReference => {
                        tracing::debug!(
                            variant = index.get(),
                            token = %token,
                            "Upscale token rejected as invalid",
                        );
                        last_error =
                            Some(format!("{token}: invalid reference ({})", response.body));
                        break;
                    }
                    InteractionOutcome::Rejected { status, body } => {
                        tracing::warn!(
                            variant = index.get(),
                            token = %token,
                            status,
                            "Upscale token rejected",
                        );
                        last_error = Some(format!("{token}: {status} {body}"));
                        break;
                    }
                }
            }
        }

        tracing::warn!(
            message_id,
            variant = index.get(),
            candidates = self.templates.len(),
            "No upscale token accepted",
        );
        Err(UpscaleError::ProtocolMismatch { last_error })
    }

    async fn await_result(
        &self,
        account: &Account,
        message_id: &str,
        index: VariantIndex,
    ) -> Result<ImageReference, UpscaleError> {
        let outcome = poll(&self.result_policy, "upscale_result", |_| {
            self.find_result(account, message_id, index)
        })
        .await;

        match outcome {
            Polled::Ready { value, attempts } => {
                tracing::info!(message_id, variant = index.get(), attempts, "Upscale result found");
                Ok(value)
            }
            Polled::Exhausted { attempts, last_error } => {
                Err(UpscaleError::ResultTimeout { attempts, last_error })
            }
        }
    }

    async fn find_result(
        &self,
        account: &Account,
        message_id: &str,
        index: VariantIndex,
    ) -> Result<Option<ImageReference>, BackendError> {
        let messages = self
            .backend
            .fetch_recent_messages(account, self.message_window)
            .await?;
        let application_id = self.backend.application_id();

        Ok(messages
            .iter()
            .find(|m| is_upscale_reply(m, application_id, message_id, index))
            .and_then(|m| m.image_reference(m.component_hash())))
    }
}

/// Whether `message` is the bot's upscale of variant `index` of the grid
/// in `source_id`.
///
/// A reply naming another variant never matches, even when it references
/// the same grid.
fn is_upscale_reply(
    message: &Message,
    application_id: &str,
    source_id: &str,
    index: VariantIndex,
) -> bool {
    if !message.is_from(application_id)
        || message.attachments.is_empty()
        || message.id == source_id
        || !snowflake::is_newer(&message.id, source_id)
    {
        return false;
    }
    match message.variant_marker() {
        Some(_) => message.names_variant(index),
        None => message.references(source_id),
    }
}

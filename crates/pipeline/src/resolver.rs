//! Ephemeral attachment promotion.
//!
//! The backend first attaches media under a short-lived URL and later
//! swaps it, on the same message, for a permanent one. Nothing signals
//! the swap, so the resolver re-reads the message until its attachment
//! URL no longer carries the ephemeral marker.

use std::sync::Arc;

use relay_core::account::Account;
use relay_core::image::{is_ephemeral_url, ImageReference};
use relay_core::retry::{poll, Polled, RetryPolicy};
use relay_discord::backend::{BackendClient, BackendError};

/// Result of a resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved { image: ImageReference, attempts: u32 },
    /// Every poll returned an ephemeral URL, no message, or an error.
    Timeout { attempts: u32 },
}

/// Promotes ephemeral attachment URLs to their permanent form.
pub struct AttachmentResolver {
    backend: Arc<dyn BackendClient>,
    policy: RetryPolicy,
}

impl AttachmentResolver {
    pub fn new(backend: Arc<dyn BackendClient>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Poll `message_id` until its attachment is permanent.
    ///
    /// Exactly `max_attempts` reads are allotted. A failed read is logged
    /// and consumes an attempt.
    pub async fn resolve(
        &self,
        account: &Account,
        message_id: &str,
        max_attempts: u32,
    ) -> Resolution {
        let policy = RetryPolicy {
            max_attempts,
            ..self.policy.clone()
        };

        let outcome = poll(&policy, "attachment_resolution", |_| {
            self.check_once(account, message_id)
        })
        .await;

        match outcome {
            Polled::Ready { value, attempts } => {
                tracing::info!(message_id, attempts, "Attachment resolved to permanent URL");
                Resolution::Resolved { image: value, attempts }
            }
            Polled::Exhausted { attempts, last_error } => {
                tracing::warn!(
                    message_id,
                    attempts,
                    last_error = last_error.as_deref().unwrap_or("none"),
                    "Attachment still ephemeral after all polls",
                );
                Resolution::Timeout { attempts }
            }
        }
    }

    async fn check_once(
        &self,
        account: &Account,
        message_id: &str,
    ) -> Result<Option<ImageReference>, BackendError> {
        let Some(message) = self.backend.fetch_message(account, message_id).await? else {
            return Ok(None);
        };
        let Some(attachment) = message.first_attachment() else {
            return Ok(None);
        };
        if is_ephemeral_url(&attachment.url) {
            return Ok(None);
        }
        Ok(Some(ImageReference::new(
            attachment.url.clone(),
            message.id.clone(),
            message.component_hash(),
        )))
    }
}

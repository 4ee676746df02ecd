//! The backend seam driven by the pipeline.
//!
//! [`BackendClient`] is the only way the pipeline talks to the generation
//! backend. [`crate::client::DiscordBackend`] implements it over REST; tests
//! substitute scripted fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use relay_core::account::Account;

use crate::api::{DiscordApiError, InteractionResponse};
use crate::messages::Message;

/// Channel on which a running generation reports progress percentages.
pub type ProgressSender = mpsc::UnboundedSender<u8>;

/// The finished result of a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Id of the bot message that carries the grid.
    pub message_id: String,
    pub url: String,
    /// Hash advertised by the backend, when it exposes one.
    pub content_hash: Option<String>,
    /// Message flags, echoed back on component interactions.
    pub flags: u64,
}

/// Errors from the backend client.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Network-level failure. The credential's session is evicted.
    #[error("Backend transport error: {0}")]
    Transport(String),

    /// The platform answered with an error status.
    #[error("Backend returned {status}: {body}")]
    Api { status: u16, body: String },

    /// A session could not be established for the credential.
    #[error("Backend session error: {0}")]
    Session(String),

    /// The generation did not finish within the poll budget.
    #[error("Backend timed out: {0}")]
    Timeout(String),

    /// A response could not be interpreted.
    #[error("Unexpected backend response: {0}")]
    Decode(String),
}

impl From<DiscordApiError> for BackendError {
    fn from(e: DiscordApiError) -> Self {
        match e {
            DiscordApiError::Request(err) if err.is_decode() => {
                BackendError::Decode(err.to_string())
            }
            DiscordApiError::Request(err) => BackendError::Transport(err.to_string()),
            DiscordApiError::ApiError { status, body } => BackendError::Api { status, body },
        }
    }
}

/// Operations the pipeline needs from the generation backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Application (bot) id whose messages carry results.
    fn application_id(&self) -> &str;

    /// Run a generation to completion and return the finished grid.
    ///
    /// Progress percentages are sent on `progress` as they are observed.
    /// Not retried internally: each call is a distinct backend job.
    async fn submit_generation(
        &self,
        account: &Account,
        prompt: &str,
        progress: ProgressSender,
    ) -> Result<GeneratedImage, BackendError>;

    /// Press the component `custom_id` on `message_id`.
    ///
    /// Any HTTP status comes back in the response; only transport and
    /// session failures are errors.
    async fn submit_interaction(
        &self,
        account: &Account,
        custom_id: &str,
        message_id: &str,
    ) -> Result<InteractionResponse, BackendError>;

    /// Most recent messages in the account's channel, newest first.
    async fn fetch_recent_messages(
        &self,
        account: &Account,
        limit: u8,
    ) -> Result<Vec<Message>, BackendError>;

    /// A single message in the account's channel, `None` if it is gone.
    async fn fetch_message(
        &self,
        account: &Account,
        message_id: &str,
    ) -> Result<Option<Message>, BackendError>;
}

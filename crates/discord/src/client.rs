//! REST implementation of [`BackendClient`].
//!
//! A generation is started by invoking the bot's slash command as the
//! account's user, then followed by polling the channel for the bot's
//! message echoing the prompt. In-progress renders carry a `(NN%)` marker
//! that is forwarded as progress; the oldest matching message with an
//! attachment and no progress marker is the finished grid. Each grid is
//! claimed by the first job that picks it up, so two jobs of one account
//! running the same prompt never share a result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use relay_core::account::Account;
use relay_core::retry::{poll, Polled, RetryPolicy};
use relay_core::snowflake;

use crate::api::{DiscordApi, DiscordApiError, InteractionOutcome, InteractionResponse};
use crate::backend::{BackendClient, BackendError, GeneratedImage, ProgressSender};
use crate::config::BackendConfig;
use crate::messages::{content_matches_prompt, prompt_key, Message};
use crate::payloads::{component_interaction, imagine_command, CommandRef, InteractionContext};
use crate::session::{new_session_id, DiscordSession, SessionRegistry};

/// Name of the generation slash command.
const IMAGINE_COMMAND: &str = "imagine";

/// Clock skew tolerated when deciding whether a message is newer than the
/// submission.
const SUBMIT_SKEW_SECS: i64 = 2;

/// How long a claimed grid id is remembered.
const CLAIM_RETENTION_SECS: i64 = 3600;

/// Backend client talking to the platform's REST API.
pub struct DiscordBackend {
    api: DiscordApi,
    config: BackendConfig,
    sessions: SessionRegistry<DiscordSession>,
    /// Grid message ids already handed to a job, per credential.
    claimed: Mutex<HashMap<String, HashSet<String>>>,
}

impl DiscordBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let api = DiscordApi::new(config.api_base.clone(), config.request_timeout)?;
        Ok(Self::with_api(api, config))
    }

    pub fn with_api(api: DiscordApi, config: BackendConfig) -> Self {
        Self {
            api,
            config,
            sessions: SessionRegistry::new(),
            claimed: Mutex::new(HashMap::new()),
        }
    }

    /// Cached session for the account, created on first use.
    async fn session(&self, account: &Account) -> Result<Arc<DiscordSession>, BackendError> {
        self.sessions
            .get_or_create(&account.credential, || async {
                let user = self.api.current_user(&account.token).await.map_err(|e| match e {
                    DiscordApiError::ApiError { status, body } => {
                        BackendError::Session(format!("token rejected ({status}): {body}"))
                    }
                    other => BackendError::from(other),
                })?;
                tracing::info!(
                    account = %account.label,
                    user_id = %user.id,
                    "Backend session created",
                );
                Ok(DiscordSession {
                    user_id: user.id,
                    session_id: new_session_id(),
                })
            })
            .await
    }

    /// Convert an API error, evicting the account's session on transport
    /// failures.
    async fn fail(&self, account: &Account, error: DiscordApiError) -> BackendError {
        if error.is_transport() {
            tracing::warn!(
                account = %account.label,
                error = %error,
                "Transport error, evicting session",
            );
            self.sessions.evict(&account.credential).await;
        }
        BackendError::from(error)
    }

    fn context<'a>(
        &'a self,
        account: &'a Account,
        session: &'a DiscordSession,
    ) -> InteractionContext<'a> {
        InteractionContext {
            application_id: &self.config.application_id,
            guild_id: &account.server_id,
            channel_id: &account.channel_id,
            session_id: &session.session_id,
            nonce: snowflake::nonce(Utc::now()),
        }
    }

    /// One generation poll: scan recent messages for the job's reply.
    async fn poll_generation_once(
        &self,
        account: &Account,
        key: &str,
        after: &str,
        progress: &ProgressSender,
    ) -> Result<Option<GeneratedImage>, DiscordApiError> {
        let messages = match self
            .api
            .get_messages(&account.token, &account.channel_id, self.config.message_window)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                if e.is_transport() {
                    self.sessions.evict(&account.credential).await;
                }
                return Err(e);
            }
        };

        let candidates: Vec<&Message> = messages
            .iter()
            .filter(|m| is_generation_reply(m, &self.config.application_id, key, after))
            .collect();

        {
            let mut claimed = self.claimed.lock().await;
            let claims = claimed.entry(account.credential.clone()).or_default();
            if let Some(done) = select_final(&candidates, claims) {
                let Some(attachment) = done.first_attachment() else {
                    return Ok(None);
                };
                claims.insert(done.id.clone());
                let horizon = snowflake::from_timestamp(
                    Utc::now() - chrono::Duration::seconds(CLAIM_RETENTION_SECS),
                );
                claims.retain(|id| snowflake::is_newer(id, &horizon));
                return Ok(Some(GeneratedImage {
                    message_id: done.id.clone(),
                    url: attachment.url.clone(),
                    content_hash: done.component_hash(),
                    flags: done.flags,
                }));
            }
        }

        if let Some(percent) = candidates.iter().find_map(|m| m.progress()) {
            // Receiver may be gone if the caller stopped listening.
            let _ = progress.send(percent);
        }
        Ok(None)
    }
}

/// Whether `message` is the bot's grid reply for the prompt `key`,
/// posted after `after`.
fn is_generation_reply(message: &Message, application_id: &str, key: &str, after: &str) -> bool {
    message.is_from(application_id)
        && snowflake::is_newer(&message.id, after)
        && message.message_reference.is_none()
        && !message.content.contains("Image #")
        && content_matches_prompt(&message.content, key)
}

/// Oldest finished grid among `candidates` that no other job has claimed.
fn select_final<'a>(candidates: &[&'a Message], claimed: &HashSet<String>) -> Option<&'a Message> {
    candidates
        .iter()
        .copied()
        .filter(|m| m.is_final_render() && !claimed.contains(&m.id))
        .min_by_key(|m| snowflake::parse(&m.id).unwrap_or(u64::MAX))
}

#[async_trait]
impl BackendClient for DiscordBackend {
    fn application_id(&self) -> &str {
        &self.config.application_id
    }

    async fn submit_generation(
        &self,
        account: &Account,
        prompt: &str,
        progress: ProgressSender,
    ) -> Result<GeneratedImage, BackendError> {
        let session = self.session(account).await?;
        let after =
            snowflake::from_timestamp(Utc::now() - chrono::Duration::seconds(SUBMIT_SKEW_SECS));

        let command = CommandRef {
            id: &self.config.imagine_command_id,
            version: &self.config.imagine_command_version,
            name: IMAGINE_COMMAND,
        };
        let payload = imagine_command(&self.context(account, &session), &command, prompt);
        let response = match self.api.post_interaction(&account.token, &payload).await {
            Ok(response) => response,
            Err(e) => return Err(self.fail(account, e).await),
        };
        match response.outcome() {
            InteractionOutcome::Accepted => {}
            _ => {
                return Err(BackendError::Api {
                    status: response.status,
                    body: response.body,
                })
            }
        }
        tracing::info!(account = %account.label, "Generation command accepted");

        let key = prompt_key(prompt);
        let policy = RetryPolicy::fixed(self.config.max_polls, self.config.poll_interval);
        let outcome = poll(&policy, "generation", |_| {
            self.poll_generation_once(account, &key, &after, &progress)
        })
        .await;

        match outcome {
            Polled::Ready { value, attempts } => {
                tracing::info!(
                    account = %account.label,
                    message_id = %value.message_id,
                    attempts,
                    "Generation finished",
                );
                Ok(value)
            }
            Polled::Exhausted { attempts, last_error } => {
                Err(BackendError::Timeout(match last_error {
                    Some(e) => format!("no result after {attempts} polls (last error: {e})"),
                    None => format!("no result after {attempts} polls"),
                }))
            }
        }
    }

    async fn submit_interaction(
        &self,
        account: &Account,
        custom_id: &str,
        message_id: &str,
    ) -> Result<InteractionResponse, BackendError> {
        let session = self.session(account).await?;
        let payload =
            component_interaction(&self.context(account, &session), message_id, 0, custom_id);
        match self.api.post_interaction(&account.token, &payload).await {
            Ok(response) => {
                tracing::debug!(
                    message_id,
                    custom_id,
                    status = response.status,
                    "Interaction submitted",
                );
                Ok(response)
            }
            Err(e) => Err(self.fail(account, e).await),
        }
    }

    async fn fetch_recent_messages(
        &self,
        account: &Account,
        limit: u8,
    ) -> Result<Vec<Message>, BackendError> {
        match self.api.get_messages(&account.token, &account.channel_id, limit).await {
            Ok(messages) => Ok(messages),
            Err(e) => Err(self.fail(account, e).await),
        }
    }

    async fn fetch_message(
        &self,
        account: &Account,
        message_id: &str,
    ) -> Result<Option<Message>, BackendError> {
        match self
            .api
            .get_message(&account.token, &account.channel_id, message_id)
            .await
        {
            Ok(message) => Ok(message),
            Err(e) => Err(self.fail(account, e).await),
        }
    }
}

//! REST API client for the chat platform.
//!
//! Wraps the handful of endpoints the relay needs (current user,
//! interaction submission, channel message reads) using [`reqwest`].
//! Every call is authorized with the caller's user token.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::messages::Message;
use crate::payloads::InteractionPayload;

/// HTTP client for the platform's REST API.
#[derive(Clone)]
pub struct DiscordApi {
    client: reqwest::Client,
    base_url: String,
}

/// The account a token belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// Raw result of an interaction submission.
///
/// Interaction rejections are expected while negotiating token formats, so
/// non-2xx statuses are returned here instead of as errors.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionResponse {
    pub status: u16,
    pub body: String,
    /// Delay requested by a 429 response, from the header or JSON body.
    pub retry_after: Option<Duration>,
}

/// How the platform treated an interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    /// 2xx; 204 is the normal acknowledgement.
    Accepted,
    /// 404: the referenced message or component does not exist.
    NotFound,
    /// 400 carrying an unknown/invalid component or interaction error.
    InvalidReference,
    /// 429 with the delay to wait before retrying.
    RateLimited(Duration),
    /// Anything else.
    Rejected { status: u16, body: String },
}

/// Default wait when a 429 carries no usable `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

impl InteractionResponse {
    pub fn outcome(&self) -> InteractionOutcome {
        match self.status {
            200..=299 => InteractionOutcome::Accepted,
            404 => InteractionOutcome::NotFound,
            429 => InteractionOutcome::RateLimited(self.retry_after.unwrap_or(DEFAULT_RETRY_AFTER)),
            400 if is_invalid_reference(&self.body) => InteractionOutcome::InvalidReference,
            status => InteractionOutcome::Rejected {
                status,
                body: self.body.clone(),
            },
        }
    }
}

/// Error bodies returned when the component custom id is not recognised.
fn is_invalid_reference(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("unknown") || lower.contains("invalid form body") || lower.contains("component")
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum DiscordApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The platform returned a non-2xx status code.
    #[error("Platform API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl DiscordApiError {
    /// Whether the error came from the transport rather than the platform.
    pub fn is_transport(&self) -> bool {
        matches!(self, DiscordApiError::Request(_))
    }
}

impl DiscordApi {
    /// Create a client for `base_url` (e.g. `https://discord.com/api/v9`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DiscordApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve the user a token belongs to (`GET /users/@me`).
    pub async fn current_user(&self, token: &str) -> Result<CurrentUser, DiscordApiError> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.base_url))
            .header("Authorization", token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Submit an interaction (`POST /interactions`).
    ///
    /// Only transport failures are errors; any HTTP status is returned in
    /// the [`InteractionResponse`] for the caller to classify.
    pub async fn post_interaction(
        &self,
        token: &str,
        payload: &InteractionPayload,
    ) -> Result<InteractionResponse, DiscordApiError> {
        let response = self
            .client
            .post(format!("{}/interactions", self.base_url))
            .header("Authorization", token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let header_retry = retry_after_header(&response);
        let body = response.text().await.unwrap_or_default();
        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            header_retry.or_else(|| retry_after_body(&body))
        } else {
            None
        };

        Ok(InteractionResponse {
            status: status.as_u16(),
            body,
            retry_after,
        })
    }

    /// Most recent messages in a channel, newest first.
    pub async fn get_messages(
        &self,
        token: &str,
        channel_id: &str,
        limit: u8,
    ) -> Result<Vec<Message>, DiscordApiError> {
        let response = self
            .client
            .get(format!("{}/channels/{}/messages", self.base_url, channel_id))
            .header("Authorization", token)
            .query(&[("limit", limit.clamp(1, 100).to_string())])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch a single message by id.
    ///
    /// User tokens cannot read single messages directly, so this asks for
    /// the one message around `message_id` and checks the id. `None` when
    /// the message no longer exists.
    pub async fn get_message(
        &self,
        token: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<Message>, DiscordApiError> {
        let response = self
            .client
            .get(format!("{}/channels/{}/messages", self.base_url, channel_id))
            .header("Authorization", token)
            .query(&[("around", message_id), ("limit", "1")])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let messages: Vec<Message> = Self::parse_response(response).await?;
        Ok(messages.into_iter().find(|m| m.id == message_id))
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or return an
    /// [`DiscordApiError::ApiError`] with the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DiscordApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DiscordApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DiscordApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_seconds)
}

/// `retry_after` from a 429 JSON body (`{"retry_after": 1.5, ...}`).
fn retry_after_body(body: &str) -> Option<Duration> {
    #[derive(Deserialize)]
    struct RateLimitBody {
        retry_after: f64,
    }
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .and_then(|b| Duration::try_from_secs_f64(b.retry_after).ok())
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

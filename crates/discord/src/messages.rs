//! Chat message types and the helpers used to correlate bot replies.
//!
//! Only the fields the relay reads are modelled; everything else in the
//! platform's message JSON is ignored on deserialization.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use relay_core::image::{find_uuid, ImageReference};
use relay_core::variant::VariantIndex;

static PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d{1,3})%\)").expect("valid regex"));

static VARIANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Image #(\d)").expect("valid regex"));

/// Content fragments the bot shows while a job has not produced output.
const PENDING_MARKERS: &[&str] = &["(Waiting to start)", "(Stopped)", "(paused)"];

/// A channel message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub author: Author,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub components: Vec<ActionRow>,
    #[serde(default)]
    pub message_reference: Option<MessageReference>,
    #[serde(default)]
    pub flags: u64,
}

/// Message author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// A file attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Link from a reply to the message it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReference {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// A row of interactive components (buttons).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRow {
    #[serde(default)]
    pub components: Vec<Component>,
}

/// A single interactive component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl Message {
    pub fn first_attachment(&self) -> Option<&Attachment> {
        self.attachments.first()
    }

    pub fn is_from(&self, author_id: &str) -> bool {
        self.author.id == author_id
    }

    /// Whether this message replies to `message_id`.
    pub fn references(&self, message_id: &str) -> bool {
        self.message_reference
            .as_ref()
            .and_then(|r| r.message_id.as_deref())
            .is_some_and(|id| id == message_id)
    }

    /// Custom ids of every button on the message.
    pub fn custom_ids(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .flat_map(|row| row.components.iter())
            .filter_map(|c| c.custom_id.as_deref())
    }

    /// Content hash advertised by the bot in its job button ids
    /// (`MJ::JOB::<op>::<n>::<uuid>`).
    pub fn component_hash(&self) -> Option<String> {
        self.custom_ids()
            .filter(|id| id.contains("::JOB::"))
            .find_map(find_uuid)
    }

    /// Progress percentage shown in the content, e.g. `(42%)`.
    pub fn progress(&self) -> Option<u8> {
        PROGRESS_RE
            .captures(&self.content)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .map(|p| p.min(100))
    }

    /// Whether the message shows a finished result rather than an
    /// in-progress preview.
    pub fn is_final_render(&self) -> bool {
        !self.attachments.is_empty()
            && self.progress().is_none()
            && !PENDING_MARKERS.iter().any(|m| self.content.contains(m))
    }

    /// Variant number named in the content of an upscale (`Image #2`).
    pub fn variant_marker(&self) -> Option<u8> {
        VARIANT_RE
            .captures(&self.content)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    pub fn names_variant(&self, index: VariantIndex) -> bool {
        self.variant_marker() == Some(index.get())
    }

    /// Image reference for the first attachment, if any.
    pub fn image_reference(&self, backend_hash: Option<String>) -> Option<ImageReference> {
        self.first_attachment()
            .map(|a| ImageReference::new(a.url.clone(), self.id.clone(), backend_hash))
    }
}

/// Normalized prompt text used to find the bot's echo of a job.
///
/// The bot may rewrite trailing `--parameters`, so only the descriptive
/// part is compared, case-insensitively.
pub fn prompt_key(prompt: &str) -> String {
    prompt
        .split(" --")
        .next()
        .unwrap_or(prompt)
        .trim()
        .to_lowercase()
}

/// The bolded prompt the bot echoes at the start of its reply.
pub fn echoed_prompt(content: &str) -> Option<&str> {
    let (_, rest) = content.split_once("**")?;
    let (prompt, _) = rest.split_once("**")?;
    Some(prompt)
}

/// Whether `content` echoes exactly the prompt with the given key.
pub fn content_matches_prompt(content: &str, key: &str) -> bool {
    !key.is_empty() && echoed_prompt(content).is_some_and(|echo| prompt_key(echo) == key)
}

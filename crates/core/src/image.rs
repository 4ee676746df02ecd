//! Image references produced by the backend.
//!
//! The backend first serves media from short-lived "ephemeral" URLs that
//! are later replaced in place by permanent ones. The content hash needed
//! for derived operations is either supplied by the backend or recovered
//! from the UUID-shaped token in the URL's file name.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Path fragment present in every short-lived attachment URL.
pub const EPHEMERAL_MARKER: &str = "ephemeral-attachments";

const UUID_PATTERN: &str = r"([a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12})";

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(UUID_PATTERN).expect("valid regex"));

/// A generated image as known to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub url: String,
    /// Snowflake id of the backend message carrying the image.
    pub external_message_id: String,
    pub content_hash: Option<String>,
    pub ephemeral: bool,
}

impl ImageReference {
    /// Build a reference, preferring `backend_hash` over one derived from
    /// the URL.
    pub fn new(
        url: impl Into<String>,
        external_message_id: impl Into<String>,
        backend_hash: Option<String>,
    ) -> Self {
        let url = url.into();
        let content_hash = backend_hash
            .filter(|h| !h.is_empty())
            .or_else(|| extract_content_hash(&url));
        let ephemeral = is_ephemeral_url(&url);
        Self {
            url,
            external_message_id: external_message_id.into(),
            content_hash,
            ephemeral,
        }
    }

    /// Hash to use for derived operations: the stored one, else one
    /// recovered from the URL.
    pub fn effective_hash(&self) -> Option<String> {
        self.content_hash
            .clone()
            .or_else(|| extract_content_hash(&self.url))
    }
}

/// Whether `url` points at a short-lived attachment.
pub fn is_ephemeral_url(url: &str) -> bool {
    url.contains(EPHEMERAL_MARKER)
}

/// Extract the UUID-shaped content hash from the last path segment of `url`.
///
/// The query string is ignored.
pub fn extract_content_hash(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    UUID_RE
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Find the first UUID-shaped token anywhere in `text`.
pub fn find_uuid(text: &str) -> Option<String> {
    UUID_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

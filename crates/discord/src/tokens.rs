//! Candidate upscale tokens.
//!
//! The custom id that requests an upscale encodes the operation, the
//! variant index and the grid's content hash. Its exact grammar is not
//! documented and has shifted between bot revisions, so the relay keeps
//! an ordered list of templates and tries each in turn.

use std::fmt;
use std::str::FromStr;

use relay_core::variant::VariantIndex;

const INDEX_PLACEHOLDER: &str = "{index}";
const HASH_PLACEHOLDER: &str = "{hash}";

/// Default template order, most likely first.
pub const DEFAULT_UPSCALE_TEMPLATES: &[&str] = &[
    "MJ::JOB::upsample::{index}::{hash}",
    "MJ::JOB::upsample::{index}::{hash}::SOLO",
    "MJ::JOB::upsample_v6_2x_subtle::{index}::{hash}::SOLO",
    "MJ::JOB::upsample_v5_2x::{index}::{hash}::SOLO",
];

/// A custom-id template with `{index}` and `{hash}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTemplate(String);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenTemplateError {
    #[error("Token template is empty")]
    Empty,
    #[error("Token template '{0}' must contain both {{index}} and {{hash}}")]
    MissingPlaceholder(String),
}

impl TokenTemplate {
    /// Render the token for one variant of a grid.
    pub fn render(&self, index: VariantIndex, hash: &str) -> String {
        self.0
            .replace(INDEX_PLACEHOLDER, &index.get().to_string())
            .replace(HASH_PLACEHOLDER, hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TokenTemplate {
    type Err = TokenTemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TokenTemplateError::Empty);
        }
        if !s.contains(INDEX_PLACEHOLDER) || !s.contains(HASH_PLACEHOLDER) {
            return Err(TokenTemplateError::MissingPlaceholder(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for TokenTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The built-in template list.
pub fn default_upscale_templates() -> Vec<TokenTemplate> {
    DEFAULT_UPSCALE_TEMPLATES
        .iter()
        .map(|t| TokenTemplate(t.to_string()))
        .collect()
}

/// Parse a `|`-separated template list, skipping blank entries.
pub fn parse_template_list(raw: &str) -> Result<Vec<TokenTemplate>, TokenTemplateError> {
    let templates = raw
        .split('|')
        .filter(|t| !t.trim().is_empty())
        .map(TokenTemplate::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if templates.is_empty() {
        return Err(TokenTemplateError::Empty);
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn renders_every_default() {
        let idx = VariantIndex::try_from(3u8).unwrap();
        let rendered: Vec<String> = default_upscale_templates()
            .iter()
            .map(|t| t.render(idx, "h"))
            .collect();
        assert_eq!(rendered[0], "MJ::JOB::upsample::3::h");
        assert_eq!(rendered[1], "MJ::JOB::upsample::3::h::SOLO");
        assert_eq!(rendered.len(), DEFAULT_UPSCALE_TEMPLATES.len());
    }

    #[test]
    fn parses_pipe_separated_list() {
        let list = parse_template_list("A::{index}::{hash} | B::{hash}::{index}|").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].as_str(), "B::{hash}::{index}");
    }

    #[test]
    fn rejects_template_without_placeholders() {
        assert_matches!(
            parse_template_list("MJ::JOB::upsample::1"),
            Err(TokenTemplateError::MissingPlaceholder(_))
        );
        assert_matches!(parse_template_list(" | "), Err(TokenTemplateError::Empty));
    }
}

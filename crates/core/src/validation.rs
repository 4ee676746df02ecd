//! Request validation helpers.

use crate::error::CoreError;

/// Longest prompt accepted by the backend command.
pub const MAX_PROMPT_LEN: usize = 4000;

/// Validate a prompt and return it trimmed.
pub fn validate_prompt(prompt: &str) -> Result<String, CoreError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("prompt is required".into()));
    }
    if trimmed.chars().count() > MAX_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "prompt must be at most {MAX_PROMPT_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

use serde::Serialize;

/// Domain-level error shared by every layer of the relay.
///
/// Each variant maps to a stable machine-readable [`kind`](Self::kind) and
/// an optional remediation [`hint`](Self::hint), so callers always receive
/// a structured [`ErrorBody`].
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Monthly quota exceeded: {used}/{limit} generations used")]
    QuotaExceeded { limit: i32, used: i32 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Message is {age_secs}s old, past the upscale window")]
    EligibilityExpired { age_secs: i64 },

    #[error("Backend submission failed: {0}")]
    BackendSubmission(String),

    #[error("No candidate interaction was accepted: {0}")]
    ProtocolMismatch(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable error payload returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl CoreError {
    /// Stable error code for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::Unauthorized(_) => "UNAUTHORIZED",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::EligibilityExpired { .. } => "ELIGIBILITY_EXPIRED",
            CoreError::BackendSubmission(_) => "BACKEND_SUBMISSION_ERROR",
            CoreError::ProtocolMismatch(_) => "PROTOCOL_MISMATCH",
            CoreError::Timeout(_) => "TIMEOUT",
            CoreError::Store(_) => "STORE_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Remediation hint shown alongside the message, when one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CoreError::Unauthorized(_) => Some("Send a valid key in the X-API-Key header"),
            CoreError::QuotaExceeded { .. } => {
                Some("Wait for the monthly reset or ask an administrator to raise the limit")
            }
            CoreError::NotFound { .. } => {
                Some("Use the task id returned by generate, or check its status first")
            }
            CoreError::EligibilityExpired { .. } => {
                Some("Upscales must be requested within 15 minutes of generation; generate again")
            }
            CoreError::ProtocolMismatch(_) => Some(
                "The backend interaction format may have changed; \
                 review the upscale token templates",
            ),
            _ => None,
        }
    }

    /// Build the structured payload for this error.
    ///
    /// Internal and store failures are logged and replaced with a generic
    /// message so implementation details never reach callers.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            CoreError::Internal(msg) | CoreError::Store(msg) => {
                tracing::error!(error = %msg, kind = self.kind(), "Internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        ErrorBody {
            kind: self.kind(),
            message,
            hint: self.hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_body_carries_kind_and_hint() {
        let body = CoreError::QuotaExceeded { limit: 100, used: 100 }.to_body();
        assert_eq!(body.kind, "QUOTA_EXCEEDED");
        assert!(body.message.contains("100/100"));
        assert!(body.hint.is_some());
    }

    #[test]
    fn internal_message_is_sanitized() {
        let body = CoreError::Store("connection reset by peer".into()).to_body();
        assert_eq!(body.message, "An internal error occurred");
        assert_eq!(body.kind, "STORE_ERROR");
    }

    #[test]
    fn validation_body_serializes_without_hint() {
        let json = serde_json::to_value(CoreError::Validation("bad".into()).to_body()).unwrap();
        assert_eq!(json["kind"], "VALIDATION_ERROR");
        assert!(json.get("hint").is_none());
    }
}

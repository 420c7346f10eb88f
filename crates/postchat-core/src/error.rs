use thiserror::Error;

use crate::types::PostId;

/// Input rejected before any work is done. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("question cannot be empty")]
    EmptyQuestion,

    #[error("exchange cannot be nil")]
    MissingExchange,

    #[error("exchange must have a user id and a post id")]
    MissingIdentity,

    #[error("exchange must have a prompt")]
    EmptyPrompt,

    #[error("exchange must have a response")]
    EmptyResponse,

    #[error("message cannot be empty")]
    EmptyMessage,

    #[error("post has no text to embed")]
    NoContent,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown message type: {0}")]
    UnknownIntent(String),

    #[error("Not available: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// The primary mutation committed but a dependent cleanup step did not.
    #[error("Partial failure on post {post_id}: {reason}")]
    PartialFailure { post_id: PostId, reason: String },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Whether the embedding worker should back off and try the job again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(Error::Upstream("timeout".into()).is_retryable());
        assert!(Error::Storage("busy".into()).is_retryable());
        assert!(!Error::Validation(ValidationError::NoContent).is_retryable());
        assert!(!Error::NotFound("post".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn validation_errors_are_distinct() {
        let all = [
            ValidationError::MissingExchange,
            ValidationError::MissingIdentity,
            ValidationError::EmptyPrompt,
            ValidationError::EmptyResponse,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
                assert_ne!(a.to_string(), b.to_string());
            }
        }
    }
}

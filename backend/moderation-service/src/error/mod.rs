use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Refusing to use state path {path}: {reason}")]
    UnsafeStatePath { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModerationError {
    /// Errors caused by the caller's request rather than by the agent.
    /// These are surfaced as-is and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ModerationError::UnsupportedContentType(_)
                | ModerationError::InvalidInput(_)
                | ModerationError::InvalidFeedback(_)
        )
    }
}

impl From<envy::Error> for ModerationError {
    fn from(err: envy::Error) -> Self {
        ModerationError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ModerationError>;

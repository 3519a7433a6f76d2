use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("provider {0} unavailable (circuit open)")]
    CircuitOpen(String),

    #[error("request to provider {0} timed out")]
    Timeout(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("provider {0} error: {1}")]
    Provider(String, String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

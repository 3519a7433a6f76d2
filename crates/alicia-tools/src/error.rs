use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("arguments for {0} did not match schema: {1}")]
    SchemaMismatch(String, String),

    #[error("tool {0} timed out after {1:?}")]
    Timeout(String, std::time::Duration),

    #[error("tool {0} was cancelled")]
    Cancelled(String),

    #[error("tool {0} failed: {1}")]
    Execution(String, String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("embedding failed after retries: {0}")]
    EmbedFailed(String),

    #[error("store error: {0}")]
    Store(#[from] alicia_store::StoreError),

    #[error("filter error: {0}")]
    Filter(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

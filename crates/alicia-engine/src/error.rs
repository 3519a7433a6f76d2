use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] alicia_store::StoreError),

    #[error(transparent)]
    Memory(#[from] alicia_memory::MemoryError),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("llm stream failed: {0}")]
    Llm(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

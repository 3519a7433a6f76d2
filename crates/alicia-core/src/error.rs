use thiserror::Error;

/// Crate-spanning error type. `.code()` maps each variant onto the numeric
/// ranges reserved on the wire: 100-199 format/protocol, 200-299
/// conversation, 300-399 tool, 500-599 server.
#[derive(Debug, Error)]
pub enum AliciaError {
    #[error("malformed envelope: {0}")]
    MalformedData(String),

    #[error("unknown envelope type: {0}")]
    UnknownType(u16),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool timed out: {0}")]
    ToolTimeout(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("turn queue overflow for conversation {0}")]
    QueueOverflow(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AliciaError {
    /// Numeric error code per §6's reserved ranges / §7's error kinds.
    pub fn code(&self) -> i32 {
        match self {
            Self::MalformedData(_) => 101,
            Self::UnknownType(_) => 102,
            Self::ConversationNotFound(_) => 201,
            Self::InvalidState(_) => 202,
            Self::ToolNotFound(_) => 301,
            Self::ToolTimeout(_) => 304,
            Self::ProviderUnavailable(_) => 503,
            Self::QueueOverflow(_) => 504,
            Self::Database(_) | Self::Io(_) | Self::Internal(_) => 500,
            Self::Serialization(_) => 101,
            Self::Config(_) => 500,
        }
    }

    /// Severity per the §6 `ErrorMessage.severity` enum (0..3).
    pub fn severity(&self) -> u8 {
        match self {
            Self::QueueOverflow(_) | Self::ToolTimeout(_) => 1,
            Self::ProviderUnavailable(_) => 2,
            Self::Database(_) | Self::Io(_) | Self::Internal(_) => 3,
            _ => 1,
        }
    }

    /// Whether the condition is recoverable without aborting the turn, per §7.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound(_) | Self::ToolTimeout(_) | Self::QueueOverflow(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AliciaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_reserved_ranges() {
        assert_eq!(AliciaError::MalformedData("x".into()).code(), 101);
        assert_eq!(AliciaError::UnknownType(9999).code(), 102);
        assert_eq!(AliciaError::ConversationNotFound("c1".into()).code(), 201);
        assert_eq!(AliciaError::InvalidState("bad".into()).code(), 202);
        assert_eq!(AliciaError::ToolNotFound("x".into()).code(), 301);
        assert_eq!(AliciaError::ToolTimeout("x".into()).code(), 304);
        assert_eq!(AliciaError::ProviderUnavailable("x".into()).code(), 503);
        assert_eq!(AliciaError::QueueOverflow("c1".into()).code(), 504);
    }
}

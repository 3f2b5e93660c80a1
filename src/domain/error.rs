use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid repository: {0}")]
    InvalidRepo(String),

    #[error("Repository not indexed: {0}")]
    NotIndexed(String),

    #[error("Repository busy: {0}")]
    Busy(String),

    #[error("Index dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn invalid_repo(msg: impl Into<String>) -> Self {
        Self::InvalidRepo(msg.into())
    }

    pub fn not_indexed(msg: impl Into<String>) -> Self {
        Self::NotIndexed(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::LlmError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code used in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRepo(_) => "INVALID_REPO",
            Self::NotIndexed(_) => "NOT_INDEXED",
            Self::Busy(_) => "BUSY",
            Self::DimensionMismatch(_) => "INDEX_DIMENSION_MISMATCH",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            _ => "INTERNAL",
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRepo(_) | Self::NotIndexed(_) | Self::Busy(_) | Self::InvalidRequest(_)
        )
    }
}

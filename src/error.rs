//! Error handling for the dataset collection API
//!
//! Every failure surfaced by the codec, the stores, the service and the
//! contents lister is a [`CollectionError`]. The HTTP layer maps variants to
//! status codes via [`CollectionError::http_status`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectionError>;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing required parameter: {0}")]
    RequestParameterMissing(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CollectionError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidIdentifier(_) => 400,
            Self::NotFound(_) => 404,
            Self::RequestParameterMissing(_) => 400,
            Self::InvalidInput(_) => 400,
            Self::NotImplemented(_) => 501,
            Self::StorageUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Stable numeric code returned to clients alongside the message.
    pub fn err_code(&self) -> u32 {
        match self {
            Self::InvalidIdentifier(_) => 400_009,
            Self::NotFound(_) => 404_001,
            Self::RequestParameterMissing(_) => 400_003,
            Self::InvalidInput(_) => 400_008,
            Self::NotImplemented(_) => 501_001,
            Self::StorageUnavailable(_) => 503_001,
            Self::Internal(_) => 500_001,
        }
    }

    /// True for failures the caller's transport may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<serde_json::Error> for CollectionError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidInput(error.to_string())
    }
}

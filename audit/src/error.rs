use meridian_types::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("audit storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("audit encoding error: {0}")]
    Encoding(String),
}

impl AuditError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            Self::Encoding(_) => ErrorCode::Internal,
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(e: std::io::Error) -> Self {
        Self::StorageUnavailable(e.to_string())
    }
}

use thiserror::Error;

/// Result type alias used across the service layer
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Domain errors surfaced inside the response envelope.
///
/// Each variant maps to a stable `code()` string that clients match on.
/// Partition-level variants (`PartitionMissing`, `PartitionCorrupt`) are
/// internal to the storage layer; by the time they reach a client they have
/// been translated to `DATA_ERROR` (see `client_code`).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ProviderUnavailable(String),

    #[error("{0}")]
    ScanTimeout(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    QueryTooLarge(String),

    #[error("{0}")]
    DataError(String),

    #[error("{0}")]
    PartitionMissing(String),

    #[error("{0}")]
    PartitionCorrupt(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn provider_unavailable(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    pub fn scan_timeout(msg: impl Into<String>) -> Self {
        Self::ScanTimeout(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn query_too_large(msg: impl Into<String>) -> Self {
        Self::QueryTooLarge(msg.into())
    }

    pub fn data_error(msg: impl Into<String>) -> Self {
        Self::DataError(msg.into())
    }

    pub fn partition_missing(msg: impl Into<String>) -> Self {
        Self::PartitionMissing(msg.into())
    }

    pub fn partition_corrupt(msg: impl Into<String>) -> Self {
        Self::PartitionCorrupt(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable error kind identifier
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::ScanTimeout(_) => "SCAN_TIMEOUT",
            Self::Timeout(_) => "TIMEOUT",
            Self::QueryTooLarge(_) => "QUERY_TOO_LARGE",
            Self::DataError(_) => "DATA_ERROR",
            Self::PartitionMissing(_) => "PARTITION_MISSING",
            Self::PartitionCorrupt(_) => "PARTITION_CORRUPT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Error kind as exposed to clients in the envelope.
    ///
    /// Partition-level kinds never leave the storage layer unmapped.
    pub fn client_code(&self) -> &'static str {
        match self {
            Self::PartitionMissing(_) | Self::PartitionCorrupt(_) => "DATA_ERROR",
            other => other.code(),
        }
    }

}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                Self::ScanTimeout("connection checkout timed out".to_string())
            },
            sqlx::Error::Database(e) => Self::PartitionCorrupt(format!("database error: {}", e)),
            sqlx::Error::Io(e) => Self::PartitionCorrupt(format!("io error: {}", e)),
            other => Self::Internal(format!("storage error: {}", other)),
        }
    }
}

//! Errors surfaced by the stock service and its adapters.

use thiserror::Error;

use larder_core::DomainError;

pub type StockResult<T> = Result<T, StockError>;

/// Domain failures pass through unchanged; anything the persistence layer
/// reports (IO, constraint violations, poisoned locks) becomes `Storage`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl StockError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Stable machine-readable kind for callers to translate.
    pub fn kind(&self) -> &'static str {
        match self {
            StockError::Domain(e) => e.kind(),
            StockError::Storage(_) => "storage",
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            StockError::Domain(e) => Some(e),
            StockError::Storage(_) => None,
        }
    }
}

impl From<sqlx::Error> for StockError {
    fn from(value: sqlx::Error) -> Self {
        StockError::Storage(value.to_string())
    }
}

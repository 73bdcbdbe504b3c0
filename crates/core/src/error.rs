//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only: every variant maps to one
/// distinguishable failure kind for callers. Storage concerns live in
/// `larder-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty name).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An externally supplied identifier could not be coerced.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced ingredient or batch does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A quantity was zero, negative, or otherwise unusable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A reduction asked for more than the batch still holds.
    #[error("insufficient stock (requested {requested}, remaining {remaining})")]
    InsufficientStock { requested: i64, remaining: i64 },

    /// No acting-user identity accompanied a write.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Nothing in a damage submission was eligible for application.
    #[error("empty submission")]
    EmptySubmission,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn insufficient(requested: i64, remaining: i64) -> Self {
        Self::InsufficientStock {
            requested,
            remaining,
        }
    }

    /// Stable machine-readable kind, one per variant.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::InvalidAmount(_) => "invalid_amount",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::Unauthenticated => "unauthenticated",
            DomainError::EmptySubmission => "empty_submission",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct_per_variant() {
        let all = [
            DomainError::validation("x"),
            DomainError::invalid_id("x"),
            DomainError::not_found("x"),
            DomainError::invalid_amount("x"),
            DomainError::insufficient(2, 1),
            DomainError::Unauthenticated,
            DomainError::EmptySubmission,
        ];
        let mut kinds: Vec<_> = all.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), all.len());
    }

    #[test]
    fn insufficient_stock_message_carries_both_quantities() {
        let msg = DomainError::insufficient(12, 10).to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("10"));
    }
}

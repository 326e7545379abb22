//! # DomainError
//!
//! Centralized error type for the ranking engine.
//! Adapters map their backend failures onto these variants so services
//! never see driver-specific errors.

use thiserror::Error;

/// The primary error type for all domain and service operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Rejected input (e.g., unknown vote type, document without `posted_at`).
    /// Raised before any mutation is attempted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (e.g., document, vote)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// A compare-and-swap lost against a concurrent writer on the same document.
    #[error("concurrent update conflict on document {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        Self::NotFound(kind.to_string(), id.to_string())
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// A specialized Result type for ranking logic.
pub type DomainResult<T> = std::result::Result<T, DomainError>;

//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Target name not recognised
    #[error("Unknown target: {name}. Use 'jupyter' or 'zasper'")]
    UnknownTarget { name: String },

    /// Channel URL template without exactly two substitution slots
    #[error("URL template {template} has {slots} '%s' slots (expected 2)")]
    InvalidUrlTemplate { template: String, slots: usize },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

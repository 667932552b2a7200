//! # AppError
//!
//! Centralized error handling for the study-forum ecosystem.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all sf-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Thread, Reply, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// A value outside its allowed set (e.g., vote direction, category)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Validation failure (e.g., title too short, too many tags)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The caller could not be identified
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is known but not allowed to perform the action
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists (e.g., duplicate email, AI job already running)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The generative text provider failed or timed out
    #[error("AI provider failure: {0}")]
    ProviderFailure(String),

    /// The caller sent too many requests in the current window
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Concurrent writers collided on the same rows; safe to retry
    #[error("storage conflict: {0}")]
    StorageConflict(String),

    /// Infrastructure failure (e.g., DB down, broken row)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        AppError::NotFound(kind.to_string(), id.to_string())
    }

    /// True for errors that a transactional retry may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StorageConflict(_))
    }
}

/// A specialized Result type for study-forum logic.
pub type Result<T> = std::result::Result<T, AppError>;

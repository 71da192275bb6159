//! Unified error types for fusebox.

use thiserror::Error;

/// Errors surfaced by window and breaker construction.
///
/// A denied admission is not an error: `is_allowed` returning `false` is
/// the normal fast-fail signal.
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Configuration validation failed (invalid values).
    #[error("config validation error for {field}: {message}")]
    Config {
        /// Name of the offending option field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

/// Result type alias for fusebox operations.
pub type Result<T> = std::result::Result<T, Error>;

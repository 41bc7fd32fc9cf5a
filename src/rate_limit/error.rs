//! Rate Limit Error Types
//!
//! Admission decisions are never errors; a denied call is an ordinary
//! `false`. These errors cover action-table lookups and configuration.

/// Error types for rate limit operations
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RateLimitError {
    /// Action name not present in the configured action table
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Action entry with a zero limit or zero window
    #[error("Invalid limit for action '{action}': {reason}")]
    InvalidActionLimit { action: String, reason: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for rate limit operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

//! Error types shared across the BGG workspace

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, BggError>;

/// Errors raised by the shared domain types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BggError {
    #[error("Invalid identifier '{0}': must be non-empty and contain no commas or whitespace")]
    InvalidIdentifier(String),

    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),
}

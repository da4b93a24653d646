//! Domain error types

use thiserror::Error;

/// Errors that can occur while building domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// A string did not name a known direction
    #[error("Invalid direction: {0} (expected remote, host or neither)")]
    InvalidDirection(String),
}

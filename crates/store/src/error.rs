//! Error types for the store crate.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with that id.
    #[error("integration '{id}' not found")]
    NotFound { id: String },

    /// A record with that id already exists.
    #[error("integration '{id}' already exists")]
    AlreadyExists { id: String },

    /// Subscription channel closed.
    #[error("subscription '{name}' closed")]
    ChannelClosed { name: String },

    /// Backend failure.
    #[error("store operation '{operation}' failed: {reason}")]
    OperationFailed { operation: String, reason: String },
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an already exists error.
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Create a channel closed error.
    pub fn channel_closed(name: impl Into<String>) -> Self {
        Self::ChannelClosed { name: name.into() }
    }

    /// Create an operation failed error.
    pub fn operation_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a not found error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

//! Error types for the model crate.

use thiserror::Error;

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Model error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// An active revision was about to be changed in place.
    #[error("revision {version} is active and can no longer be changed")]
    ImmutableRevision { version: u32 },

    /// A revision with the same version already exists.
    #[error("revision {version} already exists")]
    DuplicateRevision { version: u32 },

    /// Unknown state name.
    #[error("unknown integration state '{0}'")]
    UnknownState(String),

    /// Unknown resource kind.
    #[error("unknown kind '{0}'")]
    UnknownKind(String),

    /// Change event could not be encoded or decoded.
    #[error("invalid change event: {reason}")]
    InvalidEvent { reason: String },
}

impl ModelError {
    /// Create an immutable revision error.
    pub const fn immutable_revision(version: u32) -> Self {
        Self::ImmutableRevision { version }
    }

    /// Create a duplicate revision error.
    pub const fn duplicate_revision(version: u32) -> Self {
        Self::DuplicateRevision { version }
    }

    /// Create an invalid event error.
    pub fn invalid_event(reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::immutable_revision(3);
        assert!(err.to_string().contains('3'));

        let err = ModelError::invalid_event("missing id");
        assert!(err.to_string().contains("missing id"));
    }
}

//! Error types for the reconciler crate.

use integrator_model::{IntegrationState, ModelError};
use integrator_store::StoreError;
use thiserror::Error;

use crate::backend::{ProvisioningError, SourceControlError};

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Two handlers claimed the same desired state.
    #[error("state '{state}' is already handled by '{existing}', refusing '{duplicate}'")]
    DuplicateTrigger {
        state: IntegrationState,
        existing: String,
        duplicate: String,
    },

    /// A handler declared no trigger states.
    #[error("handler '{handler}' declares no trigger states")]
    NoTriggers { handler: String },

    /// Teardown was asked for a revision that was never versioned.
    #[error("integration '{integration}' has no versioned revision to act on")]
    MissingVersion { integration: String },

    /// Handler failed.
    #[error("handler '{handler}' failed: {reason}")]
    HandlerFailed { handler: String, reason: String },

    /// Provisioning backend failure.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// Source-control backend failure.
    #[error(transparent)]
    SourceControl(#[from] SourceControlError),

    /// Resource store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Model invariant violated.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Project generation failed.
    #[error("project generation failed: {reason}")]
    ProjectGeneration { reason: String },

    /// Controller is not running.
    #[error("controller stopped")]
    ControllerStopped,

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration file could not be read.
    #[error("failed to read config '{path}': {reason}")]
    ConfigRead { path: String, reason: String },
}

impl Error {
    /// Create a handler failed error.
    pub fn handler_failed(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HandlerFailed {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing version error.
    pub fn missing_version(integration: impl Into<String>) -> Self {
        Self::MissingVersion {
            integration: integration.into(),
        }
    }

    /// Create a project generation error.
    pub fn project_generation(reason: impl Into<String>) -> Self {
        Self::ProjectGeneration {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a config read error.
    pub fn config_read(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigRead {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::handler_failed("activate", "timeout");
        assert!(err.to_string().contains("activate"));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_duplicate_trigger_names_both_handlers() {
        let err = Error::DuplicateTrigger {
            state: IntegrationState::Active,
            existing: "activate".to_string(),
            duplicate: "other".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("Active"));
        assert!(text.contains("activate"));
        assert!(text.contains("other"));
    }

    #[test]
    fn test_backend_errors_convert() {
        let err: Error = ProvisioningError::not_found("orders").into();
        assert!(err.to_string().contains("orders"));
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// Provisioning backend failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    /// The deployment does not exist.
    #[error("deployment '{name}' not found")]
    NotFound { name: String },

    /// Any other failure.
    #[error("provisioning '{operation}' failed: {reason}")]
    Failed { operation: String, reason: String },
}

impl ProvisioningError {
    /// Create a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a generic failure.
    pub fn failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a not found error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// What to deploy, and at which scale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeploymentDescriptor {
    /// Sanitized resource name.
    pub name: String,
    /// Revision number the deployment runs.
    pub revision: u32,
    /// Desired replica count.
    pub replicas: u32,
    /// Auth token for backend calls.
    pub token: Option<String>,
    /// Source repository the build pipeline pulls from.
    pub git_repository: Option<String>,
    /// Secret guarding the build webhook.
    pub webhook_secret: Option<String>,
    /// Contents of the side-channel secret.
    pub application_properties: BTreeMap<String, String>,
}

impl DeploymentDescriptor {
    /// Create a descriptor for `name` at `revision`.
    pub fn new(name: impl Into<String>, revision: u32) -> Self {
        Self {
            name: name.into(),
            revision,
            replicas: 1,
            ..Self::default()
        }
    }

    /// Set the replica count.
    #[must_use]
    pub const fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the token.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Set the source repository.
    #[must_use]
    pub fn with_git_repository(mut self, url: impl Into<String>) -> Self {
        self.git_repository = Some(url.into());
        self
    }

    /// Set the webhook secret.
    #[must_use]
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    /// Set the application properties.
    #[must_use]
    pub fn with_application_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.application_properties = properties;
        self
    }
}

/// Turns deployment descriptors into running infrastructure.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Create or update build pipeline, runtime deployment and secret.
    async fn create(&self, deployment: &DeploymentDescriptor) -> Result<(), ProvisioningError>;

    /// Scale the deployment to `deployment.replicas`.
    async fn scale(&self, deployment: &DeploymentDescriptor) -> Result<(), ProvisioningError>;

    /// Check whether the deployment runs `deployment.replicas` ready replicas.
    async fn is_scaled(&self, deployment: &DeploymentDescriptor) -> Result<bool, ProvisioningError>;

    /// URL the source-control backend should call when the project changes.
    async fn webhook_url(
        &self,
        deployment: &DeploymentDescriptor,
        secret: &str,
    ) -> Result<String, ProvisioningError>;
}

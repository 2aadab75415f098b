//! Scales an integration's deployment to zero.

use std::sync::Arc;

use async_trait::async_trait;
use integrator_model::{Integration, IntegrationState, Revision, StatusUpdate};
use tracing::{debug, info};

use super::StatusHandler;
use super::activate::resource_name;
use crate::backend::{DeploymentDescriptor, ProvisioningBackend};
use crate::error::{Error, Result};

const TRIGGERS: [IntegrationState; 2] = [IntegrationState::Inactive, IntegrationState::Draft];

/// Tears an integration down to zero replicas.
///
/// A deployment the backend does not know is already stopped.
pub struct DeactivateHandler {
    provisioning: Arc<dyn ProvisioningBackend>,
}

impl DeactivateHandler {
    /// Create a handler scaling through `provisioning`.
    pub fn new(provisioning: Arc<dyn ProvisioningBackend>) -> Self {
        Self { provisioning }
    }
}

#[async_trait]
impl StatusHandler for DeactivateHandler {
    fn name(&self) -> &str {
        "deactivate"
    }

    fn trigger_states(&self) -> &[IntegrationState] {
        &TRIGGERS
    }

    /// The deployed revision, falling back to the newest published one.
    fn select_revision(&self, integration: &Integration) -> Revision {
        integration
            .active_revision()
            .or_else(|| integration.revisions.last())
            .cloned()
            .unwrap_or_else(|| integration.target_revision())
    }

    async fn execute(
        &self,
        integration: &Integration,
        revision: &Revision,
    ) -> Result<Option<StatusUpdate>> {
        let version = revision
            .version
            .ok_or_else(|| Error::missing_version(integration.id.as_str()))?;
        let descriptor = DeploymentDescriptor::new(resource_name(integration), version)
            .with_replicas(0)
            .with_token(integration.token.as_ref().map(|t| t.value.clone()));

        match self.provisioning.scale(&descriptor).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(integration_id = %integration.id, version, "No deployment found, already stopped");
                return Ok(Some(StatusUpdate::new(version, IntegrationState::Undeployed)));
            }
            Err(e) => return Err(e.into()),
        }

        let state = if self.provisioning.is_scaled(&descriptor).await? {
            info!(integration_id = %integration.id, version, "Integration undeployed");
            IntegrationState::Undeployed
        } else {
            debug!(integration_id = %integration.id, version, "Waiting for replicas to stop");
            IntegrationState::Pending
        };
        Ok(Some(StatusUpdate::new(version, state)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use integrator_model::IntegrationId;

    use super::*;
    use crate::backend::{InMemoryProvisioner, ProvisioningError, ProvisioningOp};

    fn integration() -> Integration {
        let mut integration = Integration::with_id(IntegrationId::new("y"), "Billing")
            .with_desired_state(IntegrationState::Inactive)
            .with_current_state(IntegrationState::Active);
        integration.promote_revision(Revision::new().with_version(2)).unwrap();
        integration
    }

    #[tokio::test]
    async fn test_missing_deployment_counts_as_undeployed() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let handler = DeactivateHandler::new(provisioner.clone());
        let integration = integration();
        let revision = handler.select_revision(&integration);

        let update = handler.execute(&integration, &revision).await.unwrap().unwrap();

        assert_eq!(update.state, IntegrationState::Undeployed);
        assert_eq!(update.version, 2);
        assert_eq!(provisioner.calls(ProvisioningOp::IsScaled).await, 0);
    }

    #[tokio::test]
    async fn test_scaled_down_deployment_is_undeployed() {
        let provisioner = Arc::new(InMemoryProvisioner::new().with_auto_ready(true));
        provisioner
            .create(&DeploymentDescriptor::new("billing", 2))
            .await
            .unwrap();
        let handler = DeactivateHandler::new(provisioner.clone());
        let integration = integration();

        let update = handler
            .execute(&integration, &handler.select_revision(&integration))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(update.state, IntegrationState::Undeployed);
        assert_eq!(provisioner.deployment("billing").await.unwrap().replicas, 0);
    }

    #[tokio::test]
    async fn test_other_scale_errors_propagate() {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        provisioner
            .fail_next(ProvisioningOp::Scale, ProvisioningError::failed("scale", "forbidden"))
            .await;
        let handler = DeactivateHandler::new(provisioner);
        let integration = integration();

        let result = handler
            .execute(&integration, &handler.select_revision(&integration))
            .await;

        assert!(matches!(result, Err(Error::Provisioning(_))));
    }

    #[tokio::test]
    async fn test_unversioned_revision_is_rejected() {
        let handler = DeactivateHandler::new(Arc::new(InMemoryProvisioner::new()));
        let integration = Integration::with_id(IntegrationId::new("z"), "Fresh")
            .with_desired_state(IntegrationState::Draft);

        let result = handler
            .execute(&integration, &handler.select_revision(&integration))
            .await;

        assert!(matches!(result, Err(Error::MissingVersion { .. })));
    }
}

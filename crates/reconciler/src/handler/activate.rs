//! Drives an integration to a running deployment.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use integrator_model::{Integration, IntegrationState, Revision, StatusUpdate};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::StatusHandler;
use super::steps::{PROVISIONING_SETUP, SOURCE_REPO_SETUP, StepTracker};
use crate::backend::{DeploymentDescriptor, ProvisioningBackend, SourceControlBackend};
use crate::error::Result;
use crate::project::{DefaultProjectGenerator, ProjectGenerator, sanitize_name};

const TRIGGERS: [IntegrationState; 1] = [IntegrationState::Active];

const COMMIT_MESSAGE: &str = "Updated";

/// Provisions an integration and waits for it to become ready.
///
/// Runs source-repository setup, provisioning setup and a readiness check.
/// Setup steps already recorded on the integration are skipped; any failure
/// yields `Pending` with the steps completed so far.
pub struct ActivateHandler {
    provisioning: Arc<dyn ProvisioningBackend>,
    source_control: Arc<dyn SourceControlBackend>,
    generator: Arc<dyn ProjectGenerator>,
}

impl ActivateHandler {
    /// Create a handler using the default project generator.
    pub fn new(
        provisioning: Arc<dyn ProvisioningBackend>,
        source_control: Arc<dyn SourceControlBackend>,
    ) -> Self {
        Self {
            provisioning,
            source_control,
            generator: Arc::new(DefaultProjectGenerator),
        }
    }

    /// Replace the project generator.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn ProjectGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Run the setup steps and the readiness check.
    ///
    /// Completed steps land in `tracker` and the clone URL in `git_repo` even
    /// when a later step fails.
    async fn converge(
        &self,
        integration: &Integration,
        revision: &Revision,
        descriptor: &mut DeploymentDescriptor,
        tracker: &mut StepTracker,
        git_repo: &mut Option<String>,
    ) -> Result<bool> {
        let repo = descriptor.name.clone();

        if tracker.is_done(SOURCE_REPO_SETUP) {
            debug!(integration_id = %integration.id, step = SOURCE_REPO_SETUP, "Step already done");
        } else {
            let files = self.generator.generate(integration, revision)?;
            let secret = descriptor.webhook_secret.clone().unwrap_or_default();
            let webhook = self.provisioning.webhook_url(descriptor, &secret).await?;
            let clone_url = self
                .source_control
                .create_or_update_project_files(&repo, COMMIT_MESSAGE, &files, &webhook)
                .await?;
            info!(integration_id = %integration.id, repo = %repo, "Project pushed");
            *git_repo = Some(clone_url);
            tracker.mark_done(SOURCE_REPO_SETUP);
        }

        if tracker.is_done(PROVISIONING_SETUP) {
            debug!(integration_id = %integration.id, step = PROVISIONING_SETUP, "Step already done");
        } else {
            let clone_url = match git_repo.clone() {
                Some(url) => url,
                None => self.source_control.clone_url(&repo).await?,
            };
            descriptor.git_repository = Some(clone_url);
            self.provisioning.create(descriptor).await?;
            info!(
                integration_id = %integration.id,
                revision = descriptor.revision,
                "Provisioning resources created"
            );
            tracker.mark_done(PROVISIONING_SETUP);
        }

        Ok(self.provisioning.is_scaled(descriptor).await?)
    }
}

/// Connector properties of the revision's endpoint steps, keyed
/// `{connector}.{property}`.
pub(crate) fn application_properties(revision: &Revision) -> BTreeMap<String, String> {
    revision
        .steps()
        .iter()
        .filter(|step| step.is_endpoint())
        .filter_map(|step| step.connector.as_ref().map(|c| (c, &step.properties)))
        .flat_map(|(connector, properties)| {
            properties
                .iter()
                .map(move |(key, value)| (format!("{connector}.{key}"), value.clone()))
        })
        .collect()
}

/// Repository and deployment name of an integration.
pub(crate) fn resource_name(integration: &Integration) -> String {
    let name = sanitize_name(&integration.name);
    if name.is_empty() {
        sanitize_name(integration.id.as_str())
    } else {
        name
    }
}

#[async_trait]
impl StatusHandler for ActivateHandler {
    fn name(&self) -> &str {
        "activate"
    }

    fn trigger_states(&self) -> &[IntegrationState] {
        &TRIGGERS
    }

    async fn execute(
        &self,
        integration: &Integration,
        revision: &Revision,
    ) -> Result<Option<StatusUpdate>> {
        let version = revision
            .version
            .unwrap_or_else(|| integration.next_revision_version());
        let unchanged = || {
            StatusUpdate::new(version, revision.current_state)
                .with_steps(integration.steps_done.clone())
        };

        let Some(token) = &integration.token else {
            warn!(integration_id = %integration.id, "No token present");
            return Ok(Some(unchanged().with_message("No token present")));
        };
        if token.is_expired(Utc::now()) {
            warn!(integration_id = %integration.id, "Token is expired");
            return Ok(Some(unchanged().with_message("Token is expired")));
        }

        let mut descriptor = DeploymentDescriptor::new(resource_name(integration), version)
            .with_token(Some(token.value.clone()))
            .with_webhook_secret(Uuid::new_v4().to_string())
            .with_application_properties(application_properties(revision));
        let mut tracker = StepTracker::from_done(&integration.steps_done);
        let mut git_repo = None;

        let update = match self
            .converge(integration, revision, &mut descriptor, &mut tracker, &mut git_repo)
            .await
        {
            Ok(true) => {
                info!(integration_id = %integration.id, version, "Integration is active");
                let promoted = revision
                    .clone()
                    .with_version(version)
                    .with_target_state(IntegrationState::Active);
                StatusUpdate::new(version, IntegrationState::Active)
                    .with_promoted_revision(promoted)
            }
            Ok(false) => {
                debug!(integration_id = %integration.id, version, "Waiting for deployment to scale");
                StatusUpdate::new(version, IntegrationState::Pending).with_steps(tracker.into_done())
            }
            Err(e) => {
                warn!(
                    integration_id = %integration.id,
                    version,
                    error = %e,
                    "Activation step failed, will retry"
                );
                StatusUpdate::new(version, IntegrationState::Pending)
                    .with_message(e.to_string())
                    .with_steps(tracker.into_done())
                    .as_failure()
            }
        };

        Ok(Some(update.with_git_repo(git_repo)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use integrator_model::{AccessToken, IntegrationId, Step};

    use super::*;
    use crate::backend::{InMemoryProvisioner, InMemorySourceControl, ProvisioningError, ProvisioningOp};

    fn handler() -> (ActivateHandler, Arc<InMemoryProvisioner>, Arc<InMemorySourceControl>) {
        let provisioner = Arc::new(InMemoryProvisioner::new());
        let scm = Arc::new(InMemorySourceControl::new());
        let handler = ActivateHandler::new(provisioner.clone(), scm.clone());
        (handler, provisioner, scm)
    }

    fn integration() -> Integration {
        Integration::with_id(IntegrationId::new("x"), "Orders Sync")
            .with_desired_state(IntegrationState::Active)
            .with_current_state(IntegrationState::Draft)
            .with_token(AccessToken::new("secret-token"))
    }

    #[test]
    fn test_application_properties_come_from_endpoint_steps() {
        let revision = Revision::from_steps(vec![
            Step::endpoint("in", "salesforce").with_property("topic", "orders"),
            Step::endpoint("out", "sql").with_property("table", "orders"),
            Step::new("log", "audit").with_property("level", "info"),
        ]);

        let properties = application_properties(&revision);

        assert_eq!(properties.len(), 2);
        assert_eq!(properties["salesforce.topic"], "orders");
        assert_eq!(properties["sql.table"], "orders");
    }

    #[tokio::test]
    async fn test_missing_token_reports_unchanged_state() {
        let (handler, provisioner, scm) = handler();
        let mut integration = integration();
        integration.token = None;
        let revision = integration.target_revision();

        let update = handler.execute(&integration, &revision).await.unwrap().unwrap();

        assert_eq!(update.state, IntegrationState::Draft);
        assert_eq!(update.message.as_deref(), Some("No token present"));
        assert_eq!(scm.pushes().await, 0);
        assert_eq!(provisioner.calls(ProvisioningOp::Create).await, 0);
    }

    #[tokio::test]
    async fn test_expired_token_reports_unchanged_state() {
        let (handler, _, scm) = handler();
        let integration = integration().with_token(
            AccessToken::new("old").expiring_at(Utc::now() - chrono::Duration::minutes(5)),
        );
        let revision = integration.target_revision();

        let update = handler.execute(&integration, &revision).await.unwrap().unwrap();

        assert_eq!(update.message.as_deref(), Some("Token is expired"));
        assert_eq!(scm.pushes().await, 0);
    }

    #[tokio::test]
    async fn test_first_run_not_ready_is_pending_with_both_steps() {
        let (handler, provisioner, scm) = handler();
        let integration = integration();
        let revision = integration.target_revision();

        let update = handler.execute(&integration, &revision).await.unwrap().unwrap();

        assert_eq!(update.state, IntegrationState::Pending);
        assert!(!update.failed);
        assert_eq!(update.version, 1);
        assert_eq!(
            update.steps_done,
            vec![SOURCE_REPO_SETUP.to_string(), PROVISIONING_SETUP.to_string()]
        );
        assert_eq!(update.git_repo.as_deref(), Some("https://git.local/orders-sync.git"));
        assert_eq!(scm.pushes().await, 1);
        let deployment = provisioner.deployment("orders-sync").await.unwrap();
        assert_eq!(
            deployment.git_repository.as_deref(),
            Some("https://git.local/orders-sync.git")
        );
    }

    #[tokio::test]
    async fn test_done_source_step_is_not_repeated() {
        let (handler, provisioner, scm) = handler();
        let mut integration = integration();
        integration.steps_done = vec![SOURCE_REPO_SETUP.to_string()];
        let revision = integration.target_revision();
        // Repository from an earlier attempt.
        scm.create_or_update_project_files("orders-sync", "Updated", &Default::default(), "hook")
            .await
            .unwrap();

        let update = handler.execute(&integration, &revision).await.unwrap().unwrap();

        assert_eq!(scm.pushes().await, 1);
        assert_eq!(provisioner.calls(ProvisioningOp::WebhookUrl).await, 0);
        assert_eq!(provisioner.calls(ProvisioningOp::Create).await, 1);
        assert!(update.steps_done.contains(&PROVISIONING_SETUP.to_string()));
        assert_eq!(update.git_repo, None);
    }

    #[tokio::test]
    async fn test_failure_is_pending_with_completed_steps() {
        let (handler, provisioner, _) = handler();
        provisioner
            .fail_next(ProvisioningOp::Create, ProvisioningError::failed("create", "quota exceeded"))
            .await;
        let integration = integration();
        let revision = integration.target_revision();

        let update = handler.execute(&integration, &revision).await.unwrap().unwrap();

        assert_eq!(update.state, IntegrationState::Pending);
        assert_eq!(update.steps_done, vec![SOURCE_REPO_SETUP.to_string()]);
        assert!(update.failed);
        assert!(update.message.unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_ready_deployment_promotes_revision() {
        let (handler, provisioner, _) = handler();
        provisioner.set_auto_ready(true);
        let integration = integration();
        let revision = integration.target_revision();

        let update = handler.execute(&integration, &revision).await.unwrap().unwrap();

        assert_eq!(update.state, IntegrationState::Active);
        assert!(update.steps_done.is_empty());
        let promoted = update.promoted_revision.unwrap();
        assert_eq!(promoted.version, Some(1));
    }
}

//! In-memory backends.
//!
//! Both keep call counters and accept one-shot failure injection so tests can
//! observe which external calls a workflow made.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::provisioning::{DeploymentDescriptor, ProvisioningBackend, ProvisioningError};
use super::source_control::{ProjectFiles, SourceControlBackend, SourceControlError};

/// Provisioning operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningOp {
    Create,
    Scale,
    IsScaled,
    WebhookUrl,
}

/// A deployment as the in-memory provisioner sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub revision: u32,
    pub replicas: u32,
    pub ready_replicas: u32,
    pub git_repository: Option<String>,
    pub webhook_secret: Option<String>,
    pub application_properties: BTreeMap<String, String>,
}

/// In-memory provisioning backend.
///
/// Deployments report ready replicas only after [`mark_ready`] unless
/// auto-ready is enabled.
///
/// [`mark_ready`]: InMemoryProvisioner::mark_ready
pub struct InMemoryProvisioner {
    deployments: RwLock<HashMap<String, Deployment>>,
    calls: Mutex<HashMap<ProvisioningOp, usize>>,
    failures: Mutex<HashMap<ProvisioningOp, ProvisioningError>>,
    auto_ready: AtomicBool,
    api_base: String,
    namespace: String,
}

impl Default for InMemoryProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvisioner {
    /// Create an empty provisioner.
    pub fn new() -> Self {
        Self {
            deployments: RwLock::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            auto_ready: AtomicBool::new(false),
            api_base: "https://provisioner.local".to_string(),
            namespace: "integrations".to_string(),
        }
    }

    /// Set the API base and namespace used for webhook URLs.
    #[must_use]
    pub fn with_api(mut self, api_base: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.namespace = namespace.into();
        self
    }

    /// Make deployments ready as soon as they are created or scaled.
    #[must_use]
    pub fn with_auto_ready(self, enabled: bool) -> Self {
        self.set_auto_ready(enabled);
        self
    }

    /// Toggle auto-ready.
    pub fn set_auto_ready(&self, enabled: bool) {
        self.auto_ready.store(enabled, Ordering::SeqCst);
    }

    /// Report every replica of `name` as ready.
    pub async fn mark_ready(&self, name: &str) -> bool {
        let mut deployments = self.deployments.write().await;
        deployments
            .get_mut(name)
            .map(|d| d.ready_replicas = d.replicas)
            .is_some()
    }

    /// Insert a deployment directly.
    pub async fn insert(&self, name: impl Into<String>, deployment: Deployment) {
        self.deployments.write().await.insert(name.into(), deployment);
    }

    /// Current view of a deployment.
    pub async fn deployment(&self, name: &str) -> Option<Deployment> {
        self.deployments.read().await.get(name).cloned()
    }

    /// Fail the next call of `op` with `error`.
    pub async fn fail_next(&self, op: ProvisioningOp, error: ProvisioningError) {
        self.failures.lock().await.insert(op, error);
    }

    /// How often `op` was called.
    pub async fn calls(&self, op: ProvisioningOp) -> usize {
        self.calls.lock().await.get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: ProvisioningOp) -> Result<(), ProvisioningError> {
        {
            let mut calls = self.calls.lock().await;
            let count = calls.entry(op).or_insert(0);
            *count = count.saturating_add(1);
        }
        self.failures.lock().await.remove(&op).map_or(Ok(()), Err)
    }

    fn initial_ready(&self, replicas: u32) -> u32 {
        if self.auto_ready.load(Ordering::SeqCst) {
            replicas
        } else {
            0
        }
    }
}

#[async_trait]
impl ProvisioningBackend for InMemoryProvisioner {
    async fn create(&self, d: &DeploymentDescriptor) -> Result<(), ProvisioningError> {
        self.enter(ProvisioningOp::Create).await?;
        let deployment = Deployment {
            revision: d.revision,
            replicas: d.replicas,
            ready_replicas: self.initial_ready(d.replicas),
            git_repository: d.git_repository.clone(),
            webhook_secret: d.webhook_secret.clone(),
            application_properties: d.application_properties.clone(),
        };
        debug!(name = %d.name, revision = d.revision, "Provisioned deployment");
        self.deployments.write().await.insert(d.name.clone(), deployment);
        Ok(())
    }

    async fn scale(&self, d: &DeploymentDescriptor) -> Result<(), ProvisioningError> {
        self.enter(ProvisioningOp::Scale).await?;
        let ready = self.initial_ready(d.replicas);
        let mut deployments = self.deployments.write().await;
        let deployment = deployments
            .get_mut(&d.name)
            .ok_or_else(|| ProvisioningError::not_found(&d.name))?;

        // Scaling a different revision than the one deployed is a no-op.
        if deployment.revision != d.revision {
            return Ok(());
        }
        deployment.replicas = d.replicas;
        deployment.ready_replicas = ready;
        Ok(())
    }

    async fn is_scaled(&self, d: &DeploymentDescriptor) -> Result<bool, ProvisioningError> {
        self.enter(ProvisioningOp::IsScaled).await?;
        let deployments = self.deployments.read().await;
        Ok(deployments.get(&d.name).is_some_and(|deployment| {
            deployment.revision == d.revision
                && deployment.replicas == d.replicas
                && deployment.ready_replicas == d.replicas
        }))
    }

    async fn webhook_url(
        &self,
        d: &DeploymentDescriptor,
        secret: &str,
    ) -> Result<String, ProvisioningError> {
        self.enter(ProvisioningOp::WebhookUrl).await?;
        Ok(format!(
            "{}/namespaces/{}/buildconfigs/{}/webhooks/{}/github",
            self.api_base, self.namespace, d.name, secret
        ))
    }
}

/// A repository held by [`InMemorySourceControl`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repository {
    pub files: ProjectFiles,
    pub commits: Vec<String>,
    pub webhook_url: Option<String>,
}

/// In-memory source-control backend.
pub struct InMemorySourceControl {
    repos: RwLock<BTreeMap<String, Repository>>,
    pushes: Mutex<usize>,
    failure: Mutex<Option<SourceControlError>>,
    base_url: String,
}

impl Default for InMemorySourceControl {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySourceControl {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::with_base_url("https://git.local")
    }

    /// Create a backend whose clone URLs start with `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            repos: RwLock::new(BTreeMap::new()),
            pushes: Mutex::new(0),
            failure: Mutex::new(None),
            base_url: base_url.into(),
        }
    }

    /// How many times project files were pushed.
    pub async fn pushes(&self) -> usize {
        *self.pushes.lock().await
    }

    /// Current view of a repository.
    pub async fn repository(&self, repo: &str) -> Option<Repository> {
        self.repos.read().await.get(repo).cloned()
    }

    /// Fail the next push with `error`.
    pub async fn fail_next_push(&self, error: SourceControlError) {
        *self.failure.lock().await = Some(error);
    }

    fn url_for(&self, repo: &str) -> String {
        format!("{}/{}.git", self.base_url, repo)
    }
}

#[async_trait]
impl SourceControlBackend for InMemorySourceControl {
    async fn create_or_update_project_files(
        &self,
        repo: &str,
        commit_message: &str,
        files: &ProjectFiles,
        webhook_url: &str,
    ) -> Result<String, SourceControlError> {
        {
            let mut pushes = self.pushes.lock().await;
            *pushes = pushes.saturating_add(1);
        }
        if let Some(error) = self.failure.lock().await.take() {
            return Err(error);
        }

        let mut repos = self.repos.write().await;
        let repository = repos.entry(repo.to_string()).or_default();
        repository.files.extend(files.iter().map(|(k, v)| (k.clone(), v.clone())));
        repository.commits.push(commit_message.to_string());
        repository.webhook_url = Some(webhook_url.to_string());
        debug!(repo, files = files.len(), "Pushed project files");

        Ok(self.url_for(repo))
    }

    async fn clone_url(&self, repo: &str) -> Result<String, SourceControlError> {
        if self.repos.read().await.contains_key(repo) {
            Ok(self.url_for(repo))
        } else {
            Err(SourceControlError::repository_not_found(repo))
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_deployment_is_not_ready_until_marked() {
        let provisioner = InMemoryProvisioner::new();
        let d = DeploymentDescriptor::new("orders", 1);

        provisioner.create(&d).await.unwrap();
        assert!(!provisioner.is_scaled(&d).await.unwrap());

        assert!(provisioner.mark_ready("orders").await);
        assert!(provisioner.is_scaled(&d).await.unwrap());
    }

    #[tokio::test]
    async fn test_scale_missing_deployment_is_not_found() {
        let provisioner = InMemoryProvisioner::new();
        let d = DeploymentDescriptor::new("orders", 1).with_replicas(0);

        let result = provisioner.scale(&d).await;
        assert!(result.is_err_and(|e| e.is_not_found()));
    }

    #[tokio::test]
    async fn test_scale_to_zero_is_scaled() {
        let provisioner = InMemoryProvisioner::new().with_auto_ready(true);
        provisioner.create(&DeploymentDescriptor::new("orders", 2)).await.unwrap();

        let down = DeploymentDescriptor::new("orders", 2).with_replicas(0);
        provisioner.scale(&down).await.unwrap();

        assert!(provisioner.is_scaled(&down).await.unwrap());
        assert_eq!(provisioner.deployment("orders").await.unwrap().ready_replicas, 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let provisioner = InMemoryProvisioner::new();
        provisioner
            .fail_next(ProvisioningOp::Create, ProvisioningError::failed("create", "quota"))
            .await;
        let d = DeploymentDescriptor::new("orders", 1);

        assert!(provisioner.create(&d).await.is_err());
        assert!(provisioner.create(&d).await.is_ok());
        assert_eq!(provisioner.calls(ProvisioningOp::Create).await, 2);
    }

    #[tokio::test]
    async fn test_source_control_push_and_clone_url() {
        let scm = InMemorySourceControl::with_base_url("https://git.example");
        assert!(scm.clone_url("orders").await.is_err());

        let mut files = ProjectFiles::new();
        files.insert("README.md".to_string(), b"hi".to_vec());
        let url = scm
            .create_or_update_project_files("orders", "Updated", &files, "https://hook")
            .await
            .unwrap();

        assert_eq!(url, "https://git.example/orders.git");
        assert_eq!(scm.clone_url("orders").await.unwrap(), url);
        let repo = scm.repository("orders").await.unwrap();
        assert_eq!(repo.commits, vec!["Updated".to_string()]);
        assert_eq!(repo.webhook_url.as_deref(), Some("https://hook"));
    }
}

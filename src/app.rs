//! Application wiring: configuration, seeding and controller start-up.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use integrator_model::{AccessToken, Integration, IntegrationId, IntegrationState, Step};
use integrator_reconciler::{
    ActivateHandler, ControllerConfig, ControllerHandle, DeactivateHandler, HandlerRegistry,
    InMemoryProvisioner, InMemorySourceControl, IntegrationController,
};
use integrator_store::{EventBus, InMemoryResourceStore, ResourceStore, TracingResourceStore};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Settings of the in-memory backends the binary runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL used for build webhooks.
    #[serde(default = "default_provisioner_api")]
    pub provisioner_api: String,

    /// Namespace deployments live in.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Base of generated clone URLs.
    #[serde(default = "default_git_base_url")]
    pub git_base_url: String,

    /// Report deployments ready as soon as they are created.
    #[serde(default = "default_auto_ready")]
    pub auto_ready: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provisioner_api: default_provisioner_api(),
            namespace: default_namespace(),
            git_base_url: default_git_base_url(),
            auto_ready: default_auto_ready(),
        }
    }
}

/// Configuration file of the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub backends: BackendConfig,
}

impl AppConfig {
    /// Load the configuration, applying environment overrides.
    ///
    /// Without a path the defaults are used. Files ending in `.json` are
    /// parsed as JSON, everything else as TOML.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.controller = config
            .controller
            .with_env_overrides()
            .context("Invalid environment override")?;
        config.controller.validate().context("Invalid controller configuration")?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))
        }
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Fails if the configuration cannot be serialized.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render config")
    }
}

/// An integration listed in a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub desired_state: Option<IntegrationState>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl From<Seed> for Integration {
    fn from(seed: Seed) -> Self {
        let id = seed.id.map_or_else(IntegrationId::generate, IntegrationId::new);
        let mut integration = Self::with_id(id, seed.name).with_steps(seed.steps);
        integration.desired_state = seed.desired_state;
        integration.current_state = Some(IntegrationState::Draft);
        integration.token = seed.token.map(AccessToken::new);
        integration
    }
}

/// Read a JSON array of seeds.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed.
pub fn load_seeds(path: &Path) -> Result<Vec<Seed>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))
}

/// Store, bus, backends and handlers wired together.
pub struct App {
    pub bus: Arc<EventBus>,
    pub store: Arc<TracingResourceStore<InMemoryResourceStore>>,
    pub provisioner: Arc<InMemoryProvisioner>,
    pub source_control: Arc<InMemorySourceControl>,
    registry: Arc<HandlerRegistry>,
    config: AppConfig,
}

impl App {
    /// Wire everything up without starting the controller.
    ///
    /// # Errors
    ///
    /// Fails when the handler registry cannot be built.
    pub fn new(config: AppConfig) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(TracingResourceStore::new(InMemoryResourceStore::with_bus(
            bus.clone(),
        )));
        let provisioner = Arc::new(
            InMemoryProvisioner::new()
                .with_api(&config.backends.provisioner_api, &config.backends.namespace)
                .with_auto_ready(config.backends.auto_ready),
        );
        let source_control = Arc::new(InMemorySourceControl::with_base_url(
            &config.backends.git_base_url,
        ));

        let registry = HandlerRegistry::builder()
            .handler(Arc::new(ActivateHandler::new(
                provisioner.clone(),
                source_control.clone(),
            )))
            .handler(Arc::new(DeactivateHandler::new(provisioner.clone())))
            .build()
            .context("Failed to register status handlers")?;

        Ok(Self {
            bus,
            store,
            provisioner,
            source_control,
            registry: Arc::new(registry),
            config,
        })
    }

    /// Create the seeded integrations, returning how many were stored.
    ///
    /// # Errors
    ///
    /// Fails on the first integration the store rejects.
    pub async fn seed(&self, seeds: Vec<Seed>) -> Result<usize> {
        let count = seeds.len();
        for seed in seeds {
            let integration = self
                .store
                .create(Integration::from(seed))
                .await
                .context("Failed to seed integration")?;
            info!(integration_id = %integration.id, name = %integration.name, "Seeded integration");
        }
        Ok(count)
    }

    /// Start the controller.
    ///
    /// # Errors
    ///
    /// Fails when the controller rejects its configuration.
    pub async fn start(&self) -> Result<ControllerHandle> {
        let controller = IntegrationController::new(
            self.store.clone(),
            self.bus.clone(),
            self.registry.clone(),
        )
        .with_config(self.config.controller.clone());
        controller.start().await.context("Failed to start controller")
    }
}

fn default_provisioner_api() -> String {
    "https://provisioner.local".to_string()
}

fn default_namespace() -> String {
    "integrations".to_string()
}

fn default_git_base_url() -> String {
    "https://git.local".to_string()
}

const fn default_auto_ready() -> bool {
    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_load_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.backends, BackendConfig::default());
        assert_eq!(config.controller.subscriber_name, "integration-controller");
    }

    #[test]
    fn test_load_toml_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[controller]\nrecheck_interval = 30\n\n[backends]\nnamespace = \"prod\"\nauto_ready = false"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.controller.recheck_interval, Duration::from_secs(30));
        assert_eq!(config.backends.namespace, "prod");
        assert!(!config.backends.auto_ready);
        assert_eq!(config.backends.git_base_url, "https://git.local");
    }

    #[test]
    fn test_rendered_config_parses_back() {
        let config = AppConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_seed_becomes_draft_integration() {
        let seed: Seed = serde_json::from_str(
            r#"{"id": "orders", "name": "Orders", "desired_state": "Active", "token": "t"}"#,
        )
        .unwrap();

        let integration = Integration::from(seed);

        assert_eq!(integration.id.as_str(), "orders");
        assert_eq!(integration.desired_state, Some(IntegrationState::Active));
        assert_eq!(integration.current_state, Some(IntegrationState::Draft));
        assert_eq!(integration.token.map(|t| t.value), Some("t".to_string()));
    }
}

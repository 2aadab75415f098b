//! Resource store trait and implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use integrator_model::{ChangeAction, ChangeEvent, Integration, IntegrationId, Kind, CHANGE_EVENT_TOPIC};
use tokio::sync::RwLock;
use tracing::warn;

use crate::bus::EventBus;
use crate::error::{Result, StoreError};

/// Trait for integration storage backends.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up an integration by id.
    async fn fetch(&self, id: &IntegrationId) -> Result<Option<Integration>>;

    /// List every integration.
    async fn fetch_all(&self) -> Result<Vec<Integration>>;

    /// Insert a new integration.
    async fn create(&self, integration: Integration) -> Result<Integration>;

    /// Replace an existing integration; fails if no record has its id.
    async fn update(&self, integration: Integration) -> Result<()>;

    /// Remove an integration, returning whether it existed.
    async fn delete(&self, id: &IntegrationId) -> Result<bool>;
}

/// In-memory resource store.
///
/// Broadcasts a change event on the attached bus after every mutation.
#[derive(Default)]
pub struct InMemoryResourceStore {
    records: RwLock<BTreeMap<IntegrationId, Integration>>,
    bus: Option<Arc<EventBus>>,
}

impl InMemoryResourceStore {
    /// Create a store that publishes no change events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store publishing change events on `bus`.
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            bus: Some(bus),
        }
    }

    /// Number of stored integrations.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn notify(&self, action: ChangeAction, id: &IntegrationId) {
        let Some(bus) = &self.bus else {
            return;
        };
        match ChangeEvent::new(action, Kind::Integration, id).to_json() {
            Ok(data) => {
                bus.broadcast(CHANGE_EVENT_TOPIC, data).await;
            }
            Err(e) => warn!(integration_id = %id, error = %e, "Could not encode change event"),
        }
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn fetch(&self, id: &IntegrationId) -> Result<Option<Integration>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn fetch_all(&self) -> Result<Vec<Integration>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn create(&self, integration: Integration) -> Result<Integration> {
        let id = integration.id.clone();
        {
            let mut records = self.records.write().await;
            if records.contains_key(&id) {
                return Err(StoreError::already_exists(id.as_str()));
            }
            records.insert(id.clone(), integration.clone());
        }
        self.notify(ChangeAction::Created, &id).await;
        Ok(integration)
    }

    async fn update(&self, integration: Integration) -> Result<()> {
        let id = integration.id.clone();
        {
            let mut records = self.records.write().await;
            let slot = records
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found(id.as_str()))?;
            *slot = integration;
        }
        self.notify(ChangeAction::Updated, &id).await;
        Ok(())
    }

    async fn delete(&self, id: &IntegrationId) -> Result<bool> {
        let removed = self.records.write().await.remove(id).is_some();
        if removed {
            self.notify(ChangeAction::Deleted, id).await;
        }
        Ok(removed)
    }
}

/// A wrapper that adds tracing to a resource store.
pub struct TracingResourceStore<S: ResourceStore> {
    inner: S,
}

impl<S: ResourceStore> TracingResourceStore<S> {
    /// Create a new tracing store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Get the wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for TracingResourceStore<S> {
    async fn fetch(&self, id: &IntegrationId) -> Result<Option<Integration>> {
        tracing::trace!(integration_id = %id, "Fetching integration");
        self.inner.fetch(id).await
    }

    async fn fetch_all(&self) -> Result<Vec<Integration>> {
        let result = self.inner.fetch_all().await;
        if let Ok(ref all) = result {
            tracing::debug!(count = all.len(), "Fetched all integrations");
        }
        result
    }

    async fn create(&self, integration: Integration) -> Result<Integration> {
        tracing::debug!(integration_id = %integration.id, name = %integration.name, "Creating integration");
        self.inner.create(integration).await
    }

    async fn update(&self, integration: Integration) -> Result<()> {
        tracing::debug!(
            integration_id = %integration.id,
            current = ?integration.current_state,
            desired = ?integration.desired_state,
            "Updating integration"
        );
        let id = integration.id.clone();
        let result = self.inner.update(integration).await;
        if let Err(ref e) = result {
            tracing::warn!(integration_id = %id, error = %e, "Update failed");
        }
        result
    }

    async fn delete(&self, id: &IntegrationId) -> Result<bool> {
        tracing::debug!(integration_id = %id, "Deleting integration");
        self.inner.delete(id).await
    }
}

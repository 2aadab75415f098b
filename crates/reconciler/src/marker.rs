//! In-flight markers.

use std::collections::HashSet;
use std::fmt;

use integrator_model::{IntegrationId, IntegrationState};

/// Identifies a convergence attempt: an integration heading to a desired state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerKey {
    pub desired: IntegrationState,
    pub id: IntegrationId,
}

impl MarkerKey {
    /// Create a key.
    pub const fn new(desired: IntegrationState, id: IntegrationId) -> Self {
        Self { desired, id }
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.desired, self.id)
    }
}

/// Convergence attempts currently executing.
///
/// Owned by the controller worker; never shared.
#[derive(Debug, Default)]
pub struct InFlightMarkers {
    keys: HashSet<MarkerKey>,
}

impl InFlightMarkers {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a marker, returning `false` if it was already present.
    pub fn insert(&mut self, key: MarkerKey) -> bool {
        self.keys.insert(key)
    }

    /// Remove a marker, returning whether it was present.
    pub fn remove(&mut self, key: &MarkerKey) -> bool {
        self.keys.remove(key)
    }

    /// Remove every marker held for `id`, returning how many were removed.
    pub fn remove_id(&mut self, id: &IntegrationId) -> usize {
        let before = self.keys.len();
        self.keys.retain(|key| &key.id != id);
        before.saturating_sub(self.keys.len())
    }

    /// Check if a marker is present.
    pub fn contains(&self, key: &MarkerKey) -> bool {
        self.keys.contains(key)
    }

    /// Check if any attempt for `id` is marked.
    pub fn contains_id(&self, id: &IntegrationId) -> bool {
        self.keys.iter().any(|key| &key.id == id)
    }

    /// Iterate over the markers.
    pub fn iter(&self) -> impl Iterator<Item = &MarkerKey> {
        self.keys.iter()
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if no marker is present.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

//! Integration revisions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::IntegrationState;

/// Step kind whose properties feed the deployment's application properties.
pub const ENDPOINT_STEP_KIND: &str = "endpoint";

/// One step of what an integration does.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Step {
    /// Step kind, e.g. `endpoint` or `log`.
    pub kind: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Connector the step talks to, for endpoint steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    /// Configured properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Step {
    /// Create a step of the given kind.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create an endpoint step bound to a connector.
    pub fn endpoint(name: impl Into<String>, connector: impl Into<String>) -> Self {
        Self {
            connector: Some(connector.into()),
            ..Self::new(ENDPOINT_STEP_KIND, name)
        }
    }

    /// Add a configured property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Check if this is an endpoint step.
    pub fn is_endpoint(&self) -> bool {
        self.kind == ENDPOINT_STEP_KIND
    }
}

/// The work a revision performs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RevisionSpec {
    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Free-form configuration blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
}

/// Immutable, versioned snapshot of an integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Version, assigned on publication when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// State this revision has reached.
    pub current_state: IntegrationState,
    /// State this revision is heading to.
    pub target_state: IntegrationState,
    /// What it runs.
    #[serde(default)]
    pub spec: RevisionSpec,
}

impl Default for Revision {
    fn default() -> Self {
        Self::new()
    }
}

impl Revision {
    /// Create an unversioned draft revision.
    pub fn new() -> Self {
        Self {
            version: None,
            current_state: IntegrationState::Draft,
            target_state: IntegrationState::Draft,
            spec: RevisionSpec::default(),
        }
    }

    /// Create a draft revision running the given steps.
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self {
            spec: RevisionSpec {
                steps,
                configuration: None,
            },
            ..Self::new()
        }
    }

    /// Set the version.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Set the current state.
    #[must_use]
    pub const fn with_current_state(mut self, state: IntegrationState) -> Self {
        self.current_state = state;
        self
    }

    /// Set the target state.
    #[must_use]
    pub const fn with_target_state(mut self, state: IntegrationState) -> Self {
        self.target_state = state;
        self
    }

    /// Once active a revision must not change.
    pub fn is_immutable(&self) -> bool {
        self.current_state == IntegrationState::Active
    }

    /// Steps of this revision.
    pub fn steps(&self) -> &[Step] {
        &self.spec.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_revision_is_unversioned_draft() {
        let revision = Revision::new();
        assert_eq!(revision.version, None);
        assert_eq!(revision.current_state, IntegrationState::Draft);
        assert!(!revision.is_immutable());
    }

    #[test]
    fn test_active_revision_is_immutable() {
        let revision = Revision::new()
            .with_version(2)
            .with_current_state(IntegrationState::Active);
        assert!(revision.is_immutable());
    }

    #[test]
    fn test_endpoint_step() {
        let step = Step::endpoint("crm", "salesforce").with_property("login", "bob");
        assert!(step.is_endpoint());
        assert_eq!(step.properties.get("login").map(String::as_str), Some("bob"));
        assert!(!Step::new("log", "trace").is_endpoint());
    }
}

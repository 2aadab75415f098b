//! The integration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::revision::{Revision, Step};
use crate::status::StatusUpdate;
use crate::types::{AccessToken, IntegrationId, IntegrationState};

/// An integration: the resource the controller drives toward its desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    /// Store identity.
    pub id: IntegrationId,
    /// Display name, also the source of repository and deployment names.
    pub name: String,
    /// Operator intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<IntegrationState>,
    /// Last observed outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<IntegrationState>,
    /// Human readable status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Published revisions, oldest first.
    #[serde(default)]
    pub revisions: Vec<Revision>,
    /// Revision being edited, not yet published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_revision: Option<Revision>,
    /// Version of the revision currently deployed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_revision: Option<u32>,
    /// Steps finished in the running convergence attempt.
    #[serde(default)]
    pub steps_done: Vec<String>,
    /// Steps the integration runs when no revision exists yet.
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Credential used against the provisioning backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<AccessToken>,
    /// Clone URL of the generated project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    /// Last time the controller wrote this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Integration {
    /// Create a draft integration with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(IntegrationId::generate(), name)
    }

    /// Create a draft integration with the given id.
    pub fn with_id(id: IntegrationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            desired_state: None,
            current_state: None,
            status_message: None,
            revisions: Vec::new(),
            draft_revision: None,
            deployed_revision: None,
            steps_done: Vec::new(),
            steps: Vec::new(),
            token: None,
            git_repo: None,
            last_updated: None,
            created_at: Utc::now(),
        }
    }

    /// Set the desired state.
    #[must_use]
    pub const fn with_desired_state(mut self, state: IntegrationState) -> Self {
        self.desired_state = Some(state);
        self
    }

    /// Set the current state.
    #[must_use]
    pub const fn with_current_state(mut self, state: IntegrationState) -> Self {
        self.current_state = Some(state);
        self
    }

    /// Set the access token.
    #[must_use]
    pub fn with_token(mut self, token: AccessToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Set the draft revision.
    #[must_use]
    pub fn with_draft(mut self, revision: Revision) -> Self {
        self.draft_revision = Some(revision);
        self
    }

    /// Set the steps.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    /// Check whether the observed state fulfils the desired one.
    ///
    /// An integration without a desired state has nothing to converge to.
    pub fn is_converged(&self) -> bool {
        match (self.current_state, self.desired_state) {
            (Some(current), Some(desired)) => current.satisfies(desired),
            (current, desired) => current == desired,
        }
    }

    /// The revision matching the deployed-revision pointer.
    pub fn active_revision(&self) -> Option<&Revision> {
        let deployed = self.deployed_revision?;
        self.revision(deployed)
    }

    /// Look up a published revision by version.
    pub fn revision(&self, version: u32) -> Option<&Revision> {
        self.revisions.iter().find(|r| r.version == Some(version))
    }

    /// Version a new revision gets when none is set: highest existing + 1.
    ///
    /// Concurrent writers creating revisions for the same integration can
    /// pick the same number; nothing coordinates them.
    pub fn next_revision_version(&self) -> u32 {
        self.revisions
            .iter()
            .filter_map(|r| r.version)
            .max()
            .map_or(1, |max| max.saturating_add(1))
    }

    /// The revision a handler should act on.
    ///
    /// Prefers the draft, then the deployed revision, then the newest
    /// published one. Integrations without any revision get an unversioned
    /// revision built from their steps.
    pub fn target_revision(&self) -> Revision {
        self.draft_revision
            .clone()
            .or_else(|| self.active_revision().cloned())
            .or_else(|| self.revisions.last().cloned())
            .unwrap_or_else(|| Revision::from_steps(self.steps.clone()))
    }

    /// Publish a revision, assigning the next version when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateRevision`] when a revision with the same
    /// version is already published.
    pub fn publish_revision(&mut self, revision: Revision) -> Result<u32> {
        let version = revision
            .version
            .unwrap_or_else(|| self.next_revision_version());
        if self.revision(version).is_some() {
            return Err(ModelError::duplicate_revision(version));
        }
        self.revisions.push(revision.with_version(version));
        Ok(version)
    }

    /// Mark `revision` as the deployed, active revision.
    ///
    /// Replaces a not-yet-active revision of the same version, leaves an
    /// identical active one alone and appends otherwise. The draft is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ImmutableRevision`] when an active revision with
    /// the same version but different content exists.
    pub fn promote_revision(&mut self, revision: Revision) -> Result<u32> {
        let version = revision
            .version
            .unwrap_or_else(|| self.next_revision_version());
        let promoted = revision
            .with_version(version)
            .with_current_state(IntegrationState::Active);

        match self
            .revisions
            .iter_mut()
            .find(|r| r.version == Some(version))
        {
            Some(existing) if existing.is_immutable() => {
                if existing.spec != promoted.spec {
                    return Err(ModelError::immutable_revision(version));
                }
            }
            Some(existing) => *existing = promoted,
            None => self.revisions.push(promoted),
        }

        self.deployed_revision = Some(version);
        self.draft_revision = None;
        Ok(version)
    }

    /// Apply a handler's status update to this record.
    ///
    /// # Errors
    ///
    /// Propagates [`ModelError::ImmutableRevision`] from revision promotion;
    /// in that case the record is left untouched.
    pub fn apply_status_update(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> Result<()> {
        if let Some(revision) = update.promoted_revision {
            self.promote_revision(revision)?;
        }
        if update.git_repo.is_some() {
            self.git_repo = update.git_repo;
        }
        self.current_state = Some(update.state);
        self.status_message = update.message;
        self.steps_done = update.steps_done;
        self.last_updated = Some(now);
        Ok(())
    }

    /// Record a failed convergence attempt without touching the state.
    pub fn record_error(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status_message = Some(message.into());
        self.last_updated = Some(now);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use proptest::prelude::*;

    use super::*;

    fn integration_with_versions(versions: &[u32]) -> Integration {
        let mut integration = Integration::new("demo");
        integration.revisions = versions
            .iter()
            .map(|v| Revision::new().with_version(*v))
            .collect();
        integration
    }

    #[test]
    fn test_next_version_after_one_and_two_is_three() {
        let mut integration = integration_with_versions(&[1, 2]);
        assert_eq!(integration.next_revision_version(), 3);

        let version = integration.publish_revision(Revision::new()).unwrap();
        assert_eq!(version, 3);
        assert_eq!(integration.revisions.len(), 3);
    }

    #[test]
    fn test_first_version_is_one() {
        let integration = Integration::new("demo");
        assert_eq!(integration.next_revision_version(), 1);
    }

    #[test]
    fn test_publish_rejects_duplicate_version() {
        let mut integration = integration_with_versions(&[1]);
        let result = integration.publish_revision(Revision::new().with_version(1));
        assert_eq!(result, Err(ModelError::duplicate_revision(1)));
    }

    #[test]
    fn test_promote_sets_pointer_and_clears_draft() {
        let mut integration =
            Integration::new("demo").with_draft(Revision::from_steps(vec![Step::new("log", "a")]));
        let draft = integration.target_revision();

        let version = integration.promote_revision(draft).unwrap();

        assert_eq!(version, 1);
        assert_eq!(integration.deployed_revision, Some(1));
        assert!(integration.draft_revision.is_none());
        let active = integration.active_revision().unwrap();
        assert_eq!(active.current_state, IntegrationState::Active);
    }

    #[test]
    fn test_promote_refuses_to_rewrite_active_revision() {
        let mut integration = Integration::new("demo");
        integration
            .promote_revision(Revision::from_steps(vec![Step::new("log", "a")]).with_version(1))
            .unwrap();

        let changed = Revision::from_steps(vec![Step::new("log", "b")]).with_version(1);
        assert_eq!(
            integration.promote_revision(changed),
            Err(ModelError::immutable_revision(1))
        );

        let same = Revision::from_steps(vec![Step::new("log", "a")]).with_version(1);
        assert!(integration.promote_revision(same).is_ok());
        assert_eq!(integration.revisions.len(), 1);
    }

    #[test]
    fn test_target_revision_preference() {
        let mut integration = integration_with_versions(&[1, 2]);
        assert_eq!(integration.target_revision().version, Some(2));

        integration.deployed_revision = Some(1);
        assert_eq!(integration.target_revision().version, Some(1));

        integration.draft_revision = Some(Revision::new());
        assert_eq!(integration.target_revision().version, None);
    }

    #[test]
    fn test_apply_status_update() {
        let mut integration = Integration::new("demo")
            .with_desired_state(IntegrationState::Active)
            .with_current_state(IntegrationState::Draft);
        let now = Utc::now();

        let update = StatusUpdate::new(1, IntegrationState::Pending)
            .with_steps(vec!["source-repo-setup".to_string()])
            .with_git_repo(Some("https://git.example/demo.git".to_string()));
        integration.apply_status_update(update, now).unwrap();

        assert_eq!(integration.current_state, Some(IntegrationState::Pending));
        assert_eq!(integration.steps_done, vec!["source-repo-setup".to_string()]);
        assert_eq!(integration.git_repo.as_deref(), Some("https://git.example/demo.git"));
        assert_eq!(integration.last_updated, Some(now));
        assert!(!integration.is_converged());
    }

    #[test]
    fn test_record_error_keeps_state() {
        let mut integration = Integration::new("demo").with_current_state(IntegrationState::Pending);
        integration.record_error("Error: boom", Utc::now());
        assert_eq!(integration.current_state, Some(IntegrationState::Pending));
        assert_eq!(integration.status_message.as_deref(), Some("Error: boom"));
    }

    #[test]
    fn test_convergence() {
        let integration = Integration::new("demo");
        assert!(integration.is_converged());

        let integration = integration.with_desired_state(IntegrationState::Inactive);
        assert!(!integration.is_converged());

        let integration = integration.with_current_state(IntegrationState::Undeployed);
        assert!(integration.is_converged());
    }

    proptest! {
        #[test]
        fn next_version_is_max_plus_one(versions in proptest::collection::vec(1u32..10_000, 0..20)) {
            let integration = integration_with_versions(&versions);
            let expected = versions.iter().max().map_or(1, |m| m + 1);
            prop_assert_eq!(integration.next_revision_version(), expected);
        }
    }
}

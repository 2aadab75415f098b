//! Status updates reported by handlers.

use serde::{Deserialize, Serialize};

use crate::revision::Revision;
use crate::types::IntegrationState;

/// What a handler observed after acting on an integration.
///
/// Handlers never write integrations themselves; the controller applies the
/// update to a fresh copy of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Revision version the handler acted on.
    pub version: u32,
    /// Newly observed state.
    pub state: IntegrationState,
    /// Optional human readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Step identifiers completed so far in this convergence attempt.
    #[serde(default)]
    pub steps_done: Vec<String>,
    /// Clone URL of the generated project, when it was (re)pushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    /// Revision that became the deployed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_revision: Option<Revision>,
    /// The attempt failed; the controller counts it toward the retry backoff.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl StatusUpdate {
    /// Create an update reporting `state` for `version`.
    pub const fn new(version: u32, state: IntegrationState) -> Self {
        Self {
            version,
            state,
            message: None,
            steps_done: Vec::new(),
            git_repo: None,
            promoted_revision: None,
            failed: false,
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach the completed steps.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps_done = steps;
        self
    }

    /// Attach the clone URL.
    #[must_use]
    pub fn with_git_repo(mut self, git_repo: Option<String>) -> Self {
        self.git_repo = git_repo;
        self
    }

    /// Mark the attempt as failed.
    #[must_use]
    pub const fn as_failure(mut self) -> Self {
        self.failed = true;
        self
    }

    /// Attach the promoted revision.
    #[must_use]
    pub fn with_promoted_revision(mut self, revision: Revision) -> Self {
        self.promoted_revision = Some(revision);
        self
    }
}

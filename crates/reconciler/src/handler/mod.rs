//! Status handlers: the workflows that drive an integration toward one
//! desired state.
//!
//! A handler declares the desired states it is responsible for and returns a
//! [`StatusUpdate`] describing what it observed. Handlers never write the
//! integration record; the controller applies the update.
//!
//! Every workflow is made of idempotent steps recorded in the integration's
//! `steps_done`, so a retried invocation resumes where the previous one left
//! off (see [`StepTracker`]).

mod activate;
mod deactivate;
mod steps;

use async_trait::async_trait;
use integrator_model::{Integration, IntegrationState, Revision, StatusUpdate};

use crate::error::Result;

pub use activate::ActivateHandler;
pub use deactivate::DeactivateHandler;
pub use steps::{StepTracker, PROVISIONING_SETUP, SOURCE_REPO_SETUP};

/// A workflow driving integrations toward the states it declares.
///
/// `execute` may block on backend calls for a long time and is invoked
/// repeatedly for the same integration; the controller guarantees at most one
/// concurrent invocation per `(desired state, integration)`.
#[async_trait]
pub trait StatusHandler: Send + Sync {
    /// Name used in logs and registration errors.
    fn name(&self) -> &str;

    /// Desired states this handler is responsible for.
    fn trigger_states(&self) -> &[IntegrationState];

    /// Check if `state` is one of this handler's triggers.
    fn handles(&self, state: IntegrationState) -> bool {
        self.trigger_states().contains(&state)
    }

    /// Revision of `integration` this handler acts on.
    fn select_revision(&self, integration: &Integration) -> Revision {
        integration.target_revision()
    }

    /// Run the workflow once.
    ///
    /// `None` means there was nothing to report.
    ///
    /// # Errors
    ///
    /// Any error is recorded on the integration's status message by the
    /// controller; the observed state stays unchanged.
    async fn execute(
        &self,
        integration: &Integration,
        revision: &Revision,
    ) -> Result<Option<StatusUpdate>>;
}

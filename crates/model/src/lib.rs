//! Data model for the integration controller.
//!
//! An [`Integration`] is the long-lived resource being reconciled. Operators
//! set its desired state; handlers observe and report its current state
//! through [`StatusUpdate`] values that only the controller applies.
//!
//! - **Integration**: identity, desired/current state, revisions, step bookkeeping
//! - **Revision**: immutable versioned snapshot of the steps an integration runs
//! - **StatusUpdate**: what a handler observed, applied by the controller
//! - **ChangeEvent**: notification emitted by the store on every mutation
//!
//! # Example
//!
//! ```ignore
//! use integrator_model::{Integration, IntegrationState, Revision};
//!
//! let mut integration = Integration::new("orders-to-crm")
//!     .with_desired_state(IntegrationState::Active);
//! integration.publish_revision(Revision::new())?;
//! assert_eq!(integration.next_revision_version(), 2);
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod event;
pub mod integration;
pub mod revision;
pub mod status;
pub mod types;

// Re-export main types
pub use error::{ModelError, Result};
pub use event::{ChangeAction, ChangeEvent, CHANGE_EVENT_TOPIC};
pub use integration::Integration;
pub use revision::{Revision, RevisionSpec, Step, ENDPOINT_STEP_KIND};
pub use status::StatusUpdate;
pub use types::{AccessToken, IntegrationId, IntegrationState, Kind};

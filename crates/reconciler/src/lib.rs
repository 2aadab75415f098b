//! Reconciliation controller for integrations.
//!
//! The controller drives every integration from its observed state toward the
//! state an operator declared:
//!
//! - **Registry**: maps a desired state to the one handler responsible for it
//! - **Handlers**: resumable workflows built from idempotent steps
//! - **Controller**: a single worker fed by change notifications, a startup
//!   scan and per-integration follow-up timers
//!
//! # Flow
//!
//! 1. A check compares desired and current state. Converged integrations
//!    have their in-flight marker cleared; unhandled desired states are skipped.
//! 2. A dispatch re-fetches the record, applies the staleness guard, marks the
//!    attempt in flight and runs the handler.
//! 3. The handler's [`StatusUpdate`](integrator_model::StatusUpdate) is
//!    applied to a fresh copy of the record; a handler error only sets the
//!    status message.
//! 4. A follow-up check is armed whatever the outcome.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use integrator_reconciler::{
//!     ActivateHandler, DeactivateHandler, HandlerRegistry, IntegrationController,
//!     InMemoryProvisioner, InMemorySourceControl,
//! };
//! use integrator_store::{EventBus, InMemoryResourceStore};
//!
//! #[tokio::main]
//! async fn main() -> integrator_reconciler::Result<()> {
//!     let bus = Arc::new(EventBus::new());
//!     let store = Arc::new(InMemoryResourceStore::with_bus(bus.clone()));
//!     let provisioner = Arc::new(InMemoryProvisioner::new());
//!     let scm = Arc::new(InMemorySourceControl::new());
//!
//!     let registry = HandlerRegistry::builder()
//!         .handler(Arc::new(ActivateHandler::new(provisioner.clone(), scm)))
//!         .handler(Arc::new(DeactivateHandler::new(provisioner)))
//!         .build()?;
//!
//!     let handle = IntegrationController::new(store, bus, Arc::new(registry))
//!         .start()
//!         .await?;
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod handler;
pub mod marker;
pub mod project;
pub mod registry;
mod worker;

// Re-export main types
pub use backend::{
    DeploymentDescriptor, InMemoryProvisioner, InMemorySourceControl, ProjectFiles,
    ProvisioningBackend, ProvisioningError, ProvisioningOp, SourceControlBackend,
    SourceControlError,
};
pub use config::{ControllerConfig, RetryPolicy};
pub use controller::{ControllerHandle, IntegrationController};
pub use error::{Error, Result};
pub use handler::{
    ActivateHandler, DeactivateHandler, StatusHandler, StepTracker, PROVISIONING_SETUP,
    SOURCE_REPO_SETUP,
};
pub use marker::{InFlightMarkers, MarkerKey};
pub use project::{sanitize_name, DefaultProjectGenerator, ProjectGenerator};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use worker::Trigger;

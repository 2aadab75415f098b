//! Contracts the handlers need from the provisioning and source-control
//! backends.
//!
//! Real backends live outside this workspace; [`memory`] holds in-memory
//! implementations used by tests and the demo binary.

pub mod memory;
mod provisioning;
mod source_control;

pub use memory::{InMemoryProvisioner, InMemorySourceControl, ProvisioningOp};
pub use provisioning::{DeploymentDescriptor, ProvisioningBackend, ProvisioningError};
pub use source_control::{ProjectFiles, SourceControlBackend, SourceControlError};

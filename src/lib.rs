//! # Integrator
//!
//! Binary support for the integration controller: configuration, seeding
//! and wiring of the in-memory store, bus and backends.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app;
pub mod cli;

pub use app::{App, AppConfig, BackendConfig, Seed, load_seeds};

//! Resource store and change-notification bus.
//!
//! The controller only reaches integrations through the [`ResourceStore`]
//! trait and only learns about changes through the [`EventBus`]:
//!
//! - **Resource store**: point lookup, full listing, conditional update
//! - **Event bus**: named subscriptions receiving topic-tagged messages
//!
//! Every successful store mutation broadcasts a JSON encoded
//! [`ChangeEvent`](integrator_model::ChangeEvent) under the `change-event`
//! topic.
//!
//! # Example
//!
//! ```ignore
//! use integrator_store::{EventBus, InMemoryResourceStore, ResourceStore};
//! use integrator_model::Integration;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = Arc::new(EventBus::new());
//!     let store = InMemoryResourceStore::with_bus(bus.clone());
//!
//!     let mut sub = bus.subscribe("watcher").await;
//!     store.create(Integration::new("orders")).await.ok();
//!
//!     let message = sub.recv().await.ok();
//!     println!("{message:?}");
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod bus;
pub mod error;
pub mod store;

// Re-export main types
pub use bus::{BusMessage, EventBus, Subscription};
pub use error::{Result, StoreError};
pub use store::{InMemoryResourceStore, ResourceStore, TracingResourceStore};

//! Desired state to handler mapping.

use std::collections::HashMap;
use std::sync::Arc;

use integrator_model::IntegrationState;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::StatusHandler;

/// Maps each desired state to the single handler driving toward it.
///
/// Built once at startup and shared read-only; there is no removal.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<IntegrationState, Arc<dyn StatusHandler>>,
}

impl HandlerRegistry {
    /// Start building a registry.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Register `handler` under each of its trigger states.
    ///
    /// Nothing is inserted when the registration fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoTriggers`] for a handler without triggers and
    /// [`Error::DuplicateTrigger`] when a trigger already has a handler.
    pub fn register(&mut self, handler: Arc<dyn StatusHandler>) -> Result<()> {
        let triggers = handler.trigger_states();
        if triggers.is_empty() {
            return Err(Error::NoTriggers {
                handler: handler.name().to_string(),
            });
        }

        if let Some((state, existing)) = triggers
            .iter()
            .find_map(|state| self.handlers.get(state).map(|h| (*state, h)))
        {
            return Err(Error::DuplicateTrigger {
                state,
                existing: existing.name().to_string(),
                duplicate: handler.name().to_string(),
            });
        }

        for state in triggers {
            debug!(handler = handler.name(), state = %state, "Registered handler");
            self.handlers.insert(*state, Arc::clone(&handler));
        }
        Ok(())
    }

    /// Handler responsible for `state`, if any.
    pub fn lookup(&self, state: IntegrationState) -> Option<Arc<dyn StatusHandler>> {
        self.handlers.get(&state).cloned()
    }

    /// Number of handled states.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Collects handlers, then registers them all at once.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: Vec<Arc<dyn StatusHandler>>,
}

impl HandlerRegistryBuilder {
    /// Add a handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn StatusHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Build the registry.
    ///
    /// # Errors
    ///
    /// Propagates the first registration error.
    pub fn build(self) -> Result<HandlerRegistry> {
        self.handlers
            .into_iter()
            .try_fold(HandlerRegistry::default(), |mut registry, handler| {
                registry.register(handler)?;
                Ok(registry)
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use async_trait::async_trait;
    use integrator_model::{Integration, Revision, StatusUpdate};

    use super::*;

    struct Fixed {
        name: &'static str,
        triggers: Vec<IntegrationState>,
    }

    #[async_trait]
    impl StatusHandler for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn trigger_states(&self) -> &[IntegrationState] {
            &self.triggers
        }

        async fn execute(&self, _: &Integration, _: &Revision) -> Result<Option<StatusUpdate>> {
            Ok(None)
        }
    }

    fn fixed(name: &'static str, triggers: &[IntegrationState]) -> Arc<dyn StatusHandler> {
        Arc::new(Fixed {
            name,
            triggers: triggers.to_vec(),
        })
    }

    #[test]
    fn test_one_entry_per_trigger() {
        let registry = HandlerRegistry::builder()
            .handler(fixed("up", &[IntegrationState::Active]))
            .handler(fixed("down", &[IntegrationState::Inactive, IntegrationState::Draft]))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.lookup(IntegrationState::Draft).unwrap().name(), "down");
        assert_eq!(registry.lookup(IntegrationState::Active).unwrap().name(), "up");
        assert!(registry.lookup(IntegrationState::Deleted).is_none());
    }

    #[test]
    fn test_duplicate_trigger_is_rejected() {
        let result = HandlerRegistry::builder()
            .handler(fixed("first", &[IntegrationState::Active]))
            .handler(fixed("second", &[IntegrationState::Deleted, IntegrationState::Active]))
            .build();

        match result {
            Err(Error::DuplicateTrigger {
                state,
                existing,
                duplicate,
            }) => {
                assert_eq!(state, IntegrationState::Active);
                assert_eq!(existing, "first");
                assert_eq!(duplicate, "second");
            }
            other => panic!("expected duplicate trigger, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_failed_registration_inserts_nothing() {
        let mut registry = HandlerRegistry::default();
        registry.register(fixed("first", &[IntegrationState::Active])).unwrap();

        let result = registry.register(fixed("second", &[IntegrationState::Deleted, IntegrationState::Active]));

        assert!(result.is_err());
        assert!(registry.lookup(IntegrationState::Deleted).is_none());
    }

    #[test]
    fn test_handler_without_triggers_is_rejected() {
        let mut registry = HandlerRegistry::default();
        let result = registry.register(fixed("idle", &[]));
        assert!(matches!(result, Err(Error::NoTriggers { .. })));
    }
}

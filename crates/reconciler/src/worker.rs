//! The single worker executing every check and dispatch.
//!
//! All convergence work for all integrations runs here, one command at a
//! time. The worker alone owns the in-flight markers, the follow-up timers and
//! the failure counters, so none of them needs a lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use integrator_model::{Integration, IntegrationId, StatusUpdate};
use integrator_store::ResourceStore;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::handler::StatusHandler;
use crate::marker::{InFlightMarkers, MarkerKey};
use crate::registry::HandlerRegistry;

/// What caused a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A change notification from the store.
    Notification,
    /// The startup scan.
    Scan,
    /// A follow-up timer armed after a dispatch.
    FollowUp,
    /// An explicit request through the controller handle.
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Notification => "notification",
            Self::Scan => "scan",
            Self::FollowUp => "follow-up",
            Self::Manual => "manual",
        })
    }
}

/// Work items of the worker queue.
pub(crate) enum Command {
    Check {
        id: IntegrationId,
        trigger: Trigger,
    },
    Dispatch {
        id: IntegrationId,
        handler: Arc<dyn StatusHandler>,
    },
    InFlight(oneshot::Sender<Vec<MarkerKey>>),
}

/// Result of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckOutcome {
    /// No desired state, nothing to converge to.
    NoTarget,
    /// Observed state fulfils the desired one.
    Converged,
    /// No handler for the desired state.
    Unhandled,
    /// A dispatch was queued.
    Dispatched,
}

pub(crate) struct Worker {
    store: Arc<dyn ResourceStore>,
    registry: Arc<HandlerRegistry>,
    config: ControllerConfig,
    queue: mpsc::UnboundedSender<Command>,
    markers: InFlightMarkers,
    timers: JoinSet<()>,
    pending_timers: HashMap<IntegrationId, AbortHandle>,
    failures: HashMap<IntegrationId, u32>,
}

impl Worker {
    pub(crate) fn new(
        store: Arc<dyn ResourceStore>,
        registry: Arc<HandlerRegistry>,
        config: ControllerConfig,
        queue: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            queue,
            markers: InFlightMarkers::new(),
            timers: JoinSet::new(),
            pending_timers: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// Scan once, then process commands until stopped.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut stop: watch::Receiver<bool>,
    ) {
        self.scan().await;

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(_) = self.timers.join_next(), if !self.timers.is_empty() => {}
            }
        }

        let cancelled = self.pending_timers.len();
        self.timers.abort_all();
        info!(cancelled_timers = cancelled, "Controller worker stopped");
    }

    /// Queue a check for every stored integration.
    async fn scan(&self) {
        match self.store.fetch_all().await {
            Ok(integrations) => {
                info!(count = integrations.len(), "Checking integrations for their status");
                integrations.into_iter().for_each(|integration| {
                    self.enqueue(Command::Check {
                        id: integration.id,
                        trigger: Trigger::Scan,
                    });
                });
            }
            Err(e) => error!(error = %e, "Startup scan failed"),
        }
    }

    pub(crate) async fn handle(&mut self, command: Command) {
        match command {
            Command::Check { id, trigger } => self.handle_check(id, trigger).await,
            Command::Dispatch { id, handler } => self.dispatch(id, handler).await,
            Command::InFlight(reply) => {
                let mut keys: Vec<MarkerKey> = self.markers.iter().cloned().collect();
                keys.sort_by(|a, b| (a.id.as_str(), a.desired).cmp(&(b.id.as_str(), b.desired)));
                if reply.send(keys).is_err() {
                    debug!("In-flight query dropped before reply");
                }
            }
        }
    }

    async fn handle_check(&mut self, id: IntegrationId, trigger: Trigger) {
        if trigger == Trigger::FollowUp {
            self.pending_timers.remove(&id);
        }

        let integration = match self.store.fetch(&id).await {
            Ok(Some(integration)) => integration,
            Ok(None) => {
                debug!(integration_id = %id, %trigger, "Integration gone, skipping check");
                return;
            }
            Err(e) => {
                warn!(integration_id = %id, %trigger, error = %e, "Could not fetch integration");
                return;
            }
        };

        // Notifications for a resource with a convergence attempt under way
        // are left to its follow-up timer.
        if trigger == Trigger::Notification {
            if let Some(desired) = integration.desired_state {
                if self.markers.contains(&MarkerKey::new(desired, id.clone())) {
                    debug!(integration_id = %id, "Convergence already in progress");
                    return;
                }
            }
        }

        self.check(&integration);
    }

    /// Decide whether `integration` needs work and queue a dispatch if so.
    pub(crate) fn check(&mut self, integration: &Integration) -> CheckOutcome {
        let Some(desired) = integration.desired_state else {
            return CheckOutcome::NoTarget;
        };

        if integration.is_converged() {
            self.markers.remove_id(&integration.id);
            self.failures.remove(&integration.id);
            return CheckOutcome::Converged;
        }

        let Some(handler) = self.registry.lookup(desired) else {
            debug!(integration_id = %integration.id, desired = %desired, "No handler for desired state");
            return CheckOutcome::Unhandled;
        };

        info!(
            integration_id = %integration.id,
            desired = %desired,
            current = integration.current_state.map_or("[none]", |s| s.as_str()),
            handler = handler.name(),
            "Desired state differs from current state, dispatching"
        );
        self.enqueue(Command::Dispatch {
            id: integration.id.clone(),
            handler,
        });
        CheckOutcome::Dispatched
    }

    async fn dispatch(&mut self, id: IntegrationId, handler: Arc<dyn StatusHandler>) {
        // A store that cannot be read is a transient failure, not a stale dispatch.
        let integration = match self.store.fetch(&id).await {
            Ok(integration) => integration,
            Err(e) => {
                let failures = self.count_failure(&id);
                warn!(integration_id = %id, failures, error = %e, "Could not fetch integration for dispatch");
                self.arm_follow_up(id);
                return;
            }
        };

        let Some((integration, key)) = self.fresh_target(integration, handler.as_ref()) else {
            debug!(integration_id = %id, handler = handler.name(), "Dispatch is stale, skipping");
            return;
        };

        // Attempts toward a previous desired state are over.
        self.markers.remove_id(&id);
        self.markers.insert(key);
        info!(integration_id = %id, handler = handler.name(), "Start processing integration");

        let revision = handler.select_revision(&integration);
        let result = match handler.execute(&integration, &revision).await {
            Ok(Some(update)) => {
                let failed = update.failed;
                self.apply(&id, update).await.map(|()| failed)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };

        match result {
            Ok(false) => {
                self.failures.remove(&id);
            }
            Ok(true) => {
                let failures = self.count_failure(&id);
                debug!(integration_id = %id, handler = handler.name(), failures, "Handler reported a failed attempt");
            }
            Err(e) => {
                let failures = self.count_failure(&id);
                error!(
                    integration_id = %id,
                    handler = handler.name(),
                    failures,
                    error = %e,
                    "Error while processing integration status"
                );
                self.record_error(&id, &e).await;
            }
        }

        self.arm_follow_up(id);
    }

    /// Count a consecutive failure for `id`, returning the new count.
    fn count_failure(&mut self, id: &IntegrationId) -> u32 {
        let failures = self.failures.entry(id.clone()).or_insert(0);
        *failures = failures.saturating_add(1);
        *failures
    }

    /// Apply the staleness guard, returning the record and its marker key
    /// when the dispatch should run.
    ///
    /// A stale dispatch clears every marker held for the integration.
    fn fresh_target(
        &mut self,
        integration: Option<Integration>,
        handler: &dyn StatusHandler,
    ) -> Option<(Integration, MarkerKey)> {
        let integration = integration?;
        let desired = integration.desired_state?;
        let key = MarkerKey::new(desired, integration.id.clone());

        if integration.is_converged() || !handler.handles(desired) {
            self.markers.remove_id(&integration.id);
            return None;
        }
        Some((integration, key))
    }

    async fn apply(&self, id: &IntegrationId, update: StatusUpdate) -> Result<()> {
        let Some(mut current) = self.store.fetch(id).await? else {
            warn!(integration_id = %id, "Integration removed while its handler ran");
            return Ok(());
        };

        info!(integration_id = %id, state = %update.state, version = update.version, "Setting status");
        current.apply_status_update(update, Utc::now())?;
        self.store.update(current).await?;
        Ok(())
    }

    async fn record_error(&self, id: &IntegrationId, err: &Error) {
        let recorded = match self.store.fetch(id).await {
            Ok(Some(mut current)) => {
                current.record_error(format!("Error: {err}"), Utc::now());
                self.store.update(current).await.map_err(Error::from)
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = recorded {
            warn!(integration_id = %id, error = %e, "Could not record error status");
        }
    }

    /// Schedule the next check of `id`, replacing any pending one.
    fn arm_follow_up(&mut self, id: IntegrationId) {
        let failures = self.failures.get(&id).copied().unwrap_or(0);
        let delay = self.config.retry.delay(self.config.recheck_interval, failures);

        if let Some(previous) = self.pending_timers.remove(&id) {
            previous.abort();
        }

        let queue = self.queue.clone();
        let timer_id = id.clone();
        let handle = self.timers.spawn(async move {
            tokio::time::sleep(delay).await;
            if queue
                .send(Command::Check {
                    id: timer_id,
                    trigger: Trigger::FollowUp,
                })
                .is_err()
            {
                debug!("Worker queue closed, follow-up dropped");
            }
        });
        debug!(integration_id = %id, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Follow-up armed");
        self.pending_timers.insert(id, handle);
    }

    fn enqueue(&self, command: Command) {
        if self.queue.send(command).is_err() {
            debug!("Worker queue closed, command dropped");
        }
    }

    #[cfg(test)]
    pub(crate) fn markers(&self) -> &InFlightMarkers {
        &self.markers
    }

    #[cfg(test)]
    pub(crate) fn markers_mut(&mut self) -> &mut InFlightMarkers {
        &mut self.markers
    }

    #[cfg(test)]
    pub(crate) fn failures(&self, id: &IntegrationId) -> u32 {
        self.failures.get(id).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn has_follow_up(&self, id: &IntegrationId) -> bool {
        self.pending_timers.contains_key(id)
    }
}

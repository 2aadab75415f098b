//! Controller lifecycle: subscription, worker and shutdown.

use std::sync::Arc;
use std::time::Duration;

use integrator_model::{ChangeEvent, IntegrationId, CHANGE_EVENT_TOPIC};
use integrator_store::{BusMessage, EventBus, ResourceStore, Subscription};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::marker::MarkerKey;
use crate::registry::HandlerRegistry;
use crate::worker::{Command, Trigger, Worker};

/// Drives integrations toward their desired state.
///
/// Checks come from store change notifications, one scan at startup and a
/// follow-up timer armed after every dispatch. All of them run on a single
/// worker task.
pub struct IntegrationController {
    store: Arc<dyn ResourceStore>,
    bus: Arc<EventBus>,
    registry: Arc<HandlerRegistry>,
    config: ControllerConfig,
}

impl IntegrationController {
    /// Create a controller with the default configuration.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        bus: Arc<EventBus>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            config: ControllerConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to change notifications, then start the worker.
    ///
    /// The worker begins with a scan of every stored integration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the configuration is invalid.
    pub async fn start(self) -> Result<ControllerHandle> {
        self.config.validate()?;

        let (queue, commands) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let subscription = self.bus.subscribe(self.config.subscriber_name.clone()).await;
        let listener = tokio::spawn(listen(subscription, queue.clone(), stop_rx.clone()));

        let worker = Worker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.config.clone(),
            queue.clone(),
        );
        let worker = tokio::spawn(worker.run(commands, stop_rx));

        info!(
            subscriber = %self.config.subscriber_name,
            recheck_interval_secs = self.config.recheck_interval.as_secs(),
            handled_states = self.registry.len(),
            "Integration controller started"
        );

        Ok(ControllerHandle {
            queue,
            stop_tx,
            worker,
            listener,
            bus: self.bus,
            subscriber_name: self.config.subscriber_name,
            shutdown_timeout: self.config.shutdown_timeout,
        })
    }
}

/// Handle to a running controller.
pub struct ControllerHandle {
    queue: mpsc::UnboundedSender<Command>,
    stop_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
    listener: JoinHandle<()>,
    bus: Arc<EventBus>,
    subscriber_name: String,
    shutdown_timeout: Duration,
}

impl ControllerHandle {
    /// Queue a check of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ControllerStopped`] once the worker is gone.
    pub fn request_check(&self, id: IntegrationId) -> Result<()> {
        self.queue
            .send(Command::Check {
                id,
                trigger: Trigger::Manual,
            })
            .map_err(|_| Error::ControllerStopped)
    }

    /// Convergence attempts currently marked in flight.
    ///
    /// Answered by the worker after everything queued before this call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ControllerStopped`] once the worker is gone.
    pub async fn in_flight(&self) -> Result<Vec<MarkerKey>> {
        let (reply, response) = oneshot::channel();
        self.queue
            .send(Command::InFlight(reply))
            .map_err(|_| Error::ControllerStopped)?;
        response.await.map_err(|_| Error::ControllerStopped)
    }

    /// Check if the worker is still running.
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop the controller.
    ///
    /// Unsubscribes from notifications, cancels pending follow-ups and waits
    /// up to the shutdown timeout for the running command before aborting it.
    pub async fn stop(self) {
        let Self {
            stop_tx,
            mut worker,
            listener,
            bus,
            subscriber_name,
            shutdown_timeout,
            ..
        } = self;

        bus.unsubscribe(&subscriber_name).await;
        if stop_tx.send(true).is_err() {
            debug!("Controller tasks already gone");
        }
        listener.abort();

        match tokio::time::timeout(shutdown_timeout, &mut worker).await {
            Ok(Ok(())) => info!("Integration controller stopped"),
            Ok(Err(e)) => warn!(error = %e, "Controller worker ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "In-flight work did not finish in time, aborting"
                );
                worker.abort();
            }
        }
    }
}

/// Forward integration change notifications to the worker.
///
/// Decodes only; never blocks on the worker.
async fn listen(
    mut subscription: Subscription,
    queue: mpsc::UnboundedSender<Command>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            message = subscription.recv() => match message {
                Ok(message) => {
                    let Some(id) = integration_changed(&message) else {
                        continue;
                    };
                    let check = Command::Check {
                        id,
                        trigger: Trigger::Notification,
                    };
                    if queue.send(check).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(subscriber = subscription.name(), error = %e, "Subscription closed");
                    break;
                }
            },
        }
    }
}

/// Id of the integration a bus message reports as changed.
fn integration_changed(message: &BusMessage) -> Option<IntegrationId> {
    if message.topic != CHANGE_EVENT_TOPIC {
        return None;
    }
    match ChangeEvent::from_json(&message.data) {
        Ok(event) => event.integration_id(),
        Err(e) => {
            warn!(data = %message.data, error = %e, "Undecodable change event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use integrator_model::{ChangeAction, Kind};

    use super::*;

    fn message(topic: &str, data: String) -> BusMessage {
        BusMessage {
            topic: topic.to_string(),
            data,
        }
    }

    #[test]
    fn test_integration_change_is_decoded() {
        let id = IntegrationId::new("x");
        let data = ChangeEvent::new(ChangeAction::Updated, Kind::Integration, &id)
            .to_json()
            .unwrap_or_default();

        assert_eq!(integration_changed(&message(CHANGE_EVENT_TOPIC, data)), Some(id));
    }

    #[test]
    fn test_other_kinds_and_topics_are_ignored() {
        let id = IntegrationId::new("c");
        let connection = ChangeEvent::new(ChangeAction::Created, Kind::Connection, &id)
            .to_json()
            .unwrap_or_default();
        assert_eq!(integration_changed(&message(CHANGE_EVENT_TOPIC, connection.clone())), None);
        assert_eq!(integration_changed(&message("other", connection)), None);
        assert_eq!(integration_changed(&message(CHANGE_EVENT_TOPIC, "{not json".to_string())), None);
    }
}

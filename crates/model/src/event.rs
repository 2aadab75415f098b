//! Change notifications emitted by the resource store.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::types::{IntegrationId, Kind};

/// Bus topic change events are published under.
pub const CHANGE_EVENT_TOPIC: &str = "change-event";

/// What happened to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

/// A record of `kind` with `id` was created, updated or deleted.
///
/// Fields are optional on the wire; consumers ignore events missing either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "event")]
    pub action: ChangeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ChangeEvent {
    /// Create an event for a record.
    pub fn new(action: ChangeAction, kind: Kind, id: &IntegrationId) -> Self {
        Self {
            action,
            kind: Some(kind.model_name().to_string()),
            id: Some(id.as_str().to_string()),
        }
    }

    /// Parsed kind, if present and known.
    pub fn kind(&self) -> Option<Kind> {
        self.kind.as_deref().and_then(|k| k.parse().ok())
    }

    /// Id of the integration this event is about, if it is about one.
    pub fn integration_id(&self) -> Option<IntegrationId> {
        match self.kind() {
            Some(Kind::Integration) => self.id.as_deref().map(IntegrationId::new),
            _ => None,
        }
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidEvent`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ModelError::invalid_event(e.to_string()))
    }

    /// Decode from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidEvent`] for malformed payloads.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| ModelError::invalid_event(e.to_string()))
    }
}

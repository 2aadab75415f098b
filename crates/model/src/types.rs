//! Core types for the model crate.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ModelError;

/// Unique identifier for an integration.
///
/// Ids are opaque strings handed out by the store; freshly created
/// integrations get a ULID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationId(String);

impl IntegrationId {
    /// Create an id from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a new random id.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IntegrationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle states of an integration, used both for desired and observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntegrationState {
    /// Being authored, not deployed.
    Draft,
    /// A convergence attempt is under way.
    Pending,
    /// Deployed and running.
    Active,
    /// Operator wants it stopped.
    Inactive,
    /// Scaled to zero.
    Undeployed,
    /// Marked for removal.
    Deleted,
}

impl IntegrationState {
    /// All states, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Draft,
        Self::Pending,
        Self::Active,
        Self::Inactive,
        Self::Undeployed,
        Self::Deleted,
    ];

    /// Check whether this observed state fulfils the desired one.
    ///
    /// Teardown reports `Undeployed`, which fulfils both `Inactive` and `Draft`.
    pub fn satisfies(self, desired: Self) -> bool {
        self == desired
            || matches!(
                (self, desired),
                (Self::Undeployed, Self::Inactive | Self::Draft)
            )
    }

    /// State name as written in records and marker keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::Undeployed => "Undeployed",
            Self::Deleted => "Deleted",
        }
    }
}

impl std::fmt::Display for IntegrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModelError::UnknownState(s.to_string()))
    }
}

/// Kind of record held by the resource store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    Integration,
    Connection,
    Connector,
    Extension,
}

impl Kind {
    /// Model name used on the wire.
    pub const fn model_name(self) -> &'static str {
        match self {
            Self::Integration => "integration",
            Self::Connection => "connection",
            Self::Connector => "connector",
            Self::Extension => "extension",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.model_name())
    }
}

impl FromStr for Kind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integration" => Ok(Self::Integration),
            "connection" => Ok(Self::Connection),
            "connector" => Ok(Self::Connector),
            "extension" => Ok(Self::Extension),
            _ => Err(ModelError::UnknownKind(s.to_string())),
        }
    }
}

/// Credential an integration is deployed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Raw token value.
    pub value: String,
    /// When the token stops being accepted, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Create a token without an expiry.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Set the expiry.
    #[must_use]
    pub const fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if the token is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_state_round_trips_through_name() {
        for state in IntegrationState::ALL {
            assert_eq!(state.as_str().parse::<IntegrationState>().ok(), Some(state));
        }
        assert!("Running".parse::<IntegrationState>().is_err());
    }

    #[test]
    fn test_undeployed_satisfies_teardown_targets() {
        assert!(IntegrationState::Undeployed.satisfies(IntegrationState::Inactive));
        assert!(IntegrationState::Undeployed.satisfies(IntegrationState::Draft));
        assert!(!IntegrationState::Undeployed.satisfies(IntegrationState::Active));
        assert!(!IntegrationState::Pending.satisfies(IntegrationState::Active));
        assert!(IntegrationState::Active.satisfies(IntegrationState::Active));
    }

    #[test]
    fn test_kind_parses_model_names() {
        assert_eq!("integration".parse::<Kind>().ok(), Some(Kind::Integration));
        assert_eq!("Connector".parse::<Kind>().ok(), Some(Kind::Connector));
        assert!("user".parse::<Kind>().is_err());
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let token = AccessToken::new("abc");
        assert!(!token.is_expired(now));

        let expired = AccessToken::new("abc").expiring_at(now - chrono::Duration::seconds(1));
        assert!(expired.is_expired(now));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(IntegrationId::generate(), IntegrationId::generate());
        assert_eq!(IntegrationId::from("i-1").to_string(), "i-1");
    }
}

//! Core types used across the bridge
//!
//! Identities, correlation tags and decoded push events.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Correlation tag carried in the `syncId` field
pub type Tag = u64;

/// Account id of one logical bot session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(u64);

impl Identity {
    /// Create an identity from a raw account id
    pub const fn new(id: u64) -> Self {
        Identity(id)
    }

    /// Raw account id
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Identity {
    fn from(id: u64) -> Self {
        Identity(id)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Identity)
            .map_err(|e| Error::InvalidInput(format!("Invalid identity '{}': {}", s, e)))
    }
}

/// A push event decoded from an inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type name (the `type` field, e.g. `GroupMessage`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Identity that received the event
    pub self_id: Identity,
    /// Full event payload, including `self_id`
    pub payload: serde_json::Value,
}

impl Event {
    /// Whether this event carries a message chain
    pub fn is_message(&self) -> bool {
        self.kind.ends_with("Message")
    }
}

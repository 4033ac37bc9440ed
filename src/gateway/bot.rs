//! Bot handle - one identity's view of the call gateway

use serde_json::Value;

use super::call::CallGateway;
use super::protocol::Subcommand;
use crate::core::Identity;
use crate::error::Result;

/// Handle passed to event handlers and lifecycle hooks
#[derive(Debug, Clone)]
pub struct Bot {
    identity: Identity,
    gateway: CallGateway,
}

impl Bot {
    /// Create a handle for `identity`
    pub fn new(identity: Identity, gateway: CallGateway) -> Self {
        Bot { identity, gateway }
    }

    /// Identity this bot acts as
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Issue a call as this bot
    pub async fn call(&self, verb: &str, subcommand: Option<Subcommand>, params: Value) -> Result<Value> {
        self.gateway.call(self.identity, verb, subcommand, params).await
    }
}

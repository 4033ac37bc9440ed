//! Call gateway - outbound calls as correlated request/response exchanges
//!
//! A call looks up the identity's live session, registers a waiter under a
//! fresh tag, sends the envelope and suspends until the receive loop
//! resolves the tag or the call timeout expires.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::correlation::CorrelationStore;
use super::protocol::{normalize_params, response_data, snake_to_camel, OutboundEnvelope, Subcommand};
use super::registry::ConnectionRegistry;
use crate::core::{Identity, Tag};
use crate::error::{Error, Result};

/// Outward-facing call API, cheap to clone
#[derive(Debug, Clone)]
pub struct CallGateway {
    registry: Arc<ConnectionRegistry>,
    store: Arc<CorrelationStore>,
    timeout: Duration,
}

impl CallGateway {
    /// Create a gateway over a registry and correlation store
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<CorrelationStore>, timeout: Duration) -> Self {
        CallGateway {
            registry,
            store,
            timeout,
        }
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a call on behalf of `identity`.
    ///
    /// `verb` and the top-level keys of `params` are normalized from
    /// snake_case. `params` must be a JSON object or null. On success the
    /// response's `data` object is returned.
    ///
    /// Sending the envelope and waiting for the response share one deadline
    /// of the configured timeout. A send still stuck at the deadline marks
    /// the connection faulted.
    pub async fn call(
        &self,
        identity: Identity,
        verb: &str,
        subcommand: Option<Subcommand>,
        params: Value,
    ) -> Result<Value> {
        let session = self
            .registry
            .get(identity)
            .await
            .ok_or(Error::NotConnected(identity))?;

        let content = match params {
            Value::Object(map) => normalize_params(map),
            Value::Null => Map::new(),
            other => {
                return Err(Error::InvalidInput(format!(
                    "Call parameters must be an object, got {}",
                    other
                )))
            }
        };

        let tag = self.store.allocate_tag();
        let waiter = self.store.register(tag)?;

        let envelope = OutboundEnvelope {
            sync_id: tag,
            command: snake_to_camel(verb),
            subcommand,
            content,
        };
        let text = serde_json::to_string(&envelope)?;

        debug!("Call {} -> {}: {}", tag, identity, text);
        let deadline = Instant::now() + self.timeout;
        match tokio::time::timeout_at(deadline, session.send(text)).await {
            Ok(sent) => sent?,
            Err(_) => {
                warn!("Send of call {} to {} stalled past {:?}", tag, identity, self.timeout);
                session.mark_faulted();
                return Err(self.timed_out(tag));
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let frame = self
            .store
            .await_response(waiter, remaining)
            .await
            .map_err(|e| match e {
                Error::CallTimeout { tag, .. } => self.timed_out(tag),
                other => other,
            })?;
        debug!("Call {} <- {}: {}", tag, identity, frame);

        response_data(frame)
    }

    fn timed_out(&self, tag: Tag) -> Error {
        Error::CallTimeout {
            tag,
            timeout: self.timeout,
        }
    }
}

//! Collaborator traits - the seams the bridge calls into
//!
//! The bridge owns connections and correlation; everything else is supplied
//! by the host through these traits:
//! - `EventDecoder` turns a push frame's `data` object into an [`Event`]
//! - `EventHandler` processes a decoded event with the session's [`Bot`]
//! - `LifecycleHooks` observes sessions coming up and going down

use async_trait::async_trait;
use serde_json::Value;

use super::types::{Event, Identity};
use crate::error::{Error, Result};
use crate::gateway::Bot;

/// Decodes the `data` object of a push frame
pub trait EventDecoder: Send + Sync {
    /// Decode an event received by `identity`
    fn decode(&self, identity: Identity, data: Value) -> Result<Event>;
}

/// Default decoder: reads the `type` field and keeps the raw payload
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventDecoder;

impl EventDecoder for JsonEventDecoder {
    fn decode(&self, identity: Identity, data: Value) -> Result<Event> {
        let mut payload = match data {
            Value::Object(map) => map,
            other => {
                return Err(Error::Decode(format!(
                    "Event payload must be an object, got {}",
                    other
                )))
            }
        };

        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Decode("Event payload has no 'type' field".to_string()))?
            .to_string();

        payload.insert("self_id".to_string(), Value::from(identity.get()));

        Ok(Event {
            kind,
            self_id: identity,
            payload: Value::Object(payload),
        })
    }
}

/// Entry point of the host's event pipeline
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one push event
    async fn process_event(&self, bot: Bot, event: Event) -> Result<()>;
}

/// Orchestrator callbacks fired by transport sessions
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// A session completed its handshake and is registered.
    ///
    /// Runs alongside the receive loop, so calls through `bot` get their
    /// responses. Dropped if the connection ends first.
    async fn on_connect(&self, bot: &Bot) {
        let _ = bot;
    }

    /// A previously connected session went away
    async fn on_disconnect(&self, bot: &Bot) {
        let _ = bot;
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_decoder_merges_self_id() {
        let event = JsonEventDecoder
            .decode(
                Identity::new(123456),
                json!({"type": "FriendMessage", "sender": {"id": 1}}),
            )
            .unwrap();

        assert_eq!(event.kind, "FriendMessage");
        assert_eq!(event.self_id, Identity::new(123456));
        assert_eq!(event.payload["self_id"], json!(123456));
        assert_eq!(event.payload["sender"]["id"], json!(1));
        assert!(event.is_message());
    }

    #[test]
    fn test_json_decoder_rejects_untyped_payload() {
        let err = JsonEventDecoder
            .decode(Identity::new(1), json!({"sender": 1}))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = JsonEventDecoder
            .decode(Identity::new(1), json!([1, 2]))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}

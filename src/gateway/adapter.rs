//! Adapter - brings up one transport session per configured identity
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use mirai_bridge::{Adapter, BridgeConfig, Bot, Event, EventHandler, Result};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl EventHandler for Echo {
//!     async fn process_event(&self, _bot: Bot, event: Event) -> Result<()> {
//!         println!("{}: {}", event.kind, event.payload);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example(config: BridgeConfig) -> Result<()> {
//! let adapter = Adapter::new(config, Arc::new(Echo));
//! adapter.start().await?;
//! // ...
//! adapter.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::bot::Bot;
use super::call::CallGateway;
use super::correlation::CorrelationStore;
use super::dispatcher::EventDispatcher;
use super::registry::ConnectionRegistry;
use super::session::{SessionContext, SessionExit, SessionState, TransportSession};
use super::transport::{Connector, WebSocketConnector};
use crate::config::BridgeConfig;
use crate::core::{EventDecoder, EventHandler, Identity, JsonEventDecoder, LifecycleHooks, NoopHooks};
use crate::error::{Error, Result};

/// Adapter name reported to hosts
pub const ADAPTER_NAME: &str = "mirai V2";

struct SessionTask {
    state: watch::Receiver<SessionState>,
    handle: JoinHandle<SessionExit>,
}

/// Orchestrates sessions for every configured identity
pub struct Adapter {
    config: Arc<BridgeConfig>,
    registry: Arc<ConnectionRegistry>,
    store: Arc<CorrelationStore>,
    gateway: CallGateway,
    handler: Arc<dyn EventHandler>,
    decoder: Arc<dyn EventDecoder>,
    hooks: Arc<dyn LifecycleHooks>,
    connector: Arc<dyn Connector>,
    shutdown: watch::Sender<bool>,
    sessions: Mutex<HashMap<Identity, SessionTask>>,
}

impl Adapter {
    /// Create an adapter with the websocket connector, the JSON event
    /// decoder and no lifecycle hooks
    pub fn new(config: BridgeConfig, handler: Arc<dyn EventHandler>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(CorrelationStore::new());
        let gateway = CallGateway::new(registry.clone(), store.clone(), config.api_timeout);
        let (shutdown, _) = watch::channel(false);

        Adapter {
            config,
            registry,
            store,
            gateway,
            handler,
            decoder: Arc::new(JsonEventDecoder),
            hooks: Arc::new(NoopHooks),
            connector: Arc::new(WebSocketConnector),
            shutdown,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different event decoder
    pub fn with_decoder(mut self, decoder: Arc<dyn EventDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Observe sessions connecting and disconnecting
    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Use a different transport
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Adapter name
    pub fn name(&self) -> &'static str {
        ADAPTER_NAME
    }

    /// Configuration in use
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Spawn a session for every configured identity
    pub async fn start(&self) -> Result<()> {
        if *self.shutdown.borrow() {
            return Err(Error::Internal("Adapter has been shut down".to_string()));
        }

        let mut sessions = self.sessions.lock().await;
        if !sessions.is_empty() {
            return Err(Error::Internal("Adapter already started".to_string()));
        }

        let ctx = Arc::new(SessionContext {
            config: self.config.clone(),
            connector: self.connector.clone(),
            registry: self.registry.clone(),
            store: self.store.clone(),
            dispatcher: EventDispatcher::new(self.handler.clone()),
            decoder: self.decoder.clone(),
            hooks: self.hooks.clone(),
            gateway: self.gateway.clone(),
        });

        for &identity in &self.config.identities {
            if sessions.contains_key(&identity) {
                warn!("Identity {} configured twice, starting one session", identity);
                continue;
            }

            let session = TransportSession::new(identity, ctx.clone(), self.shutdown.subscribe());
            let state = session.subscribe();
            let handle = tokio::spawn(session.run());
            sessions.insert(identity, SessionTask { state, handle });
        }

        info!(
            "{} adapter started {} session(s) against {}:{}",
            ADAPTER_NAME,
            sessions.len(),
            self.config.host,
            self.config.port
        );
        Ok(())
    }

    /// Signal every session to stop and wait for all of them.
    ///
    /// Each session closes its channel and leaves the registry before its
    /// task ends.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let sessions: Vec<_> = self.sessions.lock().await.drain().collect();
        for (identity, task) in sessions {
            match task.handle.await {
                Ok(exit) => info!("Session {} stopped: {:?}", identity, exit),
                Err(e) => error!("Session {} task failed: {}", identity, e),
            }
        }
    }

    /// Call API for application code
    pub fn gateway(&self) -> CallGateway {
        self.gateway.clone()
    }

    /// Handle for issuing calls as `identity`
    pub fn bot(&self, identity: Identity) -> Bot {
        Bot::new(identity, self.gateway.clone())
    }

    /// Current state of `identity`'s session, if one was started
    pub async fn session_state(&self, identity: Identity) -> Option<SessionState> {
        self.sessions
            .lock()
            .await
            .get(&identity)
            .map(|task| *task.state.borrow())
    }

    /// Whether `identity`'s session task is still running
    pub async fn is_running(&self, identity: Identity) -> bool {
        self.sessions
            .lock()
            .await
            .get(&identity)
            .map_or(false, |task| !task.handle.is_finished())
    }

    /// Whether `identity` currently has a live connection
    pub async fn is_connected(&self, identity: Identity) -> bool {
        self.registry.is_connected(identity).await
    }

    /// Identities with a live connection
    pub async fn connected(&self) -> Vec<Identity> {
        self.registry.identities().await
    }

    /// Number of calls awaiting a response
    pub fn pending_calls(&self) -> usize {
        self.store.pending_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Event;
    use crate::gateway::transport::mock::MockConnector;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Event>);

    #[async_trait]
    impl EventHandler for Forward {
        async fn process_event(&self, bot: Bot, event: Event) -> Result<()> {
            assert_eq!(bot.identity(), event.self_id);
            let _ = self.0.send(event);
            Ok(())
        }
    }

    fn config(identities: &[u64]) -> BridgeConfig {
        BridgeConfig {
            verify_key: SecretString::from("secret".to_string()),
            identities: identities.iter().copied().map(Identity::new).collect(),
            api_timeout: Duration::from_secs(5),
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_call_end_to_end() {
        let (connector, mut peers) = MockConnector::new();
        let (tx, mut events) = mpsc::unbounded_channel();
        let adapter = Adapter::new(config(&[123456]), Arc::new(Forward(tx))).with_connector(connector);
        assert_eq!(adapter.name(), "mirai V2");

        adapter.start().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        peer.accept();

        let mut state = adapter.sessions.lock().await[&Identity::new(123456)].state.clone();
        state.wait_for(|s| *s == SessionState::Open).await.unwrap();
        assert!(adapter.is_connected(Identity::new(123456)).await);
        assert_eq!(adapter.session_state(Identity::new(123456)).await, Some(SessionState::Open));

        let bot = adapter.bot(Identity::new(123456));
        let call = tokio::spawn(async move {
            bot.call(
                "send_friend_message",
                None,
                json!({"target": 1, "message_chain": [{"type": "Plain", "text": "hi"}]}),
            )
            .await
        });

        let envelope = peer.recv_json().await;
        assert_eq!(
            envelope,
            json!({
                "syncId": 0,
                "command": "sendFriendMessage",
                "subcommand": null,
                "content": {"target": 1, "messageChain": [{"type": "Plain", "text": "hi"}]}
            })
        );
        peer.push(json!({"syncId": 0, "data": {"code": 0, "messageId": 1}}));
        assert_eq!(call.await.unwrap().unwrap(), json!({"code": 0, "messageId": 1}));
        assert_eq!(adapter.pending_calls(), 0);

        peer.push(json!({"syncId": "-1", "data": {"type": "FriendMessage"}}));
        assert_eq!(events.recv().await.unwrap().kind, "FriendMessage");

        adapter.shutdown().await;
        assert!(adapter.connected().await.is_empty());
        assert_eq!(adapter.session_state(Identity::new(123456)).await, None);
    }

    #[tokio::test]
    async fn test_one_session_per_identity() {
        let (connector, mut peers) = MockConnector::new();
        let (tx, _events) = mpsc::unbounded_channel();
        let adapter = Adapter::new(config(&[1, 2, 1]), Arc::new(Forward(tx)))
            .with_connector(connector.clone());

        adapter.start().await.unwrap();
        let mut seen = vec![peers.recv().await.unwrap(), peers.recv().await.unwrap()];
        seen.sort_by_key(|peer| peer.identity);
        assert_eq!(seen[0].identity, Identity::new(1));
        assert_eq!(seen[1].identity, Identity::new(2));
        assert_eq!(connector.attempts(), 2);

        assert!(adapter.start().await.is_err());
        adapter.shutdown().await;
        assert!(adapter.start().await.is_err());
    }

    #[tokio::test]
    async fn test_calls_are_scoped_to_identity() {
        let (connector, mut peers) = MockConnector::new();
        let (tx, _events) = mpsc::unbounded_channel();
        let adapter = Adapter::new(config(&[1]), Arc::new(Forward(tx))).with_connector(connector);
        adapter.start().await.unwrap();
        let peer = peers.recv().await.unwrap();
        peer.accept();

        let err = adapter
            .gateway()
            .call(Identity::new(2), "about", None, serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected(id) if id == Identity::new(2)));

        adapter.shutdown().await;
    }
}

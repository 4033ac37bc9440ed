//! Transport session - one identity's connection lifecycle
//!
//! ```text
//!   Connecting ──► Authenticating ──► Open ──► Closing ──► Closed
//!       ▲                │                                   │
//!       │                └── rejected: stop for good         │
//!       └──────────── after reconnect interval ◄─────────────┘
//! ```
//!
//! The session task is the only reader of its channel and the only writer
//! of its identity's registry slot. Transport faults never escape the task;
//! they end the current connection and start the reconnect cycle. A rejected
//! handshake or a shutdown request ends the task.

use std::sync::Arc;

use backoff::backoff::{Backoff, Constant};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::bot::Bot;
use super::call::CallGateway;
use super::correlation::CorrelationStore;
use super::dispatcher::EventDispatcher;
use super::protocol::{classify, HandshakeOutcome, InboundFrame};
use super::registry::{ConnectionRegistry, SessionHandle};
use super::transport::{Connector, DuplexChannel, FrameSink, FrameStream, HandshakeRequest};
use crate::config::BridgeConfig;
use crate::core::{EventDecoder, Identity, LifecycleHooks};
use crate::error::{Error, Result};

/// Lifecycle state of a transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the duplex channel
    Connecting,
    /// Waiting for the handshake result frame
    Authenticating,
    /// Registered and receiving
    Open,
    /// Tearing the connection down
    Closing,
    /// No connection; waiting to reconnect, or finished
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Authenticating => write!(f, "authenticating"),
            SessionState::Open => write!(f, "open"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Why one connection attempt ended
#[derive(Debug)]
pub enum SessionExit {
    /// Transient fault; try again after the reconnect interval
    Reconnect(Error),
    /// Gateway refused the identity; never retried
    Rejected(Error),
    /// Shutdown was requested
    Shutdown,
}

impl SessionExit {
    /// Whether the session loop should stop
    pub fn is_final(&self) -> bool {
        !matches!(self, SessionExit::Reconnect(_))
    }
}

/// Collaborators shared by every session of an adapter
pub struct SessionContext {
    /// Endpoint and timer settings
    pub config: Arc<BridgeConfig>,
    /// Opens connections
    pub connector: Arc<dyn Connector>,
    /// Live sessions by identity
    pub registry: Arc<ConnectionRegistry>,
    /// Outstanding calls
    pub store: Arc<CorrelationStore>,
    /// Push event fan-out
    pub dispatcher: EventDispatcher,
    /// Push payload decoding
    pub decoder: Arc<dyn EventDecoder>,
    /// Orchestrator callbacks
    pub hooks: Arc<dyn LifecycleHooks>,
    /// Call API handed to bots
    pub gateway: CallGateway,
}

/// One identity's long-lived connection task
pub struct TransportSession {
    identity: Identity,
    ctx: Arc<SessionContext>,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<SessionState>,
    connections: u64,
}

impl TransportSession {
    /// Create a session; it does nothing until [`run`](Self::run)
    pub fn new(identity: Identity, ctx: Arc<SessionContext>, shutdown: watch::Receiver<bool>) -> Self {
        let (state, _) = watch::channel(SessionState::Closed);
        TransportSession {
            identity,
            ctx,
            shutdown,
            state,
            connections: 0,
        }
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Drive the connect/receive/reconnect cycle until rejected or shut down
    pub async fn run(mut self) -> SessionExit {
        let mut delay = Constant::new(self.ctx.config.reconnect_interval);

        loop {
            let exit = self.connect_once().await;
            self.transition(SessionState::Closed);

            let cause = match exit {
                SessionExit::Reconnect(cause) => cause,
                final_exit => {
                    debug!("Session {} finished: {:?}", self.identity, final_exit);
                    return final_exit;
                }
            };

            let wait = delay
                .next_backoff()
                .unwrap_or(self.ctx.config.reconnect_interval);
            debug!(
                "Session {} reconnecting in {:?} after: {}",
                self.identity, wait, cause
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_requested(&mut self.shutdown) => return SessionExit::Shutdown,
            }
        }
    }

    /// One pass through Connecting -> ... -> Closing
    async fn connect_once(&mut self) -> SessionExit {
        self.transition(SessionState::Connecting);

        let request = match self.handshake_request() {
            Ok(request) => request,
            Err(e) => return SessionExit::Reconnect(e),
        };

        let connected = tokio::select! {
            result = self.ctx.connector.connect(&request) => result,
            _ = shutdown_requested(&mut self.shutdown) => return SessionExit::Shutdown,
        };
        let DuplexChannel { mut sink, mut stream } = match connected {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Connecting {} to {} failed: {}", self.identity, request.url, e);
                return SessionExit::Reconnect(e);
            }
        };
        debug!(
            "WebSocket connection to {}?qq={} established",
            request.url, self.identity
        );

        self.transition(SessionState::Authenticating);
        if let Err(exit) = self.authenticate(stream.as_mut()).await {
            close_quietly(sink.as_mut()).await;
            return exit;
        }

        self.connections += 1;
        let handle = Arc::new(SessionHandle::new(self.identity, self.connections, sink));
        self.ctx.registry.insert(handle.clone()).await;
        let bot = Bot::new(self.identity, self.ctx.gateway.clone());

        self.transition(SessionState::Open);
        info!("Bot {} connected", self.identity);

        // The connect hook may issue calls, so it runs alongside the receive
        // loop. A hook still running when the connection ends is dropped.
        let identity = self.identity;
        let hooks = self.ctx.hooks.clone();
        let exit = {
            let mut connect_hook = hooks.on_connect(&bot).fuse();
            let receive = self.receive_loop(stream.as_mut(), &handle, &bot);
            tokio::pin!(receive);

            loop {
                tokio::select! {
                    exit = &mut receive => break exit,
                    _ = &mut connect_hook => debug!("Connect hook for {} finished", identity),
                }
            }
        };

        self.transition(SessionState::Closing);
        self.ctx
            .registry
            .remove(self.identity, handle.connection_id())
            .await;
        self.ctx.hooks.on_disconnect(&bot).await;
        handle.close().await;
        info!("Bot {} disconnected", self.identity);

        exit
    }

    /// Read the handshake result; `Err` carries how the attempt ends
    async fn authenticate(&mut self, stream: &mut dyn FrameStream) -> std::result::Result<(), SessionExit> {
        let first = tokio::select! {
            frame = stream.next_frame() => frame,
            _ = shutdown_requested(&mut self.shutdown) => return Err(SessionExit::Shutdown),
        };

        let text = match first {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(SessionExit::Reconnect(e)),
            None => {
                return Err(SessionExit::Reconnect(Error::Connection(
                    "Connection closed during handshake".to_string(),
                )))
            }
        };

        match HandshakeOutcome::from_frame(&text) {
            Ok(HandshakeOutcome::Accepted) => Ok(()),
            Ok(HandshakeOutcome::Rejected { code, message }) => {
                warn!("{}: {}", message, self.identity);
                Err(SessionExit::Rejected(Error::HandshakeRejected {
                    identity: self.identity,
                    code,
                    message,
                }))
            }
            Err(e) => {
                warn!("Unreadable handshake frame for {}: {}", self.identity, e);
                Err(SessionExit::Reconnect(e))
            }
        }
    }

    /// Classify frames in arrival order until the connection ends
    async fn receive_loop(
        &mut self,
        stream: &mut dyn FrameStream,
        handle: &SessionHandle,
        bot: &Bot,
    ) -> SessionExit {
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => return SessionExit::Shutdown,
                _ = handle.faulted() => {
                    return SessionExit::Reconnect(Error::Connection(
                        "Send failed on connection".to_string(),
                    ))
                }
                frame = stream.next_frame() => frame,
            };

            match frame {
                None => {
                    warn!("Gateway closed the connection for {}", self.identity);
                    return SessionExit::Reconnect(Error::Connection(
                        "Connection closed by gateway".to_string(),
                    ));
                }
                Some(Err(Error::Decode(e))) => {
                    warn!("Skipping unreadable frame for {}: {}", self.identity, e);
                }
                Some(Err(e)) => {
                    warn!("Read error on {}: {}", self.identity, e);
                    return SessionExit::Reconnect(e);
                }
                Some(Ok(text)) => self.route(&text, bot),
            }
        }
    }

    /// Send a response to its waiter or an event to the dispatcher
    fn route(&self, text: &str, bot: &Bot) {
        debug!("Frame <- {}: {}", self.identity, text);

        match classify(text) {
            Ok(InboundFrame::Response { tag, frame }) => {
                self.ctx.store.resolve(tag, frame);
            }
            Ok(InboundFrame::Push { data }) => match self.ctx.decoder.decode(self.identity, data) {
                Ok(event) => {
                    self.ctx.dispatcher.dispatch(bot.clone(), event);
                }
                Err(e) => warn!("Failed to decode event for {}: {}", self.identity, e),
            },
            Err(e) => warn!("Skipping frame for {}: {}", self.identity, e),
        }
    }

    fn handshake_request(&self) -> Result<HandshakeRequest> {
        Ok(HandshakeRequest {
            url: self.ctx.config.endpoint_url()?,
            identity: self.identity,
            verify_key: self.ctx.config.verify_key.clone(),
            timeout: self.ctx.config.connect_timeout,
        })
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Session {}: {} -> {}", self.identity, previous, next);
        }
    }
}

/// Resolves once shutdown is signalled or the signal's sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn close_quietly(sink: &mut dyn FrameSink) {
    if let Err(e) = sink.close().await {
        debug!("Closing channel: {}", e);
    }
}

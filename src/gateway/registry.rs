//! Connection registry - identity to live session
//!
//! Sessions insert their handle once the handshake succeeds and remove it
//! when they start closing. The call gateway only reads.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, warn};

use super::transport::FrameSink;
use crate::core::Identity;
use crate::error::{Error, Result};

/// Write side of one open connection, shared by concurrent callers
pub struct SessionHandle {
    identity: Identity,
    connection_id: u64,
    sink: Mutex<Box<dyn FrameSink>>,
    fault: Notify,
}

impl SessionHandle {
    /// Wrap the write half of a freshly authenticated connection
    pub fn new(identity: Identity, connection_id: u64, sink: Box<dyn FrameSink>) -> Self {
        SessionHandle {
            identity,
            connection_id,
            sink: Mutex::new(sink),
            fault: Notify::new(),
        }
    }

    /// Identity this connection belongs to
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Distinguishes successive connections of the same identity
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Send one text frame.
    ///
    /// A write error marks the connection faulted so its session tears it
    /// down, and is reported to the caller as `SendFailed`.
    pub async fn send(&self, text: String) -> Result<()> {
        let result = self.sink.lock().await.send_text(text).await;
        result.map_err(|e| {
            warn!("Send on session {} failed: {}", self.identity, e);
            self.mark_faulted();
            Error::SendFailed(e.to_string())
        })
    }

    /// Mark the connection broken so its session tears it down
    pub fn mark_faulted(&self) {
        self.fault.notify_one();
    }

    /// Resolves once a send has failed on this connection
    pub async fn faulted(&self) {
        self.fault.notified().await
    }

    /// Close the write half, ignoring errors from an already-dead peer
    pub async fn close(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            debug!("Closing session {} channel: {}", self.identity, e);
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("identity", &self.identity)
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

/// Process-wide map of live sessions
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<Identity, Arc<SessionHandle>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live session, replacing any stale entry for its identity
    pub async fn insert(&self, handle: Arc<SessionHandle>) {
        let previous = self
            .sessions
            .write()
            .await
            .insert(handle.identity(), handle.clone());

        if let Some(previous) = previous {
            warn!(
                "Replaced stale connection {} for {}",
                previous.connection_id(),
                handle.identity()
            );
        }
    }

    /// Remove the entry for `identity` if it still belongs to `connection_id`.
    ///
    /// Returns whether an entry was removed.
    pub async fn remove(&self, identity: Identity, connection_id: u64) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&identity) {
            Some(handle) if handle.connection_id() == connection_id => {
                sessions.remove(&identity);
                true
            }
            _ => false,
        }
    }

    /// Live session for `identity`
    pub async fn get(&self, identity: Identity) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(&identity).cloned()
    }

    /// Whether `identity` has a live session
    pub async fn is_connected(&self, identity: Identity) -> bool {
        self.sessions.read().await.contains_key(&identity)
    }

    /// Identities with a live session, sorted
    pub async fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingSink;

    #[async_trait]
    impl FrameSink for FailingSink {
        async fn send_text(&mut self, _text: String) -> Result<()> {
            Err(Error::Connection("broken pipe".to_string()))
        }

        async fn close(&mut self) -> Result<()> {
            Err(Error::Connection("already closed".to_string()))
        }
    }

    fn handle(id: u64, connection_id: u64) -> Arc<SessionHandle> {
        Arc::new(SessionHandle::new(
            Identity::new(id),
            connection_id,
            Box::new(FailingSink),
        ))
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty().await);

        registry.insert(handle(1, 1)).await;
        registry.insert(handle(2, 1)).await;
        assert_eq!(
            registry.identities().await,
            vec![Identity::new(1), Identity::new(2)]
        );
        assert!(registry.is_connected(Identity::new(1)).await);

        assert!(registry.remove(Identity::new(1), 1).await);
        assert!(!registry.is_connected(Identity::new(1)).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_ignores_other_connection() {
        let registry = ConnectionRegistry::new();
        registry.insert(handle(1, 2)).await;

        assert!(!registry.remove(Identity::new(1), 1).await);
        assert_eq!(
            registry.get(Identity::new(1)).await.unwrap().connection_id(),
            2
        );
    }

    #[tokio::test]
    async fn test_send_failure_marks_fault() {
        let handle = handle(1, 1);
        let err = handle.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::SendFailed(_)));

        // permit is stored, so a later waiter still observes the fault
        tokio::time::timeout(std::time::Duration::from_secs(1), handle.faulted())
            .await
            .expect("fault not signalled");

        handle.close().await;
    }
}

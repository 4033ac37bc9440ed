//! Correlation store - matching call responses to waiting callers
//!
//! ```text
//! Call Flow:
//!   1. allocate_tag()          -> fresh syncId
//!   2. register(tag)           -> Waiter (oneshot receiver), entry stored
//!   3. envelope sent on the session's channel
//!   4. await_response(waiter)  -> suspends the caller only
//!
//! Receive Flow:
//!   5. receive loop classifies a frame as a response
//!   6. resolve(tag, frame)     -> entry removed, waiter fulfilled
//!
//! Timeout Flow:
//!   5. timeout elapses inside await_response
//!   6. entry removed, caller gets CallTimeout
//! ```
//!
//! One store is shared by every identity of an adapter, so tags are unique
//! across all sessions, not just per connection.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::core::Tag;
use crate::error::{Error, Result};

type PendingMap = HashMap<Tag, oneshot::Sender<Value>>;

/// Receiving half of a pending call.
///
/// Dropping a waiter removes its entry from the store, so an entry never
/// outlives the caller waiting on it (timeout, send failure or cancellation).
#[derive(Debug)]
pub struct Waiter {
    tag: Tag,
    receiver: oneshot::Receiver<Value>,
    pending: Arc<Mutex<PendingMap>>,
}

impl Waiter {
    /// Tag this waiter is registered under
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.tag);
    }
}

/// Shared table of outstanding calls
#[derive(Debug, Default)]
pub struct CorrelationStore {
    /// Next tag to hand out
    next_tag: AtomicU64,
    /// tag -> sender that fulfils the waiter
    pending: Arc<Mutex<PendingMap>>,
}

impl CorrelationStore {
    /// Create an empty store; the first tag is 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a fresh tag
    pub fn allocate_tag(&self) -> Tag {
        self.next_tag.fetch_add(1, Ordering::SeqCst)
    }

    /// Create a pending entry for `tag`
    pub fn register(&self, tag: Tag) -> Result<Waiter> {
        let mut pending = lock(&self.pending);
        match pending.entry(tag) {
            Entry::Occupied(_) => Err(Error::DuplicateTag(tag)),
            Entry::Vacant(slot) => {
                let (sender, receiver) = oneshot::channel();
                slot.insert(sender);
                Ok(Waiter {
                    tag,
                    receiver,
                    pending: self.pending.clone(),
                })
            }
        }
    }

    /// Fulfil the waiter for `tag`.
    ///
    /// Returns false when nothing is pending under the tag; such late or
    /// unmatched responses are dropped.
    pub fn resolve(&self, tag: Tag, payload: Value) -> bool {
        let sender = lock(&self.pending).remove(&tag);
        match sender {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    debug!("Waiter for syncId {} went away before its response", tag);
                }
                true
            }
            None => {
                debug!("Discarding response for unknown syncId {}", tag);
                false
            }
        }
    }

    /// Wait for the response to `waiter`, bounded by `timeout`.
    ///
    /// Suspends only the calling task. The entry is gone once this returns.
    pub async fn await_response(&self, mut waiter: Waiter, timeout: Duration) -> Result<Value> {
        let tag = waiter.tag;

        match tokio::time::timeout(timeout, &mut waiter.receiver).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(Error::Internal(format!(
                "Pending entry for syncId {} was dropped without a response",
                tag
            ))),
            Err(_) => {
                debug!("Call with syncId {} timed out after {:?}", tag, timeout);
                Err(Error::CallTimeout { tag, timeout })
            }
        }
    }

    /// Number of outstanding calls
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Whether `tag` is outstanding
    pub fn is_pending(&self, tag: Tag) -> bool {
        lock(&self.pending).contains_key(&tag)
    }
}

fn lock(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    // The map stays consistent even if a holder panicked
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_allocate_is_monotonic() {
        let store = CorrelationStore::new();
        assert_eq!(store.allocate_tag(), 0);
        assert_eq!(store.allocate_tag(), 1);
        assert_eq!(store.allocate_tag(), 2);
    }

    #[test]
    fn test_duplicate_register_fails() {
        let store = CorrelationStore::new();
        let _waiter = store.register(5).unwrap();
        assert!(matches!(store.register(5), Err(Error::DuplicateTag(5))));
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_fulfils_waiter() {
        let store = CorrelationStore::new();
        let tag = store.allocate_tag();
        let waiter = store.register(tag).unwrap();

        assert!(store.resolve(tag, json!({"data": {"code": 0}})));
        let payload = store
            .await_response(waiter, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(payload, json!({"data": {"code": 0}}));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_resolve_is_noop() {
        let store = CorrelationStore::new();
        let waiter = store.register(1).unwrap();

        assert!(!store.resolve(99, json!({})));
        assert_eq!(store.pending_count(), 1);
        assert!(store.is_pending(1));

        store.resolve(1, json!("one"));
        assert_eq!(
            store.await_response(waiter, Duration::from_secs(1)).await.unwrap(),
            json!("one")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let store = CorrelationStore::new();

        for _ in 0..3 {
            let tag = store.allocate_tag();
            let waiter = store.register(tag).unwrap();
            let started = tokio::time::Instant::now();

            let err = store
                .await_response(waiter, Duration::from_millis(500))
                .await
                .unwrap_err();

            assert!(matches!(err, Error::CallTimeout { tag: t, .. } if t == tag));
            let elapsed = started.elapsed();
            assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(510));
            assert_eq!(store.pending_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_leak() {
        let store = Arc::new(CorrelationStore::new());
        let waiter = store.register(3).unwrap();

        let task = {
            let store = store.clone();
            tokio::spawn(async move { store.await_response(waiter, Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(store.pending_count(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(store.pending_count(), 0);

        // a waiter that is never awaited cleans up too
        let waiter = store.register(4).unwrap();
        drop(waiter);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_interleaved_responses_route_by_tag() {
        let store = Arc::new(CorrelationStore::new());
        let mut handles = Vec::new();

        for _ in 0..16 {
            let tag = store.allocate_tag();
            let waiter = store.register(tag).unwrap();
            let store = store.clone();
            handles.push((
                tag,
                tokio::spawn(async move { store.await_response(waiter, Duration::from_secs(5)).await }),
            ));
        }

        // Answer in reverse order
        for (tag, _) in handles.iter().rev() {
            assert!(store.resolve(*tag, json!({ "tag": tag })));
        }

        for (tag, handle) in handles {
            let payload = handle.await.unwrap().unwrap();
            assert_eq!(payload, json!({ "tag": tag }));
        }
        assert_eq!(store.pending_count(), 0);
    }
}

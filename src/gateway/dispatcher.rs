//! Event dispatcher - one independent task per push event
//!
//! Handler errors and panics stay inside the spawned task; neither the
//! receive loop nor other events observe them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::bot::Bot;
use crate::core::{Event, EventHandler};

/// Spawns event handling off the receive loop
#[derive(Clone)]
pub struct EventDispatcher {
    handler: Arc<dyn EventHandler>,
    in_flight: Arc<AtomicUsize>,
}

impl EventDispatcher {
    /// Create a dispatcher around the host's handler
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        EventDispatcher {
            handler,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Hand `event` to the handler on its own task.
    ///
    /// Callers normally drop the returned handle.
    pub fn dispatch(&self, bot: Bot, event: Event) -> JoinHandle<()> {
        let handler = self.handler.clone();
        let guard = InFlight::enter(self.in_flight.clone());

        tokio::spawn(async move {
            let _guard = guard;
            let identity = bot.identity();
            let kind = event.kind.clone();
            debug!("Dispatching {} for {}", kind, identity);

            let outcome = AssertUnwindSafe(handler.process_event(bot, event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Handling {} for {} failed: {}", kind, identity, e),
                Err(panic) => error!(
                    "Handler panicked on {} for {}: {}",
                    kind,
                    identity,
                    panic_message(panic.as_ref())
                ),
            }
        })
    }

    /// Number of events currently being handled
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Counts one event as in flight until dropped, including when its task
/// is aborted
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        InFlight(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

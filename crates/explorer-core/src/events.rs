//! Synchronous listener registry plus broadcast channel for component events.
//!
//! Registry changes and failover transitions are published through an [`EventBus`]. Two
//! consumption styles are supported:
//!
//! - [`EventBus::listen`] registers a callback invoked synchronously, in registration order,
//!   on the emitting task. The returned [`Subscription`] detaches the callback when dropped
//!   or when [`Subscription::unsubscribe`] is called.
//! - [`EventBus::subscribe`] returns a `tokio::sync::broadcast` receiver for async consumers.
//!   Slow receivers observe `Lagged` rather than blocking emitters.

use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tokio::sync::broadcast;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;
type ListenerList<E> = RwLock<Vec<(u64, Listener<E>)>>;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out point for events of type `E`.
pub struct EventBus<E> {
    listeners: Arc<ListenerList<E>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { listeners: Arc::new(RwLock::new(Vec::new())), next_id: AtomicU64::new(0), sender }
    }

    /// Registers a synchronous listener.
    ///
    /// The listener stays attached for as long as the returned [`Subscription`] lives.
    #[must_use = "dropping the subscription detaches the listener immediately"]
    pub fn listen<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));

        let weak: Weak<ListenerList<E>> = Arc::downgrade(&self.listeners);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners.write().retain(|(listener_id, _)| *listener_id != id);
                }
            })),
        }
    }

    /// Returns a broadcast receiver for every subsequently emitted event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Publishes `event` to every listener and broadcast receiver.
    ///
    /// Listeners run on the caller's task after the listener list lock has been released, so
    /// a listener may itself subscribe or unsubscribe.
    pub fn emit(&self, event: E) {
        let snapshot: Vec<Listener<E>> =
            self.listeners.read().iter().map(|(_, listener)| Arc::clone(listener)).collect();

        for listener in snapshot {
            listener(&event);
        }

        // No receivers is not an error for an event bus.
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle that keeps a listener registered.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Detaches the listener now.
    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("attached", &self.detach.is_some()).finish()
    }
}

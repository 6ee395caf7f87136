//! Multi-subscriber notification signals.
//!
//! A [`Signal`] is an explicit subscriber registry: each subscriber gets
//! its own unbounded channel, and [`emit`](Signal::emit) delivers to every
//! live subscriber in registration order without awaiting. Subscriptions
//! unregister themselves on drop, so the registry cannot accumulate dead
//! entries across session cycles.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// A broadcast point for one category of notification.
#[derive(Debug)]
pub struct Signal<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

#[derive(Debug)]
struct Registry<T> {
    next_id: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<T>)>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> Signal<T> {
    /// Create a signal with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Register a new subscriber.
    ///
    /// The subscription receives every emission made after this call, in
    /// emission order, until it is dropped or [`Subscription::unsubscribe`]d.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, tx));

        Subscription {
            id,
            rx,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

impl<T: Clone> Signal<T> {
    /// Deliver `value` to every subscriber in registration order.
    ///
    /// Delivery is synchronous (unbounded send) and never blocks the
    /// emitter. Subscribers whose receiving end has gone away are pruned.
    pub fn emit(&self, value: T) {
        let mut registry = lock(&self.registry);
        registry
            .subscribers
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
    }
}

/// A live registration on a [`Signal`].
///
/// Dropping the subscription removes it from the registry.
#[derive(Debug)]
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Subscription<T> {
    /// Wait for the next emission.
    ///
    /// Returns `None` if the signal itself has been dropped and no further
    /// emissions can occur.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next emission without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::Empty`] when no emission is queued, or
    /// [`TryRecvError::Disconnected`] when the signal has been dropped.
    pub fn try_recv(&mut self) -> std::result::Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    /// Explicitly remove this subscription from the registry.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);
        registry.subscribers.retain(|(id, _)| *id != self.id);
    }
}

fn lock<T>(registry: &Arc<Mutex<Registry<T>>>) -> MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

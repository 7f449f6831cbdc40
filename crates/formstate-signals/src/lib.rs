//! # formstate-signals
//!
//! A small observer list used by form controllers to publish change events.
//! Connecting returns a [`Subscription`]; dropping it or calling
//! [`Subscription::unsubscribe`] disconnects the receiver exactly once.
//!
//! ## Usage
//!
//! ```
//! use formstate_signals::Signal;
//!
//! let signal: Signal<String> = Signal::new();
//!
//! let subscription = signal.subscribe(|msg: &String| {
//!     println!("Received: {msg}");
//! });
//!
//! assert_eq!(signal.send(&"hello".to_string()), 1);
//! subscription.unsubscribe();
//! assert_eq!(signal.send(&"again".to_string()), 0);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// The type signature for a signal receiver callback.
///
/// Receivers must be `Send + Sync` so that signals can be dispatched from
/// any thread.
pub type SignalReceiver<T> = Arc<dyn Fn(&T) + Send + Sync>;

type ReceiverList<T> = RwLock<Vec<(u64, SignalReceiver<T>)>>;

/// A signal that can be subscribed to and dispatched.
///
/// Each signal carries a payload type `T`. Receivers are called in the order
/// they subscribed.
pub struct Signal<T: 'static> {
    receivers: Arc<ReceiverList<T>>,
    next_id: AtomicU64,
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

impl<T: 'static> Signal<T> {
    /// Creates a new signal with no connected receivers.
    pub fn new() -> Self {
        Self {
            receivers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes a receiver to this signal.
    ///
    /// The receiver stays connected until the returned [`Subscription`] is
    /// unsubscribed or dropped.
    #[must_use = "dropping the subscription disconnects the receiver"]
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.receivers
            .write()
            .expect("signal lock poisoned")
            .push((id, Arc::new(callback)));

        let weak: Weak<ReceiverList<T>> = Arc::downgrade(&self.receivers);
        Subscription {
            id,
            release: Some(Box::new(move || {
                if let Some(receivers) = weak.upgrade() {
                    receivers
                        .write()
                        .expect("signal lock poisoned")
                        .retain(|(rid, _)| *rid != id);
                }
            })),
        }
    }

    /// Sends the signal to all connected receivers.
    ///
    /// Receivers are called in subscription order, outside the signal's
    /// lock, so a receiver may subscribe or unsubscribe while being called.
    /// Returns the number of receivers notified.
    pub fn send(&self, payload: &T) -> usize {
        let snapshot: Vec<SignalReceiver<T>> = self
            .receivers
            .read()
            .expect("signal lock poisoned")
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in &snapshot {
            callback(payload);
        }
        snapshot.len()
    }

    /// Returns the number of connected receivers.
    pub fn receiver_count(&self) -> usize {
        self.receivers.read().expect("signal lock poisoned").len()
    }
}

/// A handle that keeps a receiver connected to a [`Signal`].
///
/// Release happens exactly once: either through [`unsubscribe`](Self::unsubscribe)
/// or when the handle is dropped. Releasing after the signal itself is gone
/// is a no-op.
pub struct Subscription {
    id: u64,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Returns the receiver's identifier within its signal.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Disconnects the receiver.
    pub fn unsubscribe(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::trace!(subscription = self.id, "releasing subscription");
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_once();
    }
}

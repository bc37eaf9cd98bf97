//! Consent gate: the current tracking consent plus its observers.
//!
//! `change_consent` updates the value and notifies every subscriber
//! synchronously, in registration order, on the calling thread, all while
//! holding the value's write lock. Writers decide their route under the read
//! lock (see [`ConsentGate::with_current`]), so once `change_consent`
//! returns no write can still be routed by the previous value.
//!
//! Subscribers receive both values and must not call back into the gate's
//! value accessors or `change_consent` from the notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tb_common::{ReadWriteLock, TrackingConsent};
use tracing::info;

/// Observer of consent transitions.
pub trait ConsentSubscriber: Send + Sync {
    fn consent_changed(&self, previous: TrackingConsent, current: TrackingConsent);
}

impl<F> ConsentSubscriber for F
where
    F: Fn(TrackingConsent, TrackingConsent) + Send + Sync,
{
    fn consent_changed(&self, previous: TrackingConsent, current: TrackingConsent) {
        self(previous, current)
    }
}

/// Token returned by [`ConsentGate::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Holder of the tracking consent shared by every feature.
pub struct ConsentGate {
    consent: ReadWriteLock<TrackingConsent>,
    subscribers: Mutex<Vec<(SubscriptionId, Arc<dyn ConsentSubscriber>)>>,
    next_id: AtomicU64,
}

impl ConsentGate {
    pub fn new(initial: TrackingConsent) -> Self {
        ConsentGate {
            consent: ReadWriteLock::new(initial),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn current_value(&self) -> TrackingConsent {
        self.consent.current()
    }

    /// Run `f` with the current value while holding the read lock.
    ///
    /// A consent change waits for `f` to return.
    pub fn with_current<R>(&self, f: impl FnOnce(TrackingConsent) -> R) -> R {
        self.consent.read(|consent| f(*consent))
    }

    /// Register `subscriber`; it is notified after every earlier subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn ConsentSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, subscriber));
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Set the consent and notify subscribers before returning.
    ///
    /// Setting the current value again is a no-op.
    pub fn change_consent(&self, to: TrackingConsent) {
        self.consent.mutate(|consent| {
            let previous = *consent;
            if previous == to {
                return;
            }
            *consent = to;
            info!(target: "tb_storage", from = %previous, to = %to, "tracking consent changed");

            let subscribers: Vec<_> = self
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|(_, subscriber)| Arc::clone(subscriber))
                .collect();
            for subscriber in subscribers {
                subscriber.consent_changed(previous, to);
            }
        });
    }
}

impl std::fmt::Debug for ConsentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentGate")
            .field("consent", &self.current_value())
            .finish_non_exhaustive()
    }
}

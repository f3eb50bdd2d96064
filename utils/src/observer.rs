//! Subscriber lists for consensus events.
//!
//! Subscribers must never be able to influence consensus. Every delivery
//! therefore runs isolated under `catch_unwind`: a subscriber that panics
//! is logged, marked dead and skipped from then on, while delivery to the
//! remaining subscribers continues in registration order. Dead entries are
//! purged the next time the list itself is mutated.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use log::error;

pub trait Subscriber<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

impl<E, F> Subscriber<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        self(event);
    }
}

pub type SubscriberHandle = usize;

struct Entry<E> {
    handle: SubscriberHandle,
    dead: AtomicBool,
    subscriber: Box<dyn Subscriber<E>>,
}

pub struct Notifier<E> {
    entries: Vec<Entry<E>>,
    next_handle: SubscriberHandle,
}

impl<E> Notifier<E> {
    pub fn new() -> Self {
        Notifier {
            entries: Vec::new(),
            next_handle: 0,
        }
    }

    pub fn register<S: Subscriber<E> + 'static>(&mut self, subscriber: S) -> SubscriberHandle {
        self.purge_dead();
        let handle = self.next_handle;
        self.next_handle += 1;
        self.entries.push(Entry {
            handle,
            dead: AtomicBool::new(false),
            subscriber: Box::new(subscriber),
        });
        handle
    }

    pub fn deregister(&mut self, handle: SubscriberHandle) {
        self.entries
            .retain(|entry| entry.handle != handle && !entry.dead.load(Ordering::Relaxed));
    }

    /// Delivers the event to every live subscriber. A panic is contained
    /// to the offending subscriber, which is disabled instead of letting
    /// the unwind reach the caller.
    pub fn notify(&self, event: &E) {
        for entry in &self.entries {
            if entry.dead.load(Ordering::Relaxed) {
                continue;
            }
            let delivery = catch_unwind(AssertUnwindSafe(|| entry.subscriber.on_event(event)));
            if delivery.is_err() {
                error!("event subscriber panicked and has been disabled");
                entry.dead.store(true, Ordering::Relaxed);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.dead.load(Ordering::Relaxed))
    }

    fn purge_dead(&mut self) {
        self.entries
            .retain(|entry| !entry.dead.load(Ordering::Relaxed));
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Notifier::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn it_notifies_registered_subscribers() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut notifier: Notifier<u32> = Notifier::new();

        let c = Arc::clone(&count);
        let handle = notifier.register(move |event: &u32| {
            c.fetch_add(*event as usize, Ordering::SeqCst);
        });

        notifier.notify(&2);
        notifier.notify(&3);
        assert_eq!(count.load(Ordering::SeqCst), 5);

        notifier.deregister(handle);
        notifier.notify(&7);
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(notifier.is_empty());
    }

    #[test]
    fn a_panicking_subscriber_is_disabled_without_poisoning_the_rest() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut notifier: Notifier<u32> = Notifier::new();

        notifier.register(|_event: &u32| {
            panic!("subscriber goes rogue");
        });
        let c = Arc::clone(&count);
        notifier.register(move |_event: &u32| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        // First delivery trips the panic, later ones skip the dead entry;
        // the healthy subscriber sees every event either way.
        notifier.notify(&1);
        notifier.notify(&2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}

//! Fan-out of values to any number of subscribers.
//!
//! A [`Broadcaster`] owns a relay thread fed by an unbounded input channel.
//! The relay forwards every value to each subscription registered at the time
//! it is processed. Subscriptions buffer without bound, so a slow reader
//! never blocks the broadcaster or its siblings.
//!
//! Closing or dropping a subscription unregisters it at once. A slot whose
//! closed flag is set, or whose receiver is gone, is evicted the next time
//! the relay tries to deliver to it. Closing the broadcaster drains the input,
//! closes every subscription, and turns later `send`/`subscribe` calls into
//! no-ops.
//!
//! Delivery order is the relay's processing order, per subscriber. There is
//! no ordering guarantee across subscribers.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

struct Slot<T> {
    tx: flume::Sender<T>,
    closed: Arc<AtomicBool>,
}

impl<T> Slot<T> {
    fn deliver(&self, value: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(value).is_ok()
    }
}

struct Shared<T> {
    subscribers: Mutex<HashMap<u64, Slot<T>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<T> Shared<T> {
    fn shutdown(&self) {
        let mut subs = self.subscribers.lock();
        self.closed.store(true, Ordering::Release);
        for slot in subs.values() {
            slot.closed.store(true, Ordering::Release);
        }
        // Dropping the senders lets each receiver drain what it has and then
        // observe the disconnect.
        subs.clear();
    }
}

/// Relays values to every current [`Subscription`].
pub struct Broadcaster<T> {
    input: Mutex<Option<flume::Sender<T>>>,
    shared: Arc<Shared<T>>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Broadcaster<T>
where
    T: Clone + Send + 'static,
{
    /// Create a broadcaster and start its relay thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the relay thread cannot be spawned.
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = flume::unbounded::<T>();
        let shared = Arc::new(Shared {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let relay_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("deje-broadcast".into())
            .spawn(move || relay(&rx, &relay_shared))?;
        Ok(Self {
            input: Mutex::new(Some(tx)),
            shared,
            relay: Mutex::new(Some(handle)),
        })
    }

    /// Queue a value for delivery. Never blocks; a no-op once closed.
    pub fn send(&self, value: T) {
        if let Some(tx) = self.input.lock().as_ref() {
            if tx.send(value).is_err() {
                trace!("broadcast relay already stopped; value dropped");
            }
        }
    }

    /// Register a new subscription.
    ///
    /// On a closed broadcaster the returned subscription is already closed
    /// and yields nothing.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = flume::unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subs = self.shared.subscribers.lock();
        if self.shared.closed.load(Ordering::Acquire) {
            closed.store(true, Ordering::Release);
        } else {
            subs.insert(
                id,
                Slot {
                    tx,
                    closed: Arc::clone(&closed),
                },
            );
        }
        drop(subs);

        Subscription {
            id,
            rx,
            closed,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of subscriptions currently registered.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Returns `true` once [`Broadcaster::close`] has completed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop accepting values, deliver everything already queued, then close
    /// every subscription. Idempotent.
    pub fn close(&self) {
        drop(self.input.lock().take());
        if let Some(handle) = self.relay.lock().take() {
            if handle.join().is_err() {
                debug!("broadcast relay thread panicked");
            }
        }
        // The relay normally does this on exit; repeat in case it never ran.
        self.shared.shutdown();
    }
}

impl<T> Drop for Broadcaster<T> {
    fn drop(&mut self) {
        drop(self.input.lock().take());
        if let Some(handle) = self.relay.lock().take() {
            let _ = handle.join();
        }
        self.shared.shutdown();
    }
}

impl<T> std::fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.shared.subscribers.lock().len())
            .field("closed", &self.shared.closed.load(Ordering::Acquire))
            .finish()
    }
}

fn relay<T: Clone>(rx: &flume::Receiver<T>, shared: &Shared<T>) {
    for value in rx.iter() {
        // Deliver outside the table lock's critical section: snapshot the
        // senders, then push to each.
        let targets: Vec<(u64, flume::Sender<T>, Arc<AtomicBool>)> = shared
            .subscribers
            .lock()
            .iter()
            .map(|(id, slot)| (*id, slot.tx.clone(), Arc::clone(&slot.closed)))
            .collect();

        let mut evicted = Vec::new();
        for (id, tx, closed) in targets {
            let slot = Slot { tx, closed };
            if !slot.deliver(value.clone()) {
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            let mut subs = shared.subscribers.lock();
            for id in &evicted {
                subs.remove(id);
            }
            debug!(count = evicted.len(), "evicted closed subscriptions");
        }
    }
    shared.shutdown();
}

/// One subscriber's view of a [`Broadcaster`].
pub struct Subscription<T> {
    id: u64,
    rx: flume::Receiver<T>,
    closed: Arc<AtomicBool>,
    shared: Weak<Shared<T>>,
}

impl<T> Subscription<T> {
    /// Block until the next value arrives. `None` once closed and drained.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Take the next buffered value without blocking.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next value.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Number of buffered, unread values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Returns `true` if this subscription was closed by either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Unsubscribe. Values already buffered can still be drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.lock().remove(&self.id);
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("buffered", &self.rx.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn single_subscriber_sees_values_in_order() {
        let b = Broadcaster::new().unwrap();
        let sub = b.subscribe();
        for i in 0..5 {
            b.send(i);
        }
        let got: Vec<i32> = (0..5).filter_map(|_| sub.recv_timeout(WAIT)).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn every_subscriber_gets_every_value() {
        let b = Broadcaster::new().unwrap();
        let s1 = b.subscribe();
        let s2 = b.subscribe();
        b.send("x".to_string());
        b.send("y".to_string());
        b.close();
        assert_eq!(s1.recv(), Some("x".to_string()));
        assert_eq!(s1.recv(), Some("y".to_string()));
        assert_eq!(s1.recv(), None);
        assert_eq!(s2.try_recv(), Some("x".to_string()));
        assert_eq!(s2.len(), 1);
    }

    #[test]
    fn slow_subscriber_buffers_without_blocking_others() {
        let b = Broadcaster::new().unwrap();
        let slow = b.subscribe();
        let fast = b.subscribe();
        for i in 0..1000 {
            b.send(i);
        }
        for i in 0..1000 {
            assert_eq!(fast.recv_timeout(WAIT), Some(i));
        }
        b.close();
        assert_eq!(slow.len(), 1000);
    }

    #[test]
    fn dropped_subscription_unregisters_immediately() {
        let b = Broadcaster::new().unwrap();
        let gone = b.subscribe();
        let kept = b.subscribe();
        assert_eq!(b.subscriber_count(), 2);
        drop(gone);
        assert_eq!(b.subscriber_count(), 1);
        b.send(1);
        assert_eq!(kept.recv_timeout(WAIT), Some(1));
    }

    #[test]
    fn flagged_slot_is_evicted_on_next_delivery() {
        let b = Broadcaster::new().unwrap();
        let flagged = b.subscribe();
        let kept = b.subscribe();
        // Set the flag without unregistering, so only the relay can evict.
        flagged.closed.store(true, Ordering::Release);
        assert_eq!(b.subscriber_count(), 2);

        b.send(1);
        b.send(2);
        assert_eq!(kept.recv_timeout(WAIT), Some(1));
        // The relay finishes value 1, eviction included, before value 2.
        assert_eq!(kept.recv_timeout(WAIT), Some(2));
        assert_eq!(b.subscriber_count(), 1);
        assert_eq!(flagged.try_recv(), None);
    }

    #[test]
    fn disconnected_receiver_is_evicted_on_next_delivery() {
        let b = Broadcaster::<i32>::new().unwrap();
        let kept = b.subscribe();
        // A slot whose receiver is gone but which was never closed.
        let (tx, rx) = flume::unbounded();
        drop(rx);
        b.shared.subscribers.lock().insert(
            u64::MAX,
            Slot {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
        );
        assert_eq!(b.subscriber_count(), 2);

        b.send(1);
        b.send(2);
        assert_eq!(kept.recv_timeout(WAIT), Some(1));
        assert_eq!(kept.recv_timeout(WAIT), Some(2));
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn closed_subscription_drains_then_ends() {
        let b = Broadcaster::new().unwrap();
        let sub = b.subscribe();
        b.send(7);
        assert_eq!(sub.recv_timeout(WAIT), Some(7));
        sub.close();
        assert!(sub.is_closed());
        b.send(8);
        assert_eq!(sub.recv_timeout(Duration::from_millis(50)), None);
        assert_eq!(b.subscriber_count(), 0);
    }

    #[test]
    fn close_makes_later_operations_no_ops() {
        let b = Broadcaster::new().unwrap();
        b.close();
        assert!(b.is_closed());
        b.send(1);
        let late = b.subscribe();
        assert!(late.is_closed());
        assert_eq!(late.try_recv(), None);
        assert_eq!(late.recv(), None);
        b.close();
    }

    #[test]
    fn close_delivers_queued_values_first() {
        let b = Broadcaster::new().unwrap();
        let sub = b.subscribe();
        for i in 0..100 {
            b.send(i);
        }
        b.close();
        assert_eq!(sub.len(), 100);
        assert!(sub.is_closed());
    }
}

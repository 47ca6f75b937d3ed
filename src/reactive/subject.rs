//! Ordered, serialized multi-listener event delivery.
//!
//! A [`Subject`] fans values out to registered callbacks. Delivery is
//! serialized per subject: at most one callback runs at a time, values are
//! delivered in emission order, and a value emitted while a delivery is in
//! progress (from another thread, or re-entrantly from inside a callback) is
//! queued and delivered by the dispatcher that is already running.
//!
//! Emission is split into [`push`](Subject::push) and
//! [`drain`](Subject::drain) inside the crate so that components can fix the
//! order of events while holding their own lock and deliver after releasing
//! it. Callbacks therefore never run under a component lock.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::Subscription;

/// Callback type accepted by [`Subject::subscribe`].
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerEntry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Listener<T>,
}

impl<T> Clone for ListenerEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            callback: Arc::clone(&self.callback),
        }
    }
}

struct Delivery<T> {
    value: T,
    targets: Vec<ListenerEntry<T>>,
}

struct SubjectState<T> {
    listeners: Vec<ListenerEntry<T>>,
    next_id: u64,
    replay: bool,
    current: Option<T>,
    queue: VecDeque<Delivery<T>>,
    dispatching: bool,
    closed: bool,
}

struct SubjectInner<T> {
    state: Mutex<SubjectState<T>>,
}

/// Multi-listener subject with serialized, ordered delivery.
///
/// A subject created with [`Subject::with_value`] holds a current value and
/// replays it to every new listener on registration (the way an auth state
/// listener reports the signed-in user immediately). A subject created with
/// [`Subject::new`] only delivers values emitted after registration.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use tasksync::reactive::Subject;
///
/// let subject = Subject::with_value(0_u32);
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let sub = subject.subscribe(move |v: &u32| sink.lock().push(*v));
///
/// subject.emit(1);
/// subject.emit(2);
/// sub.cancel();
/// subject.emit(3);
///
/// assert_eq!(*seen.lock(), vec![0, 1, 2]);
/// ```
pub struct Subject<T> {
    inner: Arc<SubjectInner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Subject<T> {
    /// Creates a subject without a current value.
    pub fn new() -> Self {
        Self::build(false, None)
    }

    /// Creates a replaying subject whose current value is `initial`.
    pub fn with_value(initial: T) -> Self {
        Self::build(true, Some(initial))
    }

    fn build(replay: bool, current: Option<T>) -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                state: Mutex::new(SubjectState {
                    listeners: Vec::new(),
                    next_id: 0,
                    replay,
                    current,
                    queue: VecDeque::new(),
                    dispatching: false,
                    closed: false,
                }),
            }),
        }
    }

    /// Registers `listener`, replaying the current value to it first when
    /// the subject holds one.
    ///
    /// Returns an already cancelled handle if the subject is closed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let mut state = self.inner.state.lock();
        if state.closed {
            return Subscription::cancelled();
        }
        let id = state.next_id;
        state.next_id += 1;
        let entry = ListenerEntry {
            id,
            active: Arc::clone(&active),
            callback: Arc::new(listener),
        };
        state.listeners.push(entry.clone());
        if state.replay {
            if let Some(value) = state.current.clone() {
                state.queue.push_back(Delivery {
                    value,
                    targets: vec![entry],
                });
            }
        }
        drop(state);

        let weak = Arc::downgrade(&self.inner);
        let subscription = Subscription::with_flag(active, move || remove_listener(&weak, id));
        self.drain();
        subscription
    }

    /// Emits `value` to every listener registered at this moment.
    pub fn emit(&self, value: T) {
        self.push(value);
        self.drain();
    }

    /// Queues `value` without delivering it. Must be followed by
    /// [`drain`](Subject::drain) once the caller has released its own locks.
    pub(crate) fn push(&self, value: T) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        if state.replay {
            state.current = Some(value.clone());
        }
        let targets = state.listeners.clone();
        state.queue.push_back(Delivery { value, targets });
    }

    /// Sets the value replayed to future listeners without delivering it to
    /// the registered ones. No-op on a plain or closed subject.
    pub(crate) fn replace_current(&self, value: T) {
        let mut state = self.inner.state.lock();
        if state.replay && !state.closed {
            state.current = Some(value);
        }
    }

    /// Delivers queued values unless another dispatcher is already running,
    /// in which case that dispatcher will deliver them.
    pub(crate) fn drain(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.dispatching {
                return;
            }
            state.dispatching = true;
        }
        let mut guard = DispatchGuard {
            inner: &self.inner,
            armed: true,
        };
        loop {
            let delivery = {
                let mut state = self.inner.state.lock();
                match state.queue.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        // Cleared under the same lock that observed the empty
                        // queue, so a concurrent push is never stranded.
                        state.dispatching = false;
                        guard.armed = false;
                        return;
                    },
                }
            };
            for entry in &delivery.targets {
                if entry.active.load(Ordering::Acquire) {
                    (entry.callback)(&delivery.value);
                }
            }
        }
    }

    /// Returns the current value of a replaying subject.
    pub fn current(&self) -> Option<T> {
        self.inner.state.lock().current.clone()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }

    /// Drops every listener and refuses further registrations and values.
    pub fn close(&self) {
        let listeners = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.queue.clear();
            std::mem::take(&mut state.listeners)
        };
        for entry in listeners {
            entry.active.store(false, Ordering::Release);
        }
    }

    /// Returns `true` once [`close`](Subject::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

/// Clears the dispatching flag if a callback panics mid-delivery.
struct DispatchGuard<'a, T> {
    inner: &'a SubjectInner<T>,
    armed: bool,
}

impl<T> Drop for DispatchGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state.lock().dispatching = false;
        }
    }
}

fn remove_listener<T>(weak: &Weak<SubjectInner<T>>, id: u64) {
    if let Some(inner) = weak.upgrade() {
        inner.state.lock().listeners.retain(|entry| entry.id != id);
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Subject")
            .field("listeners", &state.listeners.len())
            .field("queued", &state.queue.len())
            .field("replay", &state.replay)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder<T: Clone + Send + Sync + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |v: &T| sink.lock().push(v.clone()))
    }

    #[test]
    fn plain_subject_does_not_replay() {
        let subject = Subject::new();
        subject.emit(1);
        let (seen, listener) = recorder::<i32>();
        let _sub = subject.subscribe(listener);
        subject.emit(2);
        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn replay_only_reaches_new_listener() {
        let subject = Subject::with_value("a".to_string());
        let (first, l1) = recorder::<String>();
        let _s1 = subject.subscribe(l1);
        let (second, l2) = recorder::<String>();
        let _s2 = subject.subscribe(l2);
        assert_eq!(*first.lock(), vec!["a".to_string()]);
        assert_eq!(*second.lock(), vec!["a".to_string()]);
    }

    #[test]
    fn reentrant_emit_is_queued_after_current_delivery() {
        let subject: Subject<u32> = Subject::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let reemit = subject.clone();
        let log = Arc::clone(&order);
        let _a = subject.subscribe(move |v: &u32| {
            log.lock().push(("a", *v));
            if *v == 1 {
                reemit.emit(2);
            }
        });
        let log = Arc::clone(&order);
        let _b = subject.subscribe(move |v: &u32| log.lock().push(("b", *v)));

        subject.emit(1);
        assert_eq!(
            *order.lock(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn cancel_from_inside_callback_stops_delivery() {
        let subject: Subject<u32> = Subject::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let c = Arc::clone(&calls);
        let s = Arc::clone(&slot);
        let sub = subject.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            let me = s.lock().clone();
            if let Some(me) = me {
                me.cancel();
                me.cancel();
            }
        });
        *slot.lock() = Some(sub);

        subject.emit(1);
        subject.emit(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(subject.listener_count(), 0);
    }

    #[test]
    fn cancelled_listener_skips_already_queued_values() {
        let subject: Subject<u32> = Subject::new();
        let (seen, listener) = recorder::<u32>();
        let victim = subject.subscribe(listener);

        let victim_handle = victim.clone();
        let reemit = subject.clone();
        let _canceller = subject.subscribe(move |v: &u32| {
            if *v == 1 {
                reemit.emit(2);
                victim_handle.cancel();
            }
        });

        subject.emit(1);
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn listener_registered_after_emit_does_not_see_queued_value() {
        let subject: Subject<u32> = Subject::new();
        subject.push(7);
        let (seen, listener) = recorder::<u32>();
        let _sub = subject.subscribe(listener);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn close_rejects_new_listeners() {
        let subject = Subject::with_value(1_u8);
        let (seen, listener) = recorder::<u8>();
        let sub = subject.subscribe(listener);
        subject.close();
        subject.emit(2);
        assert!(!sub.is_active());
        assert!(subject.is_closed());
        assert_eq!(*seen.lock(), vec![1]);

        let late = subject.subscribe(|_| {});
        assert!(!late.is_active());
    }

    #[test]
    fn current_tracks_last_value() {
        let subject = Subject::with_value(1);
        subject.emit(5);
        assert_eq!(subject.current(), Some(5));
        assert_eq!(Subject::<i32>::new().current(), None);
    }

    #[test]
    fn replace_current_changes_replay_without_delivery() {
        let subject = Subject::with_value(1);
        let (existing, l1) = recorder::<i32>();
        let _s1 = subject.subscribe(l1);

        subject.replace_current(0);

        let (late, l2) = recorder::<i32>();
        let _s2 = subject.subscribe(l2);
        assert_eq!(*existing.lock(), vec![1]);
        assert_eq!(*late.lock(), vec![0]);
        assert_eq!(subject.current(), Some(0));

        let plain: Subject<i32> = Subject::new();
        plain.replace_current(3);
        assert_eq!(plain.current(), None);
    }

    #[test]
    fn concurrent_emitters_deliver_every_value_once() {
        let subject: Subject<usize> = Subject::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = subject.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let s = subject.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        s.emit(t * 1000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1000);
    }
}

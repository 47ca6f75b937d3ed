//! Cancellation handles for listener registrations.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Handle returned by every listener registration in this crate.
///
/// Calling [`cancel`](Subscription::cancel) permanently stops delivery to the
/// registered listener and runs the registration's release action (removing
/// the listener, closing a live query, ...). The handle is cheap to clone;
/// all clones share the same state.
///
/// Cancellation is idempotent and may happen at any time, including from
/// inside the listener the handle belongs to: the release action runs exactly
/// once, and a listener is never invoked after `cancel` has returned on the
/// same thread.
///
/// Dropping a `Subscription` does **not** cancel it.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use tasksync::reactive::Subscription;
///
/// let released = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&released);
/// let sub = Subscription::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// assert!(sub.is_active());
/// sub.cancel();
/// sub.cancel();
/// assert!(!sub.is_active());
/// assert_eq!(released.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
#[must_use = "dropping a Subscription keeps the listener registered; call cancel() to stop it"]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    active: Arc<AtomicBool>,
    release: Mutex<Option<ReleaseFn>>,
}

impl Subscription {
    /// Creates an active handle that runs `release` on first cancellation.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self::with_flag(Arc::new(AtomicBool::new(true)), release)
    }

    /// Creates a handle sharing `active` with a listener entry, so the
    /// dispatcher can observe cancellation without taking any lock.
    pub(crate) fn with_flag(active: Arc<AtomicBool>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                active,
                release: Mutex::new(Some(Box::new(release))),
            }),
        }
    }

    /// Returns a handle that is already cancelled.
    ///
    /// Used when a registration is refused (closed subject, disposed
    /// manager) so callers always receive a valid handle.
    pub fn cancelled() -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                active: Arc::new(AtomicBool::new(false)),
                release: Mutex::new(None),
            }),
        }
    }

    /// Stops delivery and releases the registration. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }
        // Taken into a local so the lock is released before the action runs;
        // release actions may re-enter the owning subject or store.
        let release = self.inner.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    /// Returns `true` until the handle is cancelled.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

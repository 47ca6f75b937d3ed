//! Identity monitor: deduplicated auth-state notifications.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::auth::AuthService;
use crate::reactive::{Listener, Subscription};
use crate::types::Identity;

/// Observes the auth service and reports identity transitions.
///
/// Each observer receives the current identity (or `None`) as soon as it
/// registers, then one notification per transition. Consecutive
/// notifications for the same uid (or `None` twice) are collapsed per
/// observer, so token refreshes and repeated sign-outs are invisible.
/// Notifications are serialized by the auth service.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tasksync::auth::{AuthService, IdentityMonitor, InMemoryAuthService};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let auth = Arc::new(InMemoryAuthService::new());
/// let monitor = IdentityMonitor::new(auth.clone());
///
/// let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let registration = monitor.observe(move |identity| {
///     sink.lock().push(identity.map(|i| i.email().to_string()));
/// });
///
/// auth.create_account("ada@example.com", "secret1").await.unwrap();
/// auth.sign_out().await.unwrap();
/// auth.sign_out().await.unwrap();
///
/// assert_eq!(
///     *seen.lock(),
///     vec![None, Some("ada@example.com".to_string()), None]
/// );
/// registration.cancel();
/// # }
/// ```
#[derive(Clone)]
pub struct IdentityMonitor {
    auth: Arc<dyn AuthService>,
}

impl IdentityMonitor {
    /// Creates a monitor over `auth`.
    pub fn new(auth: Arc<dyn AuthService>) -> Self {
        Self { auth }
    }

    /// Registers `callback` for identity transitions.
    ///
    /// Cancelling the returned handle stops delivery permanently and releases
    /// the auth-service registration.
    pub fn observe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<&Identity>) + Send + Sync + 'static,
    {
        // Outer `None`: nothing delivered yet.
        let last_uid: Mutex<Option<Option<String>>> = Mutex::new(None);
        let listener: Listener<Option<Identity>> = Arc::new(move |identity: &Option<Identity>| {
            let uid = identity.as_ref().map(|i| i.uid.clone());
            {
                let mut last = last_uid.lock();
                if last.as_ref() == Some(&uid) {
                    trace!(uid = ?uid, "duplicate auth notification collapsed");
                    return;
                }
                *last = Some(uid.clone());
            }
            debug!(uid = ?uid, "identity changed");
            callback(identity.as_ref());
        });
        self.auth.on_auth_state_changed(listener)
    }

    /// The identity the auth service currently holds.
    pub fn current(&self) -> Option<Identity> {
        self.auth.current_identity()
    }
}

impl fmt::Debug for IdentityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMonitor")
            .field("current", &self.current().map(|i| i.uid))
            .finish()
    }
}

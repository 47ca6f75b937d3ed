//! Session facade consumed by a UI shell.
//!
//! A [`TaskListSession`] owns the identity registration and the task
//! subscription manager, and exposes the current identity and task list as
//! reactive values plus the user commands.
//!
//! # Lifecycle
//!
//! ```text
//! new ──start()──► running ──(identity changes rebind automatically)──►
//!                     │ rebind() after a subscription failure
//!                     ▼
//!                  dispose() (idempotent, terminal)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::auth::{AuthService, IdentityMonitor};
use crate::commands::TaskCommandService;
use crate::config::TaskListConfig;
use crate::error::{Error, Result, SubscriptionError};
use crate::reactive::{Subject, Subscription};
use crate::store::DocumentStore;
use crate::subscription::{SubscriptionStatus, TaskSubscriptionManager};
use crate::types::{Identity, TaskId, TaskList};

struct SessionInner {
    auth: Arc<dyn AuthService>,
    monitor: IdentityMonitor,
    manager: TaskSubscriptionManager,
    commands: TaskCommandService,
    verify_ownership_on_delete: bool,
    identity: Subject<Option<Identity>>,
    registration: Mutex<Option<Subscription>>,
    started: AtomicBool,
    disposed: AtomicBool,
}

impl SessionInner {
    fn on_identity(&self, identity: Option<&Identity>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        // identity() reports the new user before its list is published, and
        // tasks() holds that user's list before identity listeners run.
        self.identity.replace_current(identity.cloned());
        self.manager.bind(identity);
        self.identity.emit(identity.cloned());
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(registration) = self.registration.get_mut().take() {
            registration.cancel();
        }
        self.manager.dispose();
    }
}

/// A signed-in (or signed-out) user's view of their live task list.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tasksync::auth::InMemoryAuthService;
/// use tasksync::config::TaskListConfig;
/// use tasksync::session::TaskListSession;
/// use tasksync::store::{AccessRules, InMemoryDocumentStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tasksync::Result<()> {
/// let auth = Arc::new(InMemoryAuthService::new());
/// let store = Arc::new(
///     InMemoryDocumentStore::new()
///         .with_rules(AccessRules::owner_only("userId"))
///         .with_principal(auth.clone()),
/// );
/// let session = TaskListSession::new(auth, store, TaskListConfig::default());
/// session.start()?;
///
/// session.sign_up("ada@example.com", "secret1").await?;
/// session.add_task("buy milk").await?;
/// assert_eq!(session.tasks().texts(), vec!["buy milk"]);
///
/// session.sign_out().await?;
/// assert!(session.tasks().is_empty());
/// session.dispose();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskListSession {
    inner: Arc<SessionInner>,
}

impl TaskListSession {
    /// Creates a session. Nothing is observed until [`start`](Self::start).
    pub fn new(
        auth: Arc<dyn AuthService>,
        store: Arc<dyn DocumentStore>,
        config: TaskListConfig,
    ) -> Self {
        let monitor = IdentityMonitor::new(Arc::clone(&auth));
        let manager = TaskSubscriptionManager::new(Arc::clone(&store), config.clone());
        let verify_ownership_on_delete = config.verify_ownership_on_delete;
        let commands = TaskCommandService::new(store, config);
        Self {
            inner: Arc::new(SessionInner {
                auth,
                monitor,
                manager,
                commands,
                verify_ownership_on_delete,
                identity: Subject::with_value(None),
                registration: Mutex::new(None),
                started: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Starts observing the auth service. The subscription manager is bound
    /// to the current identity before this returns. Calling `start` again is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::Disposed`] after [`dispose`](Self::dispose).
    pub fn start(&self) -> Result<()> {
        self.ensure_live()?;
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        let registration = self.inner.monitor.observe(move |identity| {
            if let Some(inner) = weak.upgrade() {
                inner.on_identity(identity);
            }
        });
        *self.inner.registration.lock() = Some(registration.clone());
        if self.inner.disposed.load(Ordering::Acquire) {
            registration.cancel();
        }
        info!("task list session started");
        Ok(())
    }

    /// The identity the session is currently bound to.
    pub fn identity(&self) -> Option<Identity> {
        self.inner.identity.current().flatten()
    }

    /// Registers `listener` for identity changes; the current identity is
    /// delivered immediately.
    ///
    /// On a switch, task listeners receive the new user's list before
    /// identity listeners hear of the new user. From either callback,
    /// [`identity`](Self::identity) and [`tasks`](Self::tasks) already agree
    /// on the new user.
    pub fn on_identity_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Option<&Identity>) + Send + Sync + 'static,
    {
        self.inner
            .identity
            .subscribe(move |identity: &Option<Identity>| listener(identity.as_ref()))
    }

    /// The current task list.
    pub fn tasks(&self) -> TaskList {
        self.inner.manager.tasks()
    }

    /// Registers `listener` for task list changes; the current list is
    /// delivered immediately.
    pub fn on_tasks_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TaskList) + Send + Sync + 'static,
    {
        self.inner.manager.on_change(listener)
    }

    /// Registers `listener` for live query failures.
    pub fn on_subscription_error<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SubscriptionError) + Send + Sync + 'static,
    {
        self.inner.manager.on_error(listener)
    }

    /// State of the task subscription.
    pub fn subscription_status(&self) -> SubscriptionStatus {
        self.inner.manager.status()
    }

    /// Creates an account and signs it in.
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] on rejected credentials or network failure,
    /// [`Error::Disposed`] after disposal.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        self.ensure_live()?;
        Ok(self.inner.auth.create_account(email, password).await?)
    }

    /// Signs in an existing account.
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] on rejected credentials or network failure,
    /// [`Error::Disposed`] after disposal.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.ensure_live()?;
        Ok(self.inner.auth.sign_in(email, password).await?)
    }

    /// Signs out.
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] on network failure, [`Error::Disposed`] after
    /// disposal.
    pub async fn sign_out(&self) -> Result<()> {
        self.ensure_live()?;
        Ok(self.inner.auth.sign_out().await?)
    }

    /// Adds a task for the signed-in identity. The list updates when the
    /// store reflects the write.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAuthenticated`] when signed out.
    /// - [`Error::Command`] for invalid text or a rejected write.
    /// - [`Error::Disposed`] after disposal.
    pub async fn add_task(&self, text: &str) -> Result<TaskId> {
        self.ensure_live()?;
        let identity = self.signed_in()?;
        Ok(self.inner.commands.create_task(text, &identity).await?)
    }

    /// Removes a task. With `verify_ownership_on_delete` the task is read
    /// first and only the owner may remove it; otherwise the store decides.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAuthenticated`] when the ownership check is enabled and
    ///   no identity is signed in.
    /// - [`Error::Command`] for an empty id, a foreign task or a rejected
    ///   delete.
    /// - [`Error::Disposed`] after disposal.
    pub async fn remove_task(&self, id: &TaskId) -> Result<()> {
        self.ensure_live()?;
        if self.inner.verify_ownership_on_delete {
            let identity = self.signed_in()?;
            self.inner.commands.delete_owned_task(id, &identity).await?;
        } else {
            self.inner.commands.delete_task(id).await?;
        }
        Ok(())
    }

    /// Re-opens the task subscription for the current identity, typically
    /// after [`on_subscription_error`](Self::on_subscription_error) fired.
    ///
    /// # Errors
    ///
    /// [`Error::Disposed`] after disposal.
    pub fn rebind(&self) -> Result<()> {
        self.ensure_live()?;
        let identity = self.inner.monitor.current();
        debug!(uid = ?identity.as_ref().map(|i| &i.uid), "rebinding task subscription");
        self.inner.manager.bind(identity.as_ref());
        Ok(())
    }

    /// Stops observing identity changes and closes the task subscription.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registration) = self.inner.registration.lock().take() {
            registration.cancel();
        }
        self.inner.manager.dispose();
        self.inner.identity.close();
        info!("task list session disposed");
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    fn signed_in(&self) -> Result<Identity> {
        self.inner.monitor.current().ok_or(Error::NotAuthenticated)
    }
}

impl fmt::Debug for TaskListSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskListSession")
            .field("identity", &self.identity().map(|i| i.uid))
            .field("subscription", &self.inner.manager)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

//! Identity-scoped live task subscription.
//!
//! [`TaskSubscriptionManager`] keeps at most one live query open: the one
//! returning every task owned by the bound identity. Each snapshot rebuilds
//! the materialized [`TaskList`] from scratch.
//!
//! # Binding lifecycle
//!
//! ```text
//! Idle ──bind(Some A)──► Subscribed(A) ──bind(Some B)──► Subscribed(B)
//!  ▲                         │    │
//!  └───────bind(None)────────┘    └──query error──► Failed(A) ──bind──► ...
//!
//! any state ──dispose()──► Disposed (terminal)
//! ```
//!
//! Every binding carries a generation number. Snapshot handlers are tagged
//! with the generation they were opened under and events from any other
//! generation are dropped, so a replaced query can never repopulate the list
//! even if its store keeps delivering after cancellation.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{TaskListConfig, TaskSchema};
use crate::error::SubscriptionError;
use crate::reactive::{Subject, Subscription};
use crate::store::{DocumentStore, SnapshotListener};
use crate::types::{Identity, Query, QuerySnapshot, SnapshotEvent, Task, TaskList};

/// Observable state of a [`TaskSubscriptionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// No identity bound.
    Idle,
    /// A live query is open for `uid`.
    Subscribed {
        /// The bound identity.
        uid: String,
    },
    /// The live query for `uid` failed; the list holds its last value.
    Failed {
        /// The identity whose query failed.
        uid: String,
    },
    /// [`dispose`](TaskSubscriptionManager::dispose) was called.
    Disposed,
}

enum Binding {
    Idle,
    Subscribed {
        uid: String,
        // `None` while `DocumentStore::listen` is in flight.
        registration: Option<Subscription>,
    },
    Failed {
        uid: String,
    },
    Disposed,
}

impl Binding {
    fn status(&self) -> SubscriptionStatus {
        match self {
            Self::Idle => SubscriptionStatus::Idle,
            Self::Subscribed { uid, .. } => SubscriptionStatus::Subscribed { uid: uid.clone() },
            Self::Failed { uid } => SubscriptionStatus::Failed { uid: uid.clone() },
            Self::Disposed => SubscriptionStatus::Disposed,
        }
    }

    fn take_registration(&mut self) -> Option<Subscription> {
        match self {
            Self::Subscribed { registration, .. } => registration.take(),
            _ => None,
        }
    }
}

struct ManagerState {
    generation: u64,
    binding: Binding,
    tasks: TaskList,
    /// Last list delivered to registered `on_change` listeners.
    published: TaskList,
}

struct ManagerInner {
    store: Arc<dyn DocumentStore>,
    config: TaskListConfig,
    state: Mutex<ManagerState>,
    changes: Subject<TaskList>,
    errors: Subject<SubscriptionError>,
}

/// Maintains the live task list of the bound identity.
///
/// # Guarantees
///
/// - At most one live query is open at a time.
/// - After `bind(Some(b))` returns, no event from a previously bound
///   identity reaches the list or its listeners.
/// - Each snapshot is fully applied (list replaced, change queued) before the
///   next one is processed.
/// - Listener callbacks never run while the manager's lock is held, so they
///   may call back into the manager.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tasksync::config::TaskListConfig;
/// use tasksync::store::{DocumentStore, InMemoryDocumentStore};
/// use tasksync::subscription::{SubscriptionStatus, TaskSubscriptionManager};
/// use tasksync::types::{Identity, Task};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(InMemoryDocumentStore::new());
/// let config = TaskListConfig::default();
/// let manager = TaskSubscriptionManager::new(store.clone(), config.clone());
///
/// let ada = Identity::new("ada", "ada@example.com");
/// manager.bind(Some(&ada));
/// assert_eq!(manager.status(), SubscriptionStatus::Subscribed { uid: "ada".into() });
///
/// store
///     .insert("todos", Task::new_record("buy milk", "ada", &config.schema))
///     .await
///     .unwrap();
/// assert_eq!(manager.tasks().texts(), vec!["buy milk"]);
///
/// manager.bind(None);
/// assert!(manager.tasks().is_empty());
/// # }
/// ```
#[derive(Clone)]
pub struct TaskSubscriptionManager {
    inner: Arc<ManagerInner>,
}

impl TaskSubscriptionManager {
    /// Creates an idle manager.
    pub fn new(store: Arc<dyn DocumentStore>, config: TaskListConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                config,
                state: Mutex::new(ManagerState {
                    generation: 0,
                    binding: Binding::Idle,
                    tasks: TaskList::new(),
                    published: TaskList::new(),
                }),
                changes: Subject::with_value(TaskList::new()),
                errors: Subject::new(),
            }),
        }
    }

    /// Binds the manager to `identity`.
    ///
    /// - `None` closes any live query and empties the list.
    /// - `Some(identity)` replaces any live query with one for
    ///   `identity.uid`. Binding the identity that is already subscribed is a
    ///   no-op; binding it again after a failure re-opens the query.
    ///
    /// Ignored after [`dispose`](Self::dispose).
    pub fn bind(&self, identity: Option<&Identity>) {
        match identity {
            None => self.unbind(),
            Some(identity) => self.subscribe(&identity.uid),
        }
    }

    /// Same as `bind(None)`.
    pub fn unbind(&self) {
        let inner = &self.inner;
        let stale = {
            let mut state = inner.state.lock();
            if matches!(state.binding, Binding::Disposed) {
                return;
            }
            state.generation += 1;
            let stale = state.binding.take_registration();
            state.binding = Binding::Idle;
            if !state.tasks.is_empty() {
                state.tasks = TaskList::new();
            }
            if !state.published.is_empty() {
                state.published = TaskList::new();
                inner.changes.push(TaskList::new());
            }
            stale
        };
        if let Some(registration) = stale {
            debug!("task subscription closed");
            registration.cancel();
        }
        inner.changes.drain();
    }

    fn subscribe(&self, uid: &str) {
        let inner = &self.inner;
        let (generation, stale) = {
            let mut state = inner.state.lock();
            match &state.binding {
                Binding::Disposed => return,
                Binding::Subscribed { uid: bound, .. } if bound == uid => {
                    debug!(uid, "already subscribed");
                    return;
                },
                _ => {},
            }
            state.generation += 1;
            let stale = state.binding.take_registration();
            state.binding = Binding::Subscribed {
                uid: uid.to_string(),
                registration: None,
            };
            // Cleared silently; the next snapshot publishes the new list.
            // Late listeners must not be replayed the previous identity's.
            state.tasks = TaskList::new();
            inner.changes.replace_current(TaskList::new());
            (state.generation, stale)
        };
        if let Some(registration) = stale {
            registration.cancel();
        }

        let query = Query::collection(inner.config.collection.clone())
            .where_eq(inner.config.schema.owner_field.clone(), uid);
        debug!(uid, generation, query = %query, "opening task subscription");

        let weak = Arc::downgrade(inner);
        let owner = uid.to_string();
        let listener: SnapshotListener = Arc::new(move |event: &SnapshotEvent| {
            handle_event(&weak, generation, &owner, event);
        });
        let registration = inner.store.listen(query, listener);

        let superseded = {
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            let current = state.generation == generation;
            match &mut state.binding {
                Binding::Subscribed {
                    registration: slot, ..
                } if current && slot.is_none() => {
                    *slot = Some(registration);
                    None
                },
                _ => Some(registration),
            }
        };
        if let Some(registration) = superseded {
            debug!(uid, generation, "task subscription superseded while opening");
            registration.cancel();
        }
    }

    /// Snapshot of the materialized list.
    pub fn tasks(&self) -> TaskList {
        self.inner.state.lock().tasks.clone()
    }

    /// Current binding state.
    pub fn status(&self) -> SubscriptionStatus {
        self.inner.state.lock().binding.status()
    }

    /// Registers `listener` for list changes. The current list is delivered
    /// to it immediately.
    ///
    /// Between an identity change and the new identity's first snapshot, a
    /// new listener is replayed the empty list. Listeners already registered
    /// are not sent an intermediate empty list; they receive the new
    /// identity's list when its first snapshot arrives.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TaskList) + Send + Sync + 'static,
    {
        self.inner.changes.subscribe(listener)
    }

    /// Registers `listener` for subscription failures.
    pub fn on_error<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SubscriptionError) + Send + Sync + 'static,
    {
        self.inner.errors.subscribe(listener)
    }

    /// Closes the live query and every listener registration. Idempotent.
    pub fn dispose(&self) {
        let inner = &self.inner;
        let stale = {
            let mut state = inner.state.lock();
            if matches!(state.binding, Binding::Disposed) {
                return;
            }
            state.generation += 1;
            let stale = state.binding.take_registration();
            state.binding = Binding::Disposed;
            stale
        };
        if let Some(registration) = stale {
            registration.cancel();
        }
        inner.changes.close();
        inner.errors.close();
        debug!("task subscription manager disposed");
    }
}

fn handle_event(weak: &Weak<ManagerInner>, generation: u64, uid: &str, event: &SnapshotEvent) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let dead = {
        let mut state = inner.state.lock();
        if state.generation != generation {
            warn!(
                uid,
                generation,
                current = state.generation,
                "dropping event from replaced task subscription"
            );
            return;
        }
        match event {
            Ok(snapshot) => {
                let tasks = materialize(snapshot, uid, &inner.config.schema);
                debug!(
                    uid,
                    tasks = tasks.len(),
                    pending = snapshot.has_pending_writes,
                    "task list rebuilt"
                );
                state.tasks = tasks.clone();
                state.published = tasks.clone();
                inner.changes.push(tasks);
                None
            },
            Err(error) => {
                warn!(uid, error = %error, "task subscription failed");
                // Nothing more is accepted from this registration.
                state.generation += 1;
                let dead = state.binding.take_registration();
                state.binding = Binding::Failed {
                    uid: uid.to_string(),
                };
                if state.published != state.tasks {
                    state.published = state.tasks.clone();
                    inner.changes.push(state.tasks.clone());
                }
                inner.errors.push(SubscriptionError {
                    uid: uid.to_string(),
                    source: error.clone(),
                });
                dead
            },
        }
    };
    if let Some(registration) = dead {
        registration.cancel();
    }
    inner.changes.drain();
    inner.errors.drain();
}

/// Rebuilds the list from a full result set, skipping documents that do not
/// decode or belong to someone else.
fn materialize(snapshot: &QuerySnapshot, uid: &str, schema: &TaskSchema) -> TaskList {
    snapshot
        .documents
        .iter()
        .filter_map(|doc| match Task::from_document(doc, schema) {
            Ok(task) if task.owner_id == uid => Some(task),
            Ok(task) => {
                warn!(id = %task.id, owner = %task.owner_id, uid, "skipping task of another owner");
                None
            },
            Err(error) => {
                warn!(error = %error, "skipping undecodable task document");
                None
            },
        })
        .collect()
}

impl fmt::Debug for TaskSubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskSubscriptionManager")
            .field("status", &state.binding.status())
            .field("generation", &state.generation)
            .field("tasks", &state.tasks.len())
            .finish()
    }
}

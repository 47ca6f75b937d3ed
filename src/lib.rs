//! Identity-scoped live task lists.
//!
//! `tasksync` keeps a per-user task list synchronized with a remote document
//! store. It observes the authentication state, holds exactly one live query
//! for the signed-in identity's tasks, rebuilds the list from every snapshot
//! and issues create/delete commands. Nothing is cached locally: the store is
//! the source of truth and the list is a read view of it.
//!
//! # Overview
//!
//! ```text
//!  AuthService ──► IdentityMonitor ──► TaskSubscriptionManager ──► on_change(TaskList)
//!                                          ▲        │
//!                        snapshots ────────┘        └─ one live query per identity
//!                                          │
//!  TaskCommandService ──► DocumentStore ───┘
//! ```
//!
//! [`TaskListSession`] wires the pieces together for a UI shell.
//!
//! # Module Organization
//!
//! - [`reactive`] - `Subject` / `Subscription` primitives with serialized
//!   delivery
//! - [`auth`] - auth service interface, identity monitor, in-memory service
//! - [`store`] - document store interface, access rules, in-memory store
//! - [`subscription`] - the task subscription manager
//! - [`commands`] - task create/delete commands
//! - [`session`] - the facade
//! - [`types`] - identities, documents, queries, tasks
//! - [`config`] - TOML configuration
//! - [`error`] - error types
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tasksync::{InMemoryAuthService, InMemoryDocumentStore, TaskListConfig, TaskListSession};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tasksync::Result<()> {
//! let auth = Arc::new(InMemoryAuthService::new());
//! let store = Arc::new(InMemoryDocumentStore::new());
//! let session = TaskListSession::new(auth, store, TaskListConfig::default());
//! session.start()?;
//!
//! let _changes = session.on_tasks_change(|tasks| println!("{} task(s)", tasks.len()));
//! session.sign_up("ada@example.com", "secret1").await?;
//! let id = session.add_task("buy milk").await?;
//! session.remove_task(&id).await?;
//! assert!(session.tasks().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod reactive;
pub mod session;
pub mod store;
pub mod subscription;
pub mod types;

// Re-exports for ergonomic access
pub use auth::{AuthService, IdentityMonitor, InMemoryAuthService};
pub use commands::TaskCommandService;
pub use config::{TaskListConfig, TaskSchema};
pub use error::{AuthError, AuthErrorKind, CommandError, Error, Result, StoreError, SubscriptionError};
pub use reactive::{Subject, Subscription};
pub use session::TaskListSession;
pub use store::{AccessRules, DocumentStore, InMemoryDocumentStore};
pub use subscription::{SubscriptionStatus, TaskSubscriptionManager};
pub use types::{Identity, Task, TaskId, TaskList};

//! Document store interface and implementations.
//!
//! # Architecture
//!
//! 1. **[`DocumentStore`]** -- the interface the core consumes: live queries
//!    that re-deliver the full result set on every change, plus insert,
//!    delete and point reads. Used as `Arc<dyn DocumentStore>` by
//!    [`TaskSubscriptionManager`](crate::subscription::TaskSubscriptionManager)
//!    and [`TaskCommandService`](crate::commands::TaskCommandService).
//!
//! 2. **[`AccessRules`]** -- server-side authorization evaluated by the
//!    store against the current principal. The core performs no
//!    authorization of its own beyond the optional delete guard.
//!
//! 3. **[`ServerClock`]** -- monotonic clock resolving
//!    [`FieldValue::ServerTimestamp`](crate::types::FieldValue::ServerTimestamp)
//!    sentinels at commit time.
//!
//! # Implementations
//!
//! - [`InMemoryDocumentStore`](memory::InMemoryDocumentStore) -- ordered
//!   in-memory collections with live queries, access rules, latency
//!   compensation and fault injection.

pub mod clock;
pub mod memory;
pub mod rules;

use std::sync::Arc;

use async_trait::async_trait;

pub use clock::ServerClock;
pub use memory::InMemoryDocumentStore;
pub use rules::{AccessRules, PrincipalProvider};

use crate::error::StoreError;
use crate::reactive::Subscription;
use crate::types::{Document, DocumentId, Fields, Query, SnapshotEvent};

/// Callback receiving live query events.
pub type SnapshotListener = Arc<dyn Fn(&SnapshotEvent) + Send + Sync>;

/// A remote document store with live queries.
///
/// # Live query contract
///
/// [`listen`](DocumentStore::listen) registers `listener` for `query` and
/// returns a cancellation handle. The listener receives:
///
/// - `Ok(snapshot)` with the **full** current result set, first for the
///   initial state and then whenever the result set changes;
/// - `Err(error)` if the query cannot be established (e.g. permission
///   denied) or dies later. No event follows an error.
///
/// Events for one registration are delivered in store order and never
/// overlap. After the handle is cancelled the listener is not invoked again
/// by a conforming store; callers that need a hard guarantee (see
/// [`TaskSubscriptionManager`](crate::subscription::TaskSubscriptionManager))
/// also tag their listeners.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a live query.
    fn listen(&self, query: Query, listener: SnapshotListener) -> Subscription;

    /// Inserts a document with a store-assigned id and returns the id once
    /// the store acknowledges the write.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] if access rules reject the write.
    /// - [`StoreError::Unavailable`] if the store cannot be reached.
    /// - [`StoreError::InvalidArgument`] for an empty collection name.
    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError>;

    /// Deletes a document by id.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the document does not exist.
    /// - [`StoreError::PermissionDenied`] if access rules reject the delete.
    /// - [`StoreError::Unavailable`] if the store cannot be reached.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Reads a single document.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PermissionDenied`] if access rules reject the read.
    /// - [`StoreError::Unavailable`] if the store cannot be reached.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;
}

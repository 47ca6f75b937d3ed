//! In-memory document store with live queries.
//!
//! Collections keep insertion order. Every mutation runs under a single
//! commit lock which also computes and enqueues the resulting snapshots for
//! each affected live query, so all listeners observe writes in commit
//! order. Delivery happens after the lock is released.
//!
//! Live queries only fire when their result set actually changes: writes to
//! another user's documents do not wake an owner-filtered listener.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::reactive::{Subject, Subscription};
use crate::store::{AccessRules, DocumentStore, PrincipalProvider, ServerClock, SnapshotListener};
use crate::types::{Document, DocumentId, Fields, Query, QuerySnapshot, SnapshotEvent};

type Collection = IndexMap<DocumentId, Document>;

/// In-memory [`DocumentStore`].
///
/// # Defaults
///
/// | Setting         | Default              |
/// |-----------------|----------------------|
/// | access rules    | [`AccessRules::Open`] |
/// | principal       | none                 |
/// | write latency   | none (immediate)     |
/// | offline         | false                |
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tasksync::store::{DocumentStore, InMemoryDocumentStore};
/// use tasksync::types::{Fields, Query, SnapshotEvent};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = InMemoryDocumentStore::new();
/// let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let registration = store.listen(
///     Query::collection("todos"),
///     Arc::new(move |event: &SnapshotEvent| {
///         sink.lock().push(event.as_ref().map(|s| s.len()).unwrap_or(0));
///     }),
/// );
///
/// let mut fields = Fields::new();
/// fields.insert("task".into(), "buy milk".into());
/// store.insert("todos", fields).await.unwrap();
///
/// assert_eq!(*seen.lock(), vec![0, 1]);
/// registration.cancel();
/// # }
/// ```
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
    clock: ServerClock,
    rules: AccessRules,
    principal: Option<Arc<dyn PrincipalProvider>>,
    offline: AtomicBool,
    write_latency: Option<Duration>,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, Collection>,
    live: IndexMap<u64, LiveQuery>,
    next_listener: u64,
}

struct LiveQuery {
    query: Query,
    sink: Subject<SnapshotEvent>,
    last: QuerySnapshot,
}

fn evaluate(collections: &HashMap<String, Collection>, query: &Query) -> QuerySnapshot {
    let documents: Vec<Document> = collections
        .get(&query.collection)
        .map(|docs| docs.values().filter(|d| query.matches(d)).cloned().collect())
        .unwrap_or_default();
    let has_pending_writes = documents.iter().any(Document::has_pending_fields);
    QuerySnapshot {
        documents,
        has_pending_writes,
    }
}

impl StoreState {
    /// Enqueues a snapshot on every live query over `collection` whose
    /// result set changed. Returns the subjects to drain once unlocked.
    fn enqueue_changes(&mut self, collection: &str) -> Vec<Subject<SnapshotEvent>> {
        let Self {
            collections, live, ..
        } = self;
        let mut touched = Vec::new();
        for query in live.values_mut() {
            if query.query.collection != collection {
                continue;
            }
            let snapshot = evaluate(collections, &query.query);
            if snapshot == query.last {
                continue;
            }
            query.last = snapshot.clone();
            query.sink.push(Ok(snapshot));
            touched.push(query.sink.clone());
        }
        touched
    }
}

impl InMemoryDocumentStore {
    /// Creates an empty store with open access rules.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock: ServerClock::new(),
            rules: AccessRules::Open,
            principal: None,
            offline: AtomicBool::new(false),
            write_latency: None,
        }
    }

    /// Sets the access rules.
    pub fn with_rules(mut self, rules: AccessRules) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the provider reporting the caller's uid to the access rules.
    pub fn with_principal(mut self, provider: Arc<dyn PrincipalProvider>) -> Self {
        self.principal = Some(provider);
        self
    }

    /// Simulates round-trip latency: inserts apply locally first, then
    /// commit after `latency`.
    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = Some(latency);
        self
    }

    /// Simulates losing (or regaining) connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
        debug!(offline, "document store connectivity changed");
    }

    /// Returns `true` while offline.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    /// Ends every live query with `error`, as a server-side revocation or a
    /// dropped stream would.
    pub fn terminate_live_queries(&self, error: StoreError) {
        let sinks: Vec<_> = {
            let mut state = self.state.lock();
            state
                .live
                .drain(..)
                .map(|(_, query)| {
                    query.sink.push(Err(error.clone()));
                    query.sink
                })
                .collect()
        };
        warn!(count = sinks.len(), error = %error, "live queries terminated");
        for sink in sinks {
            sink.drain();
            sink.close();
        }
    }

    /// Number of open live queries.
    pub fn live_query_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Every document of `collection`, in insertion order, bypassing access
    /// rules.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state
            .lock()
            .collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn principal(&self) -> Option<String> {
        self.principal.as_ref().and_then(|p| p.principal())
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.is_offline() {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    /// Applies `mutate` to `collection` under the commit lock, then delivers
    /// the resulting snapshots.
    fn commit<R>(&self, collection: &str, mutate: impl FnOnce(&mut Collection) -> R) -> R {
        let (result, touched) = {
            let mut state = self.state.lock();
            let docs = state.collections.entry(collection.to_string()).or_default();
            let result = mutate(docs);
            (result, state.enqueue_changes(collection))
        };
        for sink in touched {
            sink.drain();
        }
        result
    }

    fn unregister(state: &Mutex<StoreState>, id: u64) {
        if let Some(query) = state.lock().live.shift_remove(&id) {
            query.sink.close();
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("rules", &self.rules)
            .field("has_principal", &self.principal.is_some())
            .field("offline", &self.is_offline())
            .field("write_latency", &self.write_latency)
            .finish()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn listen(&self, query: Query, listener: SnapshotListener) -> Subscription {
        let sink: Subject<SnapshotEvent> = Subject::new();
        let delivery = sink.subscribe(move |event: &SnapshotEvent| listener(event));

        let allowed = self
            .ensure_online()
            .and_then(|()| self.rules.check_listen(&query, self.principal().as_deref()));
        if let Err(error) = allowed {
            debug!(query = %query, error = %error, "live query rejected");
            sink.emit(Err(error));
            sink.close();
            return Subscription::cancelled();
        }

        let id = {
            let mut state = self.state.lock();
            let id = state.next_listener;
            state.next_listener += 1;
            let initial = evaluate(&state.collections, &query);
            sink.push(Ok(initial.clone()));
            debug!(query = %query, id, documents = initial.len(), "live query opened");
            state.live.insert(
                id,
                LiveQuery {
                    query,
                    sink: sink.clone(),
                    last: initial,
                },
            );
            id
        };
        sink.drain();

        let state = Arc::downgrade(&self.state);
        Subscription::new(move || {
            delivery.cancel();
            if let Some(state) = state.upgrade() {
                Self::unregister(&state, id);
            }
        })
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        if collection.is_empty() {
            return Err(StoreError::InvalidArgument(
                "collection name is empty".to_string(),
            ));
        }
        self.ensure_online()?;
        self.rules
            .check_insert(&fields, self.principal().as_deref())?;

        let id = Uuid::new_v4().simple().to_string();
        let Some(latency) = self.write_latency else {
            let doc = Document::new(id.clone(), self.clock.resolve(fields));
            self.commit(collection, |docs| docs.insert(id.clone(), doc));
            debug!(collection, id = %id, "document inserted");
            return Ok(id);
        };

        // Local apply: readers see sentinels until the commit lands.
        let local = Document::new(id.clone(), fields.clone());
        self.commit(collection, |docs| docs.insert(id.clone(), local));
        debug!(collection, id = %id, "document applied locally");

        tokio::time::sleep(latency).await;

        if let Err(error) = self.ensure_online() {
            self.commit(collection, |docs| docs.shift_remove(&id));
            warn!(collection, id = %id, error = %error, "write rolled back");
            return Err(error);
        }
        let resolved = self.clock.resolve(fields);
        self.commit(collection, |docs| {
            // Deleted while pending: the delete wins.
            if let Some(doc) = docs.get_mut(&id) {
                doc.fields = resolved;
            }
        });
        debug!(collection, id = %id, "document committed");
        Ok(id)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::InvalidArgument("document id is empty".to_string()));
        }
        self.ensure_online()?;
        let principal = self.principal();
        self.commit(collection, |docs| {
            let doc = docs.get(id).ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
            self.rules.check_access(doc, principal.as_deref())?;
            docs.shift_remove(id);
            Ok::<(), StoreError>(())
        })?;
        debug!(collection, id, "document deleted");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.ensure_online()?;
        let doc = self
            .state
            .lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();
        if let Some(doc) = &doc {
            self.rules.check_access(doc, self.principal().as_deref())?;
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;

    struct FixedPrincipal(Mutex<Option<String>>);

    impl PrincipalProvider for FixedPrincipal {
        fn principal(&self) -> Option<String> {
            self.0.lock().clone()
        }
    }

    fn fields(owner: &str, text: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("task".into(), text.into());
        fields.insert("userId".into(), owner.into());
        fields.insert("createdAt".into(), FieldValue::ServerTimestamp);
        fields
    }

    fn recorder() -> (Arc<Mutex<Vec<SnapshotEvent>>>, SnapshotListener) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: SnapshotListener = Arc::new(move |e: &SnapshotEvent| sink.lock().push(e.clone()));
        (events, listener)
    }

    fn owner_only_store(uid: &str) -> (InMemoryDocumentStore, Arc<FixedPrincipal>) {
        let principal = Arc::new(FixedPrincipal(Mutex::new(Some(uid.to_string()))));
        let store = InMemoryDocumentStore::new()
            .with_rules(AccessRules::owner_only("userId"))
            .with_principal(principal.clone());
        (store, principal)
    }

    // ─── Live queries ───────────────────────────────────────────────

    #[tokio::test]
    async fn initial_snapshot_then_changes() {
        let store = InMemoryDocumentStore::new();
        store.insert("todos", fields("a", "one")).await.unwrap();

        let (events, listener) = recorder();
        let _reg = store.listen(Query::collection("todos").where_eq("userId", "a"), listener);
        store.insert("todos", fields("a", "two")).await.unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().len(), 1);
        assert_eq!(events[1].as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unrelated_writes_do_not_fire() {
        let store = InMemoryDocumentStore::new();
        let (events, listener) = recorder();
        let _reg = store.listen(Query::collection("todos").where_eq("userId", "a"), listener);
        store.insert("todos", fields("b", "theirs")).await.unwrap();
        store.insert("other", fields("a", "elsewhere")).await.unwrap();
        assert_eq!(events.lock().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_listener_is_silent_and_unregistered() {
        let store = InMemoryDocumentStore::new();
        let (events, listener) = recorder();
        let reg = store.listen(Query::collection("todos"), listener);
        assert_eq!(store.live_query_count(), 1);
        reg.cancel();
        reg.cancel();
        assert_eq!(store.live_query_count(), 0);
        store.insert("todos", fields("a", "x")).await.unwrap();
        assert_eq!(events.lock().len(), 1);
    }

    #[tokio::test]
    async fn timestamps_resolved_on_commit() {
        let store = InMemoryDocumentStore::new();
        store.insert("todos", fields("a", "x")).await.unwrap();
        let docs = store.documents("todos");
        assert!(docs[0].get("createdAt").unwrap().as_timestamp().is_some());
    }

    #[tokio::test]
    async fn terminate_delivers_error_and_drops_listeners() {
        let store = InMemoryDocumentStore::new();
        let (events, listener) = recorder();
        let _reg = store.listen(Query::collection("todos"), listener);
        store.terminate_live_queries(StoreError::Unavailable("gone".into()));
        store.insert("todos", fields("a", "x")).await.unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(StoreError::Unavailable(_))));
        assert_eq!(store.live_query_count(), 0);
    }

    // ─── Writes ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store.delete("todos", "nope").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                collection: "todos".into(),
                id: "nope".into()
            }
        );
    }

    #[tokio::test]
    async fn empty_arguments_rejected() {
        let store = InMemoryDocumentStore::new();
        assert!(matches!(
            store.insert("", Fields::new()).await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.delete("todos", "").await,
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn offline_rejects_writes_and_listens() {
        let store = InMemoryDocumentStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.insert("todos", fields("a", "x")).await,
            Err(StoreError::Unavailable(_))
        ));

        let (events, listener) = recorder();
        let reg = store.listen(Query::collection("todos"), listener);
        assert!(!reg.is_active());
        assert!(matches!(events.lock()[0], Err(StoreError::Unavailable(_))));
        assert_eq!(store.live_query_count(), 0);
    }

    #[tokio::test]
    async fn generated_ids_are_unique_simple_uuids() {
        let store = InMemoryDocumentStore::new();
        let a = store.insert("todos", fields("a", "x")).await.unwrap();
        let b = store.insert("todos", fields("a", "y")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(!a.contains('-'));
    }

    // ─── Latency compensation ───────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn pending_then_resolved() {
        let store = InMemoryDocumentStore::new().with_write_latency(Duration::from_millis(50));
        let (events, listener) = recorder();
        let _reg = store.listen(Query::collection("todos"), listener);
        store.insert("todos", fields("a", "x")).await.unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 3);
        let pending = events[1].as_ref().unwrap();
        assert!(pending.has_pending_writes);
        let committed = events[2].as_ref().unwrap();
        assert!(!committed.has_pending_writes);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commit_rolls_back() {
        let store = Arc::new(
            InMemoryDocumentStore::new().with_write_latency(Duration::from_millis(50)),
        );
        let (events, listener) = recorder();
        let _reg = store.listen(Query::collection("todos"), listener);

        let writer = Arc::clone(&store);
        let write = tokio::spawn(async move { writer.insert("todos", fields("a", "x")).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.set_offline(true);

        assert!(matches!(
            write.await.unwrap(),
            Err(StoreError::Unavailable(_))
        ));
        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert!(events[2].as_ref().unwrap().is_empty());
        assert!(store.documents("todos").is_empty());
    }

    // ─── Access rules ───────────────────────────────────────────────

    #[tokio::test]
    async fn owner_only_listen_must_filter_on_principal() {
        let (store, _principal) = owner_only_store("a");
        let (events, listener) = recorder();
        let _reg = store.listen(Query::collection("todos").where_eq("userId", "b"), listener);
        assert!(matches!(
            events.lock()[0],
            Err(StoreError::PermissionDenied(_))
        ));
        assert_eq!(store.live_query_count(), 0);
    }

    #[tokio::test]
    async fn owner_only_delete_and_get() {
        let (store, principal) = owner_only_store("a");
        let id = store.insert("todos", fields("a", "mine")).await.unwrap();

        *principal.0.lock() = Some("b".into());
        assert!(matches!(
            store.get("todos", &id).await,
            Err(StoreError::PermissionDenied(_))
        ));
        assert!(matches!(
            store.delete("todos", &id).await,
            Err(StoreError::PermissionDenied(_))
        ));

        *principal.0.lock() = Some("a".into());
        assert!(store.get("todos", &id).await.unwrap().is_some());
        store.delete("todos", &id).await.unwrap();
        assert!(store.get("todos", &id).await.unwrap().is_none());
    }
}

//! Shared fixtures for integration tests.
//!
//! [`ScriptedStore`] is a `DocumentStore` that never delivers anything on its
//! own: tests push snapshot events into any registration, including ones
//! that have already been cancelled, to simulate a store that delivers late.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tasksync::config::TaskSchema;
use tasksync::error::StoreError;
use tasksync::store::{DocumentStore, SnapshotListener};
use tasksync::types::{Document, DocumentId, FieldValue, Fields, Query, QuerySnapshot, SnapshotEvent, Task};
use tasksync::Subscription;

/// A store call as observed by [`ScriptedStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Listen(Query),
    Insert { collection: String, fields: Fields },
    Delete { collection: String, id: String },
    Get { collection: String, id: String },
}

struct Registration {
    query: Query,
    listener: SnapshotListener,
    active: Arc<AtomicBool>,
}

/// Hand-driven document store.
#[derive(Default)]
pub struct ScriptedStore {
    registrations: Mutex<Vec<Registration>>,
    calls: Mutex<Vec<Call>>,
    write_error: Mutex<Option<StoreError>>,
    documents: Mutex<Vec<Document>>,
    next_id: AtomicU64,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of `listen` calls so far.
    pub fn listen_count(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Number of registrations not cancelled yet.
    pub fn active_count(&self) -> usize {
        self.registrations
            .lock()
            .iter()
            .filter(|r| r.active.load(Ordering::Acquire))
            .count()
    }

    /// Returns `true` if registration `index` has not been cancelled.
    pub fn is_active(&self, index: usize) -> bool {
        self.registrations.lock()[index].active.load(Ordering::Acquire)
    }

    /// Query of registration `index`.
    pub fn query(&self, index: usize) -> Query {
        self.registrations.lock()[index].query.clone()
    }

    /// Delivers `event` to registration `index`, cancelled or not.
    pub fn deliver(&self, index: usize, event: SnapshotEvent) {
        let listener = Arc::clone(&self.registrations.lock()[index].listener);
        listener(&event);
    }

    /// Delivers `event` to the most recent registration.
    pub fn deliver_latest(&self, event: SnapshotEvent) {
        let last = self.listen_count() - 1;
        self.deliver(last, event);
    }

    /// Makes every following insert and delete fail with `error`.
    pub fn fail_writes_with(&self, error: StoreError) {
        *self.write_error.lock() = Some(error);
    }

    /// Seeds a document returned by `get`.
    pub fn seed(&self, doc: Document) {
        self.documents.lock().push(doc);
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    fn listen(&self, query: Query, listener: SnapshotListener) -> Subscription {
        self.calls.lock().push(Call::Listen(query.clone()));
        let active = Arc::new(AtomicBool::new(true));
        self.registrations.lock().push(Registration {
            query,
            listener,
            active: Arc::clone(&active),
        });
        Subscription::new(move || active.store(false, Ordering::Release))
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        self.calls.lock().push(Call::Insert {
            collection: collection.to_string(),
            fields,
        });
        if let Some(error) = self.write_error.lock().clone() {
            return Err(error);
        }
        Ok(format!("doc-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.calls.lock().push(Call::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        if let Some(error) = self.write_error.lock().clone() {
            return Err(error);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.calls.lock().push(Call::Get {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        Ok(self.documents.lock().iter().find(|d| d.id == id).cloned())
    }
}

/// A resolved task document in the default layout.
pub fn task_doc(id: &str, owner: &str, text: &str) -> Document {
    let mut fields = Task::new_record(text, owner, &TaskSchema::default());
    fields.insert("createdAt".into(), FieldValue::Timestamp(chrono::Utc::now()));
    Document::new(id, fields)
}

/// A committed snapshot of `docs`.
pub fn snapshot(docs: Vec<Document>) -> SnapshotEvent {
    Ok(QuerySnapshot {
        documents: docs,
        has_pending_writes: false,
    })
}

/// Records every list published by `on_change` as its task texts.
pub fn record_texts(
    manager: &tasksync::TaskSubscriptionManager,
) -> (Arc<Mutex<Vec<Vec<String>>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let registration = manager.on_change(move |list: &tasksync::TaskList| {
        sink.lock()
            .push(list.texts().into_iter().map(str::to_string).collect());
    });
    (seen, registration)
}

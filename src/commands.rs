//! Task create/delete commands.
//!
//! Commands only write to the store. The materialized list is updated by the
//! live query when the store reflects the write, never directly.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::TaskListConfig;
use crate::error::{CommandError, StoreError};
use crate::store::DocumentStore;
use crate::types::{FieldValue, Identity, Task, TaskId};

/// Issues task writes against the document store.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tasksync::commands::TaskCommandService;
/// use tasksync::config::TaskListConfig;
/// use tasksync::error::CommandError;
/// use tasksync::store::InMemoryDocumentStore;
/// use tasksync::types::Identity;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(InMemoryDocumentStore::new());
/// let commands = TaskCommandService::new(store.clone(), TaskListConfig::default());
/// let ada = Identity::new("ada", "ada@example.com");
///
/// let id = commands.create_task("buy milk", &ada).await.unwrap();
/// assert_eq!(store.documents("todos").len(), 1);
///
/// let err = commands.create_task("   ", &ada).await.unwrap_err();
/// assert!(matches!(err, CommandError::InvalidInput(_)));
///
/// commands.delete_task(&id).await.unwrap();
/// assert!(store.documents("todos").is_empty());
/// # }
/// ```
#[derive(Clone)]
pub struct TaskCommandService {
    store: Arc<dyn DocumentStore>,
    config: TaskListConfig,
}

impl TaskCommandService {
    /// Creates a command service writing to `config.collection`.
    pub fn new(store: Arc<dyn DocumentStore>, config: TaskListConfig) -> Self {
        Self { store, config }
    }

    /// Checks task text without touching the store.
    ///
    /// # Errors
    ///
    /// [`CommandError::InvalidInput`] if `text` is empty, whitespace-only or
    /// longer than `max_text_len` characters.
    pub fn validate_text(&self, text: &str) -> Result<(), CommandError> {
        if text.trim().is_empty() {
            return Err(CommandError::InvalidInput("task text is empty".to_string()));
        }
        let len = text.chars().count();
        if len > self.config.max_text_len {
            return Err(CommandError::InvalidInput(format!(
                "task text is {len} characters, maximum is {}",
                self.config.max_text_len
            )));
        }
        Ok(())
    }

    /// Creates a task owned by `identity` and returns its id once the store
    /// acknowledges the write.
    ///
    /// The text is stored as given. The creation time is a server timestamp.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidInput`] before any store call, see
    ///   [`validate_text`](Self::validate_text).
    /// - [`CommandError::StoreWriteFailed`] if the store rejects the insert.
    pub async fn create_task(&self, text: &str, identity: &Identity) -> Result<TaskId, CommandError> {
        self.validate_text(text)?;
        let record = Task::new_record(text, &identity.uid, &self.config.schema);
        let id = self.store.insert(&self.config.collection, record).await?;
        debug!(id = %id, uid = %identity.uid, "task created");
        Ok(TaskId::new(id))
    }

    /// Deletes a task by id. Authorization is left to the store.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidInput`] for an empty id.
    /// - [`CommandError::StoreWriteFailed`] if the task does not exist or the
    ///   store rejects the delete.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), CommandError> {
        if task_id.as_str().is_empty() {
            return Err(CommandError::InvalidInput("task id is empty".to_string()));
        }
        self.store
            .delete(&self.config.collection, task_id.as_str())
            .await?;
        debug!(id = %task_id, "task deleted");
        Ok(())
    }

    /// Deletes a task after checking it belongs to `identity`.
    ///
    /// # Errors
    ///
    /// - [`CommandError::InvalidInput`] for an empty id.
    /// - [`CommandError::NotOwner`] if the stored owner is someone else.
    /// - [`CommandError::StoreWriteFailed`] if the read or the delete fails,
    ///   including when the task does not exist.
    pub async fn delete_owned_task(
        &self,
        task_id: &TaskId,
        identity: &Identity,
    ) -> Result<(), CommandError> {
        if task_id.as_str().is_empty() {
            return Err(CommandError::InvalidInput("task id is empty".to_string()));
        }
        let collection = &self.config.collection;
        let doc = self
            .store
            .get(collection, task_id.as_str())
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.clone(),
                id: task_id.to_string(),
            })?;

        let owner = doc
            .get(&self.config.schema.owner_field)
            .and_then(FieldValue::as_str);
        if owner != Some(identity.uid.as_str()) {
            debug!(id = %task_id, uid = %identity.uid, owner = ?owner, "delete refused");
            return Err(CommandError::NotOwner {
                task_id: task_id.to_string(),
                uid: identity.uid.clone(),
            });
        }
        self.delete_task(task_id).await
    }
}

impl fmt::Debug for TaskCommandService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCommandService")
            .field("config", &self.config)
            .finish()
    }
}

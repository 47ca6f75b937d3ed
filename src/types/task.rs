//! Task domain type and the materialized task list.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TaskSchema;
use crate::types::document::{Document, FieldValue, Fields};

/// Store-assigned task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a store document id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Creation timestamp assigned by the server.
///
/// `Pending` until the store acknowledges the write that created the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "at", rename_all = "camelCase")]
pub enum ServerTimestamp {
    /// Written locally, not yet acknowledged.
    Pending,
    /// Acknowledged at the given server time.
    Resolved(DateTime<Utc>),
}

impl ServerTimestamp {
    /// Returns `true` while the server has not acknowledged the write.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The resolved time, if any.
    pub fn resolved(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Resolved(at) => Some(*at),
            Self::Pending => None,
        }
    }
}

/// A user's task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned identifier.
    pub id: TaskId,

    /// Uid of the identity that created the task.
    pub owner_id: String,

    /// Non-empty task text.
    pub text: String,

    /// Server-assigned creation time.
    pub created_at: ServerTimestamp,
}

/// Why a document could not be read as a [`Task`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskDecodeError {
    /// A required string field is absent or not a string.
    #[error("document {id}: field `{field}` missing or not a string")]
    MissingField {
        /// Document id.
        id: String,
        /// Field name.
        field: String,
    },

    /// The text field is empty.
    #[error("document {id}: empty task text")]
    EmptyText {
        /// Document id.
        id: String,
    },
}

impl Task {
    /// Decodes a task from a store document laid out per `schema`.
    ///
    /// A missing, null or sentinel creation time decodes as
    /// [`ServerTimestamp::Pending`].
    ///
    /// # Errors
    ///
    /// [`TaskDecodeError`] if the owner or text field is missing, or the text
    /// is empty.
    pub fn from_document(doc: &Document, schema: &TaskSchema) -> Result<Self, TaskDecodeError> {
        let string_field = |field: &str| {
            doc.get(field)
                .and_then(FieldValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| TaskDecodeError::MissingField {
                    id: doc.id.clone(),
                    field: field.to_string(),
                })
        };

        let owner_id = string_field(&schema.owner_field)?;
        let text = string_field(&schema.text_field)?;
        if text.is_empty() {
            return Err(TaskDecodeError::EmptyText { id: doc.id.clone() });
        }
        let created_at = doc
            .get(&schema.created_at_field)
            .and_then(FieldValue::as_timestamp)
            .map_or(ServerTimestamp::Pending, ServerTimestamp::Resolved);

        Ok(Self {
            id: TaskId::new(doc.id.clone()),
            owner_id,
            text,
            created_at,
        })
    }

    /// Builds the field map written when creating a task: text, owner and a
    /// server timestamp sentinel.
    pub fn new_record(text: &str, owner_id: &str, schema: &TaskSchema) -> Fields {
        let mut fields = Fields::new();
        fields.insert(schema.text_field.clone(), FieldValue::from(text));
        fields.insert(schema.owner_field.clone(), FieldValue::from(owner_id));
        fields.insert(schema.created_at_field.clone(), FieldValue::ServerTimestamp);
        fields
    }
}

/// Materialized view of the live query: tasks keyed by id, in arrival order.
///
/// A `TaskList` is a read cache rebuilt in full from every snapshot; it is
/// never mutated independently.
///
/// # Examples
///
/// ```
/// use tasksync::types::{ServerTimestamp, Task, TaskId, TaskList};
///
/// let list: TaskList = vec![Task {
///     id: TaskId::new("t1"),
///     owner_id: "u1".into(),
///     text: "buy milk".into(),
///     created_at: ServerTimestamp::Pending,
/// }]
/// .into_iter()
/// .collect();
///
/// assert_eq!(list.len(), 1);
/// assert_eq!(list.get(&TaskId::new("t1")).map(|t| t.text.as_str()), Some("buy milk"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskList {
    tasks: IndexMap<TaskId, Task>,
}

impl TaskList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if the list holds no task.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks up a task by id.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Returns `true` if a task with `id` is present.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Iterates tasks in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Task texts in arrival order.
    pub fn texts(&self) -> Vec<&str> {
        self.tasks.values().map(|t| t.text.as_str()).collect()
    }
}

impl FromIterator<Task> for TaskList {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        // Later duplicates replace the value but keep the first position.
        Self {
            tasks: iter.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TaskList {
    type Item = &'a Task;
    type IntoIter = indexmap::map::Values<'a, TaskId, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.values()
    }
}

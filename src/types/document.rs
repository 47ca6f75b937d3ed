//! Document store data model: field values, documents, queries, snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Store-assigned document identifier.
pub type DocumentId = String;

/// Ordered field map of a document.
pub type Fields = IndexMap<String, FieldValue>;

/// A single field value.
///
/// [`FieldValue::ServerTimestamp`] is a write sentinel: the store replaces it
/// with its own clock when the write commits. While a write is still pending
/// (latency compensation), readers see the sentinel in place of the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Resolved timestamp.
    Timestamp(DateTime<Utc>),
    /// Server timestamp sentinel (write) / not-yet-acknowledged value (read).
    ServerTimestamp,
}

impl FieldValue {
    /// Returns the string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp, if resolved.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// A stored document: identifier plus ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier, unique within its collection.
    pub id: DocumentId,

    /// Field values in write order.
    pub fields: Fields,
}

impl Document {
    /// Creates a document.
    pub fn new(id: impl Into<DocumentId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Looks up a field.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Returns `true` if any field still holds a server timestamp sentinel.
    pub fn has_pending_fields(&self) -> bool {
        self.fields
            .values()
            .any(|v| matches!(v, FieldValue::ServerTimestamp))
    }
}

/// A filter clause of a [`Query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`.
    Equals {
        /// Field name.
        field: String,
        /// Expected value.
        value: FieldValue,
    },
}

impl Filter {
    /// Evaluates the filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Equals { field, value } => doc.get(field) == Some(value),
        }
    }
}

/// A filtered query over one collection.
///
/// # Examples
///
/// ```
/// use tasksync::types::{Document, Fields, FieldValue, Query};
///
/// let query = Query::collection("todos").where_eq("userId", "u1");
///
/// let mut fields = Fields::new();
/// fields.insert("userId".into(), FieldValue::from("u1"));
/// assert!(query.matches(&Document::new("d1", fields)));
/// assert_eq!(query.equality_value("userId").and_then(|v| v.as_str()), Some("u1"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection the query runs against.
    pub collection: String,

    /// Conjunction of filters.
    pub filters: Vec<Filter>,
}

impl Query {
    /// Creates an unfiltered query over `collection`.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
        }
    }

    /// Adds an equality filter.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Returns `true` if the document satisfies every filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Value of the equality filter on `field`, if the query has one.
    pub fn equality_value(&self, field: &str) -> Option<&FieldValue> {
        self.filters.iter().find_map(|f| match f {
            Filter::Equals { field: name, value } if name == field => Some(value),
            _ => None,
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection)?;
        for (i, filter) in self.filters.iter().enumerate() {
            let sep = if i == 0 { " where " } else { " and " };
            match filter {
                Filter::Equals { field, value } => write!(f, "{sep}{field} == {value:?}")?,
            }
        }
        Ok(())
    }
}

/// Full result set of a live query at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySnapshot {
    /// Every matching document, in store order.
    pub documents: Vec<Document>,

    /// `true` if the snapshot reflects local writes the server has not
    /// acknowledged yet.
    pub has_pending_writes: bool,
}

impl QuerySnapshot {
    /// Number of documents in the snapshot.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Event delivered to live query listeners.
pub type SnapshotEvent = Result<QuerySnapshot, StoreError>;

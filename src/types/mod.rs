//! Domain and store data types.

pub mod document;
pub mod identity;
pub mod task;

pub use document::{
    Document, DocumentId, FieldValue, Fields, Filter, Query, QuerySnapshot, SnapshotEvent,
};
pub use identity::{CredentialsMetadata, Identity};
pub use task::{ServerTimestamp, Task, TaskDecodeError, TaskId, TaskList};

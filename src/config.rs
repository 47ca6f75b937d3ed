//! Configuration for the task list core.
//!
//! Loaded from TOML; every key is optional and falls back to the defaults
//! below.
//!
//! ```toml
//! collection = "todos"
//! max_text_len = 280
//! verify_ownership_on_delete = true
//!
//! [schema]
//! owner_field = "userId"
//! text_field = "task"
//! created_at_field = "createdAt"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CREATED_AT_FIELD, DEFAULT_COLLECTION, DEFAULT_MAX_TEXT_LEN, OWNER_FIELD, TEXT_FIELD,
};
use crate::error::{Error, Result};

/// Field layout of task documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSchema {
    /// Field holding the owner's uid. Default: `userId`.
    pub owner_field: String,

    /// Field holding the task text. Default: `task`.
    pub text_field: String,

    /// Field holding the server creation timestamp. Default: `createdAt`.
    pub created_at_field: String,
}

impl Default for TaskSchema {
    fn default() -> Self {
        Self {
            owner_field: OWNER_FIELD.to_string(),
            text_field: TEXT_FIELD.to_string(),
            created_at_field: CREATED_AT_FIELD.to_string(),
        }
    }
}

/// Settings shared by the subscription manager and the command service.
///
/// # Defaults
///
/// | Setting                      | Default   |
/// |------------------------------|-----------|
/// | `collection`                 | `todos`   |
/// | `max_text_len`               | 1000      |
/// | `verify_ownership_on_delete` | false     |
///
/// # Examples
///
/// ```
/// use tasksync::config::TaskListConfig;
///
/// let config = TaskListConfig::default()
///     .with_collection("tasks")
///     .with_ownership_check(true);
/// assert_eq!(config.collection, "tasks");
/// assert!(config.verify_ownership_on_delete);
/// assert_eq!(config.schema.owner_field, "userId");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskListConfig {
    /// Collection holding task documents.
    pub collection: String,

    /// Document field layout.
    pub schema: TaskSchema,

    /// Maximum task text length in characters.
    pub max_text_len: usize,

    /// When `true`, deletes read the task first and refuse to delete tasks
    /// owned by another identity. When `false` the store's access rules are
    /// the only authorization boundary.
    pub verify_ownership_on_delete: bool,
}

impl Default for TaskListConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            schema: TaskSchema::default(),
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            verify_ownership_on_delete: false,
        }
    }
}

impl TaskListConfig {
    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the TOML is malformed or has wrong types.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Into::into)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, [`Error::Config`] if it
    /// cannot be parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Sets the task collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Sets the maximum task text length.
    pub fn with_max_text_len(mut self, max: usize) -> Self {
        self.max_text_len = max;
        self
    }

    /// Enables or disables the client-side ownership check on delete.
    pub fn with_ownership_check(mut self, enabled: bool) -> Self {
        self.verify_ownership_on_delete = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TaskListConfig::default();
        assert_eq!(config.collection, "todos");
        assert_eq!(config.schema.text_field, "task");
        assert_eq!(config.schema.created_at_field, "createdAt");
        assert_eq!(config.max_text_len, 1000);
        assert!(!config.verify_ownership_on_delete);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        assert_eq!(TaskListConfig::from_toml("").unwrap(), TaskListConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let config = TaskListConfig::from_toml(
            r#"
            collection = "notes"
            max_text_len = 280

            [schema]
            owner_field = "ownerUid"
            "#,
        )
        .unwrap();
        assert_eq!(config.collection, "notes");
        assert_eq!(config.max_text_len, 280);
        assert_eq!(config.schema.owner_field, "ownerUid");
        assert_eq!(config.schema.text_field, "task");
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = TaskListConfig::from_toml("max_text_len = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = TaskListConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}

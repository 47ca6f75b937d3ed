//! Collection and field name defaults for the task documents.

/// Collection holding task documents.
pub const DEFAULT_COLLECTION: &str = "todos";

/// Field carrying the owner's uid.
pub const OWNER_FIELD: &str = "userId";

/// Field carrying the task text.
pub const TEXT_FIELD: &str = "task";

/// Field carrying the server-assigned creation timestamp.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Default upper bound on task text length, in characters.
pub const DEFAULT_MAX_TEXT_LEN: usize = 1000;

/// Provider id reported for email/password identities.
pub const PASSWORD_PROVIDER_ID: &str = "password";

//! Error types for identity, subscription and command operations.
//!
//! The taxonomy follows the failure sources of the core:
//!
//! - [`AuthError`] - sign-up / sign-in / sign-out failures (bad credentials,
//!   duplicate account, network).
//! - [`SubscriptionError`] - a live query that failed to open or died.
//! - [`CommandError`] - create/delete rejected locally or by the store.
//! - [`StoreError`] - raw document store failures, carried by the above.
//!
//! [`Error`] aggregates them for the session facade. None of them is fatal:
//! every error is reported upward for the caller to display, retry or
//! prompt re-authentication.

use std::path::PathBuf;

use thiserror::Error;

/// Classification of authentication failures.
///
/// Each kind maps to a provider-style code via [`AuthErrorKind::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// The email address is malformed.
    InvalidEmail,
    /// The password does not satisfy the provider's policy.
    WeakPassword,
    /// Sign-up with an email that already has an account.
    EmailAlreadyInUse,
    /// Sign-in with an email that has no account.
    UserNotFound,
    /// Sign-in with a wrong password.
    WrongPassword,
    /// The auth provider could not be reached.
    NetworkRequestFailed,
    /// Any other provider failure.
    Internal,
}

impl AuthErrorKind {
    /// Provider-style error code, e.g. `auth/email-already-in-use`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tasksync::error::AuthErrorKind;
    ///
    /// assert_eq!(AuthErrorKind::EmailAlreadyInUse.code(), "auth/email-already-in-use");
    /// assert_eq!(AuthErrorKind::WrongPassword.code(), "auth/wrong-password");
    /// ```
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidEmail => "auth/invalid-email",
            Self::WeakPassword => "auth/weak-password",
            Self::EmailAlreadyInUse => "auth/email-already-in-use",
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::NetworkRequestFailed => "auth/network-request-failed",
            Self::Internal => "auth/internal-error",
        }
    }
}

/// An authentication failure (`AuthFailure`).
///
/// # Examples
///
/// ```
/// use tasksync::error::{AuthError, AuthErrorKind};
///
/// let err = AuthError::new(AuthErrorKind::UserNotFound, "no account for a@b.io");
/// assert_eq!(err.code(), "auth/user-not-found");
/// assert!(err.to_string().contains("a@b.io"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({})", .kind.code())]
pub struct AuthError {
    /// What went wrong.
    pub kind: AuthErrorKind,
    /// Human-readable description suitable for display.
    pub message: String,
}

impl AuthError {
    /// Creates an auth error of the given kind.
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Provider-style error code.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

/// Failures reported by a [`DocumentStore`](crate::store::DocumentStore).
///
/// `StoreError` is `Clone` so it can travel inside snapshot events that are
/// fanned out to several listeners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store's access rules rejected the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The addressed document does not exist.
    #[error("document not found: {collection}/{id}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// Document identifier that was not found.
        id: String,
    },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request was malformed (empty id, bad query).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other backend failure.
    #[error("store error: {0}")]
    Internal(String),
}

/// A live query that failed to establish or died (`SubscriptionFailure`).
///
/// Delivered through the subscription manager's `on_error` listeners. The
/// materialized list is left at its last known value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task subscription for {uid} failed: {source}")]
pub struct SubscriptionError {
    /// The identity whose subscription failed.
    pub uid: String,
    /// The store failure that ended the subscription.
    #[source]
    pub source: StoreError,
}

/// Failures of the task command service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Rejected locally before any store call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store rejected the write.
    #[error("store write failed: {source}")]
    StoreWriteFailed {
        /// The underlying store failure.
        #[source]
        source: StoreError,
    },

    /// The client-side ownership guard refused a delete.
    #[error("task {task_id} is not owned by {uid}")]
    NotOwner {
        /// Task that was targeted.
        task_id: String,
        /// Identity that attempted the delete.
        uid: String,
    },
}

impl From<StoreError> for CommandError {
    fn from(source: StoreError) -> Self {
        Self::StoreWriteFailed { source }
    }
}

/// Crate-level error returned by the session facade.
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Subscription failure.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// The operation requires a signed-in identity.
    #[error("not signed in")]
    NotAuthenticated,

    /// The session was disposed.
    #[error("session disposed")]
    Disposed,

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` for failures the user can fix by retrying the same
    /// action later (network/store availability).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Auth(e) => e.kind == AuthErrorKind::NetworkRequestFailed,
            Self::Command(CommandError::StoreWriteFailed { source })
            | Self::Subscription(SubscriptionError { source, .. }) => {
                matches!(source, StoreError::Unavailable(_))
            },
            _ => false,
        }
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

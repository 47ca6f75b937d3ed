//! Authenticated user reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credentials metadata attached to an [`Identity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsMetadata {
    /// Email the account was registered with.
    pub email: String,

    /// Sign-in provider (`"password"` for email/password accounts).
    pub provider_id: String,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the identity last signed in.
    pub last_sign_in_at: DateTime<Utc>,
}

/// The authenticated user: an opaque `uid` plus credentials metadata.
///
/// Identities compare by `uid` only ([`Identity::same_user`]) when the core
/// decides whether an auth transition is a real identity change; full
/// equality also considers metadata.
///
/// # Examples
///
/// ```
/// use tasksync::types::Identity;
///
/// let alice = Identity::new("uid-alice", "alice@example.com");
/// assert_eq!(alice.uid, "uid-alice");
/// assert_eq!(alice.email(), "alice@example.com");
/// assert!(alice.same_user(&Identity::new("uid-alice", "other@example.com")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Opaque unique user identifier.
    pub uid: String,

    /// Credentials metadata.
    pub metadata: CredentialsMetadata,
}

impl Identity {
    /// Creates an email/password identity signed in now.
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.into(),
            metadata: CredentialsMetadata {
                email: email.into(),
                provider_id: crate::constants::PASSWORD_PROVIDER_ID.to_string(),
                created_at: now,
                last_sign_in_at: now,
            },
        }
    }

    /// Email the identity signed in with.
    #[inline]
    pub fn email(&self) -> &str {
        &self.metadata.email
    }

    /// Returns `true` if both identities refer to the same user.
    pub fn same_user(&self, other: &Identity) -> bool {
        self.uid == other.uid
    }
}

/// Compares two optional identities by uid.
pub(crate) fn same_identity(a: Option<&Identity>, b: Option<&Identity>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_user(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let id = Identity::new("u1", "u1@example.com");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["uid"], "u1");
        assert_eq!(json["metadata"]["providerId"], "password");
        assert!(json["metadata"].get("lastSignInAt").is_some());
    }

    #[test]
    fn optional_identity_comparison() {
        let a = Identity::new("a", "a@example.com");
        let b = Identity::new("b", "b@example.com");
        assert!(same_identity(None, None));
        assert!(same_identity(Some(&a), Some(&a.clone())));
        assert!(!same_identity(Some(&a), Some(&b)));
        assert!(!same_identity(Some(&a), None));
    }
}

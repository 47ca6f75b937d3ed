//! In-memory email/password authentication.
//!
//! Accounts are keyed by normalized email (trimmed, lower-cased). Passwords
//! are never stored: each account keeps a random salt and the base64 SHA-256
//! digest of `salt || password`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::constants::PASSWORD_PROVIDER_ID;
use crate::error::{AuthError, AuthErrorKind};
use crate::reactive::{Listener, Subject, Subscription};
use crate::store::PrincipalProvider;
use crate::types::{CredentialsMetadata, Identity};

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

/// Credential policy of [`InMemoryAuthService`].
///
/// # Defaults
///
/// | Setting            | Default |
/// |--------------------|---------|
/// | `min_password_len` | 6       |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Minimum password length in characters.
    pub min_password_len: usize,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            min_password_len: 6,
        }
    }
}

struct Account {
    uid: String,
    email: String,
    salt: String,
    digest: String,
    created_at: DateTime<Utc>,
}

impl Account {
    fn identity(&self, signed_in_at: DateTime<Utc>) -> Identity {
        Identity {
            uid: self.uid.clone(),
            metadata: CredentialsMetadata {
                email: self.email.clone(),
                provider_id: PASSWORD_PROVIDER_ID.to_string(),
                created_at: self.created_at,
                last_sign_in_at: signed_in_at,
            },
        }
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(AuthError::new(
            AuthErrorKind::InvalidEmail,
            "The email address is badly formatted.",
        ));
    }
    Ok(email)
}

/// In-memory [`AuthService`] with a single session.
///
/// Also acts as the [`PrincipalProvider`] of an
/// [`InMemoryDocumentStore`](crate::store::InMemoryDocumentStore) so store
/// access rules see the signed-in uid.
///
/// # Examples
///
/// ```
/// use tasksync::auth::{AuthService, InMemoryAuthService};
/// use tasksync::error::AuthErrorKind;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let auth = InMemoryAuthService::new();
/// let ada = auth.create_account("Ada@Example.com ", "secret1").await.unwrap();
/// assert_eq!(ada.email(), "ada@example.com");
///
/// let err = auth.create_account("ada@example.com", "another1").await.unwrap_err();
/// assert_eq!(err.kind, AuthErrorKind::EmailAlreadyInUse);
/// assert_eq!(err.code(), "auth/email-already-in-use");
/// # }
/// ```
pub struct InMemoryAuthService {
    accounts: DashMap<String, Account>,
    session: Mutex<Option<Identity>>,
    state: Subject<Option<Identity>>,
    policy: AuthPolicy,
    offline: AtomicBool,
}

impl InMemoryAuthService {
    /// Creates a service with the default [`AuthPolicy`].
    pub fn new() -> Self {
        Self::with_policy(AuthPolicy::default())
    }

    /// Creates a service with a custom policy.
    pub fn with_policy(policy: AuthPolicy) -> Self {
        Self {
            accounts: DashMap::new(),
            session: Mutex::new(None),
            state: Subject::with_value(None),
            policy,
            offline: AtomicBool::new(false),
        }
    }

    /// Ends the session as a token expiry would.
    pub fn expire_session(&self) {
        if self.session.lock().is_some() {
            info!("session expired");
            self.set_session(None);
        }
    }

    /// Simulates losing (or regaining) connectivity. While offline every
    /// credential operation fails with `NetworkRequestFailed`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Number of registered accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Number of auth-state listeners.
    pub fn listener_count(&self) -> usize {
        self.state.listener_count()
    }

    fn ensure_online(&self) -> Result<(), AuthError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(AuthError::new(
                AuthErrorKind::NetworkRequestFailed,
                "A network error has occurred.",
            ));
        }
        Ok(())
    }

    fn set_session(&self, identity: Option<Identity>) {
        {
            // Held across the push so notification order matches session order.
            let mut session = self.session.lock();
            *session = identity.clone();
            self.state.push(identity);
        }
        self.state.drain();
    }
}

impl Default for InMemoryAuthService {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryAuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryAuthService")
            .field("accounts", &self.accounts.len())
            .field("current", &self.session.lock().as_ref().map(|i| i.uid.clone()))
            .field("policy", &self.policy)
            .finish()
    }
}

#[async_trait]
impl AuthService for InMemoryAuthService {
    fn on_auth_state_changed(&self, listener: Listener<Option<Identity>>) -> Subscription {
        self.state.subscribe(move |identity| listener(identity))
    }

    fn current_identity(&self) -> Option<Identity> {
        self.session.lock().clone()
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.ensure_online()?;
        let email = normalize_email(email)?;
        if password.chars().count() < self.policy.min_password_len {
            return Err(AuthError::new(
                AuthErrorKind::WeakPassword,
                format!(
                    "Password should be at least {} characters.",
                    self.policy.min_password_len
                ),
            ));
        }

        let identity = match self.accounts.entry(email.clone()) {
            Entry::Occupied(_) => {
                return Err(AuthError::new(
                    AuthErrorKind::EmailAlreadyInUse,
                    "The email address is already in use by another account.",
                ));
            },
            Entry::Vacant(slot) => {
                let salt = Uuid::new_v4().simple().to_string();
                let now = Utc::now();
                let account = Account {
                    uid: Uuid::new_v4().simple().to_string(),
                    email,
                    digest: digest(&salt, password),
                    salt,
                    created_at: now,
                };
                let identity = account.identity(now);
                slot.insert(account);
                identity
            },
        };

        info!(uid = %identity.uid, "account created");
        self.set_session(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.ensure_online()?;
        let email = normalize_email(email)?;
        let identity = {
            let account = self.accounts.get(&email).ok_or_else(|| {
                AuthError::new(
                    AuthErrorKind::UserNotFound,
                    "There is no user record corresponding to this identifier.",
                )
            })?;
            if digest(&account.salt, password) != account.digest {
                debug!(uid = %account.uid, "wrong password");
                return Err(AuthError::new(
                    AuthErrorKind::WrongPassword,
                    "The password is invalid.",
                ));
            }
            account.identity(Utc::now())
        };

        info!(uid = %identity.uid, "signed in");
        self.set_session(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.ensure_online()?;
        if self.session.lock().is_some() {
            info!("signed out");
            self.set_session(None);
        }
        Ok(())
    }
}

impl PrincipalProvider for InMemoryAuthService {
    fn principal(&self) -> Option<String> {
        self.session.lock().as_ref().map(|i| i.uid.clone())
    }
}

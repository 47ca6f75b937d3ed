//! Authentication service interface, identity monitor and the in-memory
//! email/password implementation.

pub mod memory;
pub mod monitor;

use async_trait::async_trait;

pub use memory::{AuthPolicy, InMemoryAuthService};
pub use monitor::IdentityMonitor;

use crate::error::AuthError;
use crate::reactive::{Listener, Subscription};
use crate::types::Identity;

/// An email/password authentication provider.
///
/// The provider owns the session: successful account creation and sign-in
/// make the new identity current, and every change of the current identity
/// (including expiry) is reported to auth-state listeners.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Listener invocations for one
/// service are serialized.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Registers `listener` for auth-state changes. The current state is
    /// delivered to it immediately.
    fn on_auth_state_changed(&self, listener: Listener<Option<Identity>>) -> Subscription;

    /// The identity currently signed in.
    fn current_identity(&self) -> Option<Identity>;

    /// Creates an account and signs it in.
    ///
    /// # Errors
    ///
    /// [`AuthError`] with kind `InvalidEmail`, `WeakPassword`,
    /// `EmailAlreadyInUse` or `NetworkRequestFailed`.
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Signs in an existing account.
    ///
    /// # Errors
    ///
    /// [`AuthError`] with kind `InvalidEmail`, `UserNotFound`,
    /// `WrongPassword` or `NetworkRequestFailed`.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Ends the current session. Signing out while signed out succeeds.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

//! Store-side access rules.
//!
//! The store, not the client core, is the authorization boundary. Rules are
//! evaluated against the principal reported by a [`PrincipalProvider`]
//! (normally the auth service the client is signed in with).

use crate::error::StoreError;
use crate::types::{Document, Fields, Query};

/// Reports the uid the store should treat as the caller.
pub trait PrincipalProvider: Send + Sync {
    /// Current principal uid, or `None` when signed out.
    fn principal(&self) -> Option<String>;
}

/// Authorization rules enforced by a store.
///
/// # Examples
///
/// ```
/// use tasksync::store::AccessRules;
/// use tasksync::types::Query;
///
/// let rules = AccessRules::owner_only("userId");
/// let own = Query::collection("todos").where_eq("userId", "u1");
/// assert!(rules.check_listen(&own, Some("u1")).is_ok());
/// assert!(rules.check_listen(&own, Some("u2")).is_err());
/// assert!(rules.check_listen(&Query::collection("todos"), Some("u1")).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AccessRules {
    /// Every operation is allowed.
    #[default]
    Open,

    /// Documents are readable and writable only by the uid stored in
    /// `owner_field`.
    OwnerOnly {
        /// Field carrying the owner uid.
        owner_field: String,
    },
}

impl AccessRules {
    /// Owner-only rules keyed on `owner_field`.
    pub fn owner_only(owner_field: impl Into<String>) -> Self {
        Self::OwnerOnly {
            owner_field: owner_field.into(),
        }
    }

    /// A live query must be constrained to the principal's own documents.
    pub fn check_listen(&self, query: &Query, principal: Option<&str>) -> Result<(), StoreError> {
        match self {
            Self::Open => Ok(()),
            Self::OwnerOnly { owner_field } => {
                let uid = require_principal(principal)?;
                match query.equality_value(owner_field).and_then(|v| v.as_str()) {
                    Some(owner) if owner == uid => Ok(()),
                    _ => Err(StoreError::PermissionDenied(format!(
                        "query on {} must filter {owner_field} == {uid}",
                        query.collection
                    ))),
                }
            },
        }
    }

    /// A new document must name the principal as owner.
    pub fn check_insert(&self, fields: &Fields, principal: Option<&str>) -> Result<(), StoreError> {
        match self {
            Self::Open => Ok(()),
            Self::OwnerOnly { owner_field } => {
                let uid = require_principal(principal)?;
                match fields.get(owner_field).and_then(|v| v.as_str()) {
                    Some(owner) if owner == uid => Ok(()),
                    _ => Err(StoreError::PermissionDenied(format!(
                        "{owner_field} must equal the signed-in user"
                    ))),
                }
            },
        }
    }

    /// Reading or deleting an existing document requires ownership.
    pub fn check_access(&self, doc: &Document, principal: Option<&str>) -> Result<(), StoreError> {
        match self {
            Self::Open => Ok(()),
            Self::OwnerOnly { owner_field } => {
                let uid = require_principal(principal)?;
                match doc.get(owner_field).and_then(|v| v.as_str()) {
                    Some(owner) if owner == uid => Ok(()),
                    _ => Err(StoreError::PermissionDenied(format!(
                        "document {} is not owned by {uid}",
                        doc.id
                    ))),
                }
            },
        }
    }
}

fn require_principal(principal: Option<&str>) -> Result<&str, StoreError> {
    principal.ok_or_else(|| StoreError::PermissionDenied("not signed in".to_string()))
}

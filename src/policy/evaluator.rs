//! Exact-match permission evaluation

use crate::domain::Permission;
use crate::error::{AppError, AuthError};
use crate::jwt::Credential;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// Allow iff `required` appears verbatim in the credential's claims.
///
/// No wildcard, prefix or hierarchy matching. A missing credential is a deny.
pub fn authorize(credential: Option<&Credential>, required: &Permission) -> Decision {
    match credential {
        Some(credential) if credential.has_permission(required.as_str()) => Decision::Allow,
        _ => Decision::Deny,
    }
}

/// [`authorize`] for handlers: no credential is a 401, a missing claim is a 403.
pub fn require(credential: Option<&Credential>, required: &Permission) -> Result<(), AppError> {
    match (credential, authorize(credential, required)) {
        (_, Decision::Allow) => Ok(()),
        (None, Decision::Deny) => Err(AppError::Unauthenticated(AuthError::MissingToken)),
        (Some(credential), Decision::Deny) => {
            tracing::debug!(
                subject = %credential.subject(),
                permission = %required,
                "Permission denied"
            );
            Err(AppError::Forbidden(format!("missing permission {required}")))
        }
    }
}

//! Per-route policy enforcement

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::jwt::Credential;
use crate::policy::{Policy, PolicyProvider};
use std::sync::Arc;

/// Middleware state naming the policy a route requires
#[derive(Clone)]
pub struct RequiredPolicy {
    provider: PolicyProvider,
    name: Option<&'static str>,
}

impl RequiredPolicy {
    pub fn new(provider: PolicyProvider, name: &'static str) -> Self {
        Self {
            provider,
            name: Some(name),
        }
    }

    /// Require the provider's default policy (an authenticated caller)
    pub fn default_policy(provider: PolicyProvider) -> Self {
        Self {
            provider,
            name: None,
        }
    }

    fn resolve(&self) -> Result<Arc<Policy>, AppError> {
        match self.name {
            Some(name) => self.provider.get_policy(name).ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("no policy named {}", name))
            }),
            None => Ok(self.provider.default_policy()),
        }
    }
}

/// Resolve the route's policy and evaluate it against the request credential.
///
/// An unresolvable policy name is a routing error and surfaces as 500.
pub async fn require_policy(
    State(required): State<RequiredPolicy>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let policy = required.resolve()?;

    policy.enforce(request.extensions().get::<Credential>())?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::names;

    #[test]
    fn test_resolve_permission_policy() {
        let required = RequiredPolicy::new(PolicyProvider::default(), names::POLLS_READ);
        let policy = required.resolve().unwrap();
        assert_eq!(policy.name(), names::POLLS_READ);
    }

    #[test]
    fn test_resolve_default_policy() {
        let required = RequiredPolicy::default_policy(PolicyProvider::default());
        let policy = required.resolve().unwrap();
        assert_eq!(policy.name(), "default");
    }

    #[test]
    fn test_resolve_unknown_policy_is_internal_error() {
        let required = RequiredPolicy::new(PolicyProvider::default(), "polls:archive");
        assert!(matches!(required.resolve(), Err(AppError::Internal(_))));
    }
}

//! Policy resolution for names outside the permission vocabulary

use super::Policy;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves policy names to policies.
///
/// [`super::PolicyProvider`] implements this for permission names and
/// delegates everything else to another resolver.
#[cfg_attr(test, mockall::automock)]
pub trait PolicyResolver: Send + Sync {
    fn get_policy(&self, name: &str) -> Option<Arc<Policy>>;

    /// Policy applied to endpoints that ask for authorization without naming one
    fn default_policy(&self) -> Arc<Policy>;

    /// Policy applied to endpoints that declare nothing at all
    fn fallback_policy(&self) -> Option<Arc<Policy>>;
}

/// Explicitly registered named policies.
///
/// The default policy only requires an authenticated caller; there is no
/// fallback policy unless one is set.
#[derive(Debug, Clone)]
pub struct StaticPolicyResolver {
    policies: HashMap<String, Arc<Policy>>,
    default: Arc<Policy>,
    fallback: Option<Arc<Policy>>,
}

impl StaticPolicyResolver {
    pub fn new() -> Self {
        Self {
            policies: HashMap::new(),
            default: Arc::new(Policy::authenticated("default")),
            fallback: None,
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies
            .insert(policy.name().to_string(), Arc::new(policy));
        self
    }

    pub fn with_default(mut self, policy: Policy) -> Self {
        self.default = Arc::new(policy);
        self
    }

    pub fn with_fallback(mut self, policy: Policy) -> Self {
        self.fallback = Some(Arc::new(policy));
        self
    }
}

impl Default for StaticPolicyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyResolver for StaticPolicyResolver {
    fn get_policy(&self, name: &str) -> Option<Arc<Policy>> {
        self.policies.get(name).cloned()
    }

    fn default_policy(&self) -> Arc<Policy> {
        self.default.clone()
    }

    fn fallback_policy(&self) -> Option<Arc<Policy>> {
        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Requirement;

    #[test]
    fn test_registered_policy_is_returned() {
        let resolver = StaticPolicyResolver::new().with_policy(Policy::authenticated("signed-in"));

        let policy = resolver.get_policy("signed-in").unwrap();
        assert_eq!(policy.name(), "signed-in");
        assert_eq!(policy.requirements(), &[Requirement::Authenticated]);
        assert!(Arc::ptr_eq(&policy, &resolver.get_policy("signed-in").unwrap()));
    }

    #[test]
    fn test_unknown_policy_is_none() {
        let resolver = StaticPolicyResolver::new();
        assert!(resolver.get_policy("AdminOnly").is_none());
    }

    #[test]
    fn test_defaults() {
        let resolver = StaticPolicyResolver::default();
        assert_eq!(
            resolver.default_policy().requirements(),
            &[Requirement::Authenticated]
        );
        assert!(resolver.fallback_policy().is_none());
    }

    #[test]
    fn test_fallback_can_be_set() {
        let resolver =
            StaticPolicyResolver::new().with_fallback(Policy::authenticated("everything"));
        assert_eq!(resolver.fallback_policy().unwrap().name(), "everything");
    }
}

//! Named authorization policies.
//!
//! Any name in the permission vocabulary is a policy in its own right: the
//! first lookup builds a policy requiring exactly that permission and every
//! later lookup gets the same instance. Names outside the vocabulary go to
//! a fallback [`PolicyResolver`].

pub mod evaluator;
pub mod resolver;

pub use evaluator::{authorize, require, Decision};
pub use resolver::{PolicyResolver, StaticPolicyResolver};

use crate::domain::{Permission, PermissionCatalog};
use crate::error::{AppError, AuthError};
use crate::jwt::Credential;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any valid credential
    Authenticated,
    /// The credential must carry this exact permission
    Permission(Permission),
}

impl Requirement {
    fn evaluate(&self, credential: Option<&Credential>) -> Decision {
        match self {
            Requirement::Authenticated if credential.is_some() => Decision::Allow,
            Requirement::Authenticated => Decision::Deny,
            Requirement::Permission(permission) => authorize(credential, permission),
        }
    }
}

/// A named, immutable set of requirements. All must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    requirements: Vec<Requirement>,
}

impl Policy {
    pub fn new(name: impl Into<String>, requirements: Vec<Requirement>) -> Self {
        Self {
            name: name.into(),
            requirements,
        }
    }

    /// Policy named after `permission` that requires exactly it
    pub fn for_permission(permission: Permission) -> Self {
        Self {
            name: permission.as_str().to_string(),
            requirements: vec![Requirement::Permission(permission)],
        }
    }

    pub fn authenticated(name: impl Into<String>) -> Self {
        Self::new(name, vec![Requirement::Authenticated])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn evaluate(&self, credential: Option<&Credential>) -> Decision {
        if self
            .requirements
            .iter()
            .all(|r| r.evaluate(credential).is_allowed())
        {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    /// Evaluate and map a deny to 401 (no credential) or 403.
    pub fn enforce(&self, credential: Option<&Credential>) -> Result<(), AppError> {
        match (self.evaluate(credential), credential) {
            (Decision::Allow, _) => Ok(()),
            (Decision::Deny, None) => Err(AppError::Unauthenticated(AuthError::MissingToken)),
            (Decision::Deny, Some(credential)) => {
                tracing::debug!(
                    subject = %credential.subject(),
                    policy = %self.name,
                    "Policy denied request"
                );
                Err(AppError::Forbidden(format!("policy {} not satisfied", self.name)))
            }
        }
    }
}

/// How a policy name is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyName<'a> {
    /// Exact match against the permission vocabulary
    Permission(&'a Permission),
    /// Anything else; resolved by the fallback resolver
    Other(&'a str),
}

impl<'a> PolicyName<'a> {
    pub fn classify(name: &'a str, catalog: &'a PermissionCatalog) -> Self {
        match catalog.get(name) {
            Some(permission) => PolicyName::Permission(permission),
            None => PolicyName::Other(name),
        }
    }
}

/// Process-wide cache of permission policies. Entries are never evicted.
#[derive(Debug, Default)]
pub struct PolicyCache {
    policies: DashMap<String, Arc<Policy>>,
    constructed: AtomicUsize,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached policy for `permission`, building it if absent.
    ///
    /// Construction happens under the shard's write lock, so concurrent
    /// first lookups build exactly one policy and all observe it.
    pub fn get_or_build(&self, permission: &Permission) -> Arc<Policy> {
        if let Some(policy) = self.policies.get(permission.as_str()) {
            return policy.clone();
        }
        self.policies
            .entry(permission.as_str().to_string())
            .or_insert_with(|| {
                self.constructed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(permission = %permission, "Built permission policy");
                Arc::new(Policy::for_permission(permission.clone()))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Number of policies ever built by this cache
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::Relaxed)
    }
}

/// Resolves policy names, deriving permission policies on first use.
#[derive(Clone)]
pub struct PolicyProvider {
    catalog: Arc<PermissionCatalog>,
    cache: Arc<PolicyCache>,
    fallback: Arc<dyn PolicyResolver>,
}

impl PolicyProvider {
    pub fn new(catalog: PermissionCatalog, fallback: Arc<dyn PolicyResolver>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            cache: Arc::new(PolicyCache::new()),
            fallback,
        }
    }

    /// Share an existing cache, e.g. between providers built from the same catalog.
    pub fn with_cache(mut self, cache: Arc<PolicyCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn get_policy(&self, name: &str) -> Option<Arc<Policy>> {
        match PolicyName::classify(name, &self.catalog) {
            PolicyName::Permission(permission) => Some(self.cache.get_or_build(permission)),
            PolicyName::Other(name) => self.fallback.get_policy(name),
        }
    }

    pub fn default_policy(&self) -> Arc<Policy> {
        self.fallback.default_policy()
    }

    pub fn fallback_policy(&self) -> Option<Arc<Policy>> {
        self.fallback.fallback_policy()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<PolicyCache> {
        &self.cache
    }
}

impl Default for PolicyProvider {
    fn default() -> Self {
        Self::new(
            PermissionCatalog::standard(),
            Arc::new(StaticPolicyResolver::new()),
        )
    }
}

impl PolicyResolver for PolicyProvider {
    fn get_policy(&self, name: &str) -> Option<Arc<Policy>> {
        PolicyProvider::get_policy(self, name)
    }

    fn default_policy(&self) -> Arc<Policy> {
        PolicyProvider::default_policy(self)
    }

    fn fallback_policy(&self) -> Option<Arc<Policy>> {
        PolicyProvider::fallback_policy(self)
    }
}

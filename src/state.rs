//! Application state traits for dependency injection
//!
//! Middleware and handlers are generic over [`HasAccessControl`] so tests
//! can swap in their own clock, user store or limits.

use crate::admission::AdmissionController;
use crate::clock::Clock;
use crate::config::Config;
use crate::jwt::JwtManager;
use crate::policy::PolicyProvider;
use crate::repository::UserStore;

/// Trait for application state that provides the access-control components.
pub trait HasAccessControl: Clone + Send + Sync + 'static {
    /// Get the application configuration
    fn config(&self) -> &Config;

    /// Get the JWT manager
    fn jwt_manager(&self) -> &JwtManager;

    /// Get the policy provider
    fn policy_provider(&self) -> &PolicyProvider;

    /// Get the admission controller
    fn admission(&self) -> &AdmissionController;

    /// Get the time source
    fn clock(&self) -> &dyn Clock;

    /// Get the user store
    fn user_store(&self) -> &dyn UserStore;
}

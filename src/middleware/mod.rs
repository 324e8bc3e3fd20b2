//! HTTP middleware for Gatekeeper Core
//!
//! Applied outermost first:
//! - `authenticate`: validates an optional bearer token
//! - `admission_middleware`: IP/user partitions and the concurrency gate
//! - `require_policy`: resolves and evaluates the route's policy

pub mod admission;
pub mod auth;
pub mod client_ip;
pub mod metrics;
pub mod require_policy;

pub use admission::{admission_middleware, AdmissionState};
pub use auth::{authenticate, Authenticated, MaybeAuthenticated};
pub use client_ip::client_ip;
pub use metrics::ObservabilityLayer;
pub use require_policy::{require_policy, RequiredPolicy};

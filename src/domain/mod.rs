//! Domain models for Gatekeeper Core

pub mod permission;
pub mod user;

pub use permission::*;
pub use user::*;

//! Gatekeeper Core - access and admission control service
//!
//! This crate provides bearer-token issuance and validation, permission
//! policies for route authorization, and admission control (per-IP and
//! per-user fixed windows plus a global concurrency gate) for an HTTP API.

pub mod admission;
pub mod api;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod policy;
pub mod repository;
pub mod server;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};

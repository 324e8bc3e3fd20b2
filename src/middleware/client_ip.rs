//! Client address resolution for IP partitioning.
//!
//! The socket address injected by `axum::serve` (`ConnectInfo`) is the
//! partition key. `X-Forwarded-For` (first hop) and then `X-Real-IP` are
//! consulted only when proxy headers are trusted, since any client can set
//! them.

use axum::{extract::ConnectInfo, http::Request};
use std::net::SocketAddr;

/// Partition key used when no address can be determined
pub const UNKNOWN_CLIENT: &str = "unknown";

pub fn client_ip<B>(request: &Request<B>, trust_proxy_headers: bool) -> String {
    let forwarded = trust_proxy_headers
        .then(|| forwarded_ip(request))
        .flatten();
    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|addr| addr.0.ip().to_string())
        })
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_ip<B>(request: &Request<B>) -> Option<String> {
    let headers = request.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .map(str::to_string)
}

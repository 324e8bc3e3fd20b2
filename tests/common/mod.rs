//! Common test utilities
//!
//! Builds the production router over an [`AppState`] with a manual clock and
//! an in-memory user store, and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use gatekeeper_core::clock::{Clock, ManualClock};
use gatekeeper_core::config::{
    ConcurrencyConfig, Config, FixedWindowConfig, JwtConfig, RateLimitConfig, TelemetryConfig,
};
use gatekeeper_core::domain::names;
use gatekeeper_core::repository::InMemoryUserStore;
use gatekeeper_core::server::{build_router, AppState};
use gatekeeper_core::state::HasAccessControl;
use serde::Serialize;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const VIEWER_EMAIL: &str = "viewer@example.com";
pub const PASSWORD: &str = "correct-horse-battery";
pub const CLIENT_IP: &str = "203.0.113.7";

// ============================================================================
// Test Configuration
// ============================================================================

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test-secret-key-for-integration-tests-only".to_string(),
        issuer: "https://gatekeeper.test".to_string(),
        audience: "gatekeeper-test-clients".to_string(),
        token_ttl_secs: 1800,
    }
}

pub fn test_config(rate_limit: RateLimitConfig) -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        jwt: test_jwt_config(),
        rate_limit,
        telemetry: TelemetryConfig {
            metrics_enabled: false,
            tracing_enabled: false,
            ..TelemetryConfig::default()
        },
        bootstrap_admin: None,
    }
}

/// Limits high enough that only the test's own checks matter
pub fn generous_limits() -> RateLimitConfig {
    RateLimitConfig {
        enabled: true,
        ip: FixedWindowConfig {
            permit_limit: 1000,
            window_secs: 20,
        },
        user: FixedWindowConfig {
            permit_limit: 1000,
            window_secs: 20,
        },
        concurrency: ConcurrencyConfig::default(),
        trust_proxy_headers: false,
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

// ============================================================================
// Test App
// ============================================================================

pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub router: Router,
}

impl TestApp {
    /// App with the production default limits (2 per 20 s per partition)
    pub fn new() -> Self {
        Self::with_rate_limit(RateLimitConfig::default())
    }

    pub fn with_rate_limit(rate_limit: RateLimitConfig) -> Self {
        let users = InMemoryUserStore::new()
            .with_user(ADMIN_EMAIL, PASSWORD, names::ALL.iter().copied())
            .unwrap()
            .with_user(VIEWER_EMAIL, PASSWORD, [names::POLLS_READ])
            .unwrap();

        let clock = Arc::new(ManualClock::new(start_time()));
        let state =
            AppState::new(test_config(rate_limit), Arc::new(users)).with_clock(clock.clone());
        let router = build_router(state.clone(), None);

        Self {
            state,
            clock,
            router,
        }
    }

    /// Sign a token directly, bypassing the login endpoint and its IP limit
    pub fn token_for(&self, subject: &str, permissions: &[&'static str]) -> String {
        self.state
            .jwt_manager()
            .issue(subject, permissions.iter().copied(), self.clock.now())
            .unwrap()
            .token()
            .to_string()
    }
}

// ============================================================================
// Request helpers
// ============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl TestResponse {
    pub fn json(&self) -> &Value {
        self.body.as_ref().expect("response has no JSON body")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub struct TestRequest<'a> {
    method: Method,
    path: &'a str,
    token: Option<&'a str>,
    client_ip: &'a str,
    forwarded_for: Option<&'a str>,
    body: Option<String>,
}

impl<'a> TestRequest<'a> {
    pub fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            token: None,
            client_ip: CLIENT_IP,
            forwarded_for: None,
            body: None,
        }
    }

    pub fn get(path: &'a str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &'a str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: &'a str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn bearer(mut self, token: &'a str) -> Self {
        self.token = Some(token);
        self
    }

    /// Socket address the request arrives from
    pub fn from_ip(mut self, ip: &'a str) -> Self {
        self.client_ip = ip;
        self
    }

    pub fn forwarded_for(mut self, value: &'a str) -> Self {
        self.forwarded_for = Some(value);
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        self.body = Some(serde_json::to_string(body).unwrap());
        self
    }

    pub async fn send(self, app: &Router) -> TestResponse {
        let mut builder = Request::builder().method(self.method).uri(self.path);
        if let Some(value) = self.forwarded_for {
            builder = builder.header("x-forwarded-for", value);
        }
        if let Some(token) = self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let mut request = match self.body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let ip: IpAddr = self.client_ip.parse().unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(ip, 40_000)));

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let body = if body_bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&body_bytes).ok()
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

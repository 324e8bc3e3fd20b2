//! Configuration management for Gatekeeper Core

use anyhow::{Context, Result};
use chrono::TimeDelta;
use std::env;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Minimum length accepted for the HS256 signing secret
const MIN_SECRET_LEN: usize = 32;

/// Longest limiter window or token lifetime accepted (100 years). Anything
/// longer cannot be added to the current time without overflowing.
pub const MAX_DURATION_SECS: i64 = 100 * 365 * 24 * 60 * 60;

fn bounded_duration(secs: i64) -> Option<TimeDelta> {
    if !(1..=MAX_DURATION_SECS).contains(&secs) {
        return None;
    }
    TimeDelta::try_seconds(secs)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Rate limiting and concurrency configuration
    pub rate_limit: RateLimitConfig,
    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
    /// Administrator seeded into the in-memory user store at startup
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Clone)]
pub struct JwtConfig {
    /// Symmetric signing key. Empty means "not configured".
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl_secs: i64,
}

impl JwtConfig {
    /// Token lifetime, or `None` when it is not positive or beyond [`MAX_DURATION_SECS`]
    pub fn token_ttl(&self) -> Option<TimeDelta> {
        bounded_duration(self.token_ttl_secs)
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Credentials of the administrator created at startup. It is granted every
/// known permission.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Fixed window settings for one partitioned limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowConfig {
    /// Permits handed out per window
    pub permit_limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl FixedWindowConfig {
    /// Window length, or `None` when it is zero or beyond [`MAX_DURATION_SECS`]
    pub fn window(&self) -> Option<TimeDelta> {
        i64::try_from(self.window_secs)
            .ok()
            .and_then(bounded_duration)
    }
}

impl Default for FixedWindowConfig {
    fn default() -> Self {
        Self {
            permit_limit: 2,
            window_secs: 20,
        }
    }
}

/// Concurrency gate settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    /// Requests admitted at the same time
    pub permit_limit: usize,
    /// Requests allowed to wait (oldest first) for a free permit
    pub queue_limit: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            permit_limit: 1000,
            queue_limit: 100,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether admission control is enabled
    pub enabled: bool,
    /// Partition keyed by client IP
    pub ip: FixedWindowConfig,
    /// Partition keyed by authenticated subject
    pub user: FixedWindowConfig,
    /// Global in-flight gate
    pub concurrency: ConcurrencyConfig,
    /// Key the IP partition on `X-Forwarded-For` / `X-Real-IP` instead of
    /// the socket address. Only safe behind a proxy that overwrites them.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ip: FixedWindowConfig::default(),
            user: FixedWindowConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            trust_proxy_headers: false,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" or "pretty"
    pub log_format: String,
    pub metrics_enabled: bool,
    pub tracing_enabled: bool,
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "json".to_string(),
            metrics_enabled: false,
            tracing_enabled: false,
            otlp_endpoint: None,
            service_name: "gatekeeper-core".to_string(),
        }
    }
}

/// Startup configuration errors. Any of these prevents the process from serving.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no JWT signing key configured")]
    MissingSigningKey,

    #[error("JWT signing key must be at least {MIN_SECRET_LEN} bytes")]
    WeakSigningKey,

    #[error("invalid limiter configuration: {0}")]
    InvalidLimiter(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").context("JWT_SECRET is required")?,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "gatekeeper".to_string()),
                audience: env::var("JWT_AUDIENCE")
                    .unwrap_or_else(|_| "gatekeeper-clients".to_string()),
                token_ttl_secs: env::var("JWT_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .context("Invalid JWT_TOKEN_TTL_SECS")?,
            },
            rate_limit: RateLimitConfig {
                enabled: env::var("RATE_LIMIT_ENABLED")
                    .map(|s| s.to_lowercase() != "false")
                    .unwrap_or(true),
                ip: FixedWindowConfig {
                    permit_limit: parse_or("RATE_LIMIT_IP_PERMITS", 2)?,
                    window_secs: parse_or("RATE_LIMIT_IP_WINDOW_SECS", 20)?,
                },
                user: FixedWindowConfig {
                    permit_limit: parse_or("RATE_LIMIT_USER_PERMITS", 2)?,
                    window_secs: parse_or("RATE_LIMIT_USER_WINDOW_SECS", 20)?,
                },
                concurrency: ConcurrencyConfig {
                    permit_limit: parse_or("CONCURRENCY_PERMITS", 1000)?,
                    queue_limit: parse_or("CONCURRENCY_QUEUE_LIMIT", 100)?,
                },
                trust_proxy_headers: env::var("TRUST_PROXY_HEADERS")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
                metrics_enabled: env::var("METRICS_ENABLED")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
                tracing_enabled: env::var("OTEL_TRACING_ENABLED")
                    .map(|s| s.to_lowercase() == "true")
                    .unwrap_or(false),
                otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
                service_name: env::var("OTEL_SERVICE_NAME")
                    .unwrap_or_else(|_| "gatekeeper-core".to_string()),
            },
            bootstrap_admin: match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
                (Ok(email), Ok(password)) => Some(BootstrapAdmin { email, password }),
                _ => None,
            },
        })
    }

    /// Reject configurations that must not reach a serving process.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.jwt.secret.is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }
        if self.jwt.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSigningKey);
        }
        if self.jwt.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue("JWT issuer is empty".to_string()));
        }
        if self.jwt.audience.trim().is_empty() {
            return Err(ConfigError::InvalidValue("JWT audience is empty".to_string()));
        }
        if self.jwt.token_ttl().is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "JWT token lifetime must be between 1 and {MAX_DURATION_SECS} seconds"
            )));
        }

        for (name, window) in [("ip", &self.rate_limit.ip), ("user", &self.rate_limit.user)] {
            if window.permit_limit == 0 {
                return Err(ConfigError::InvalidLimiter(format!(
                    "{name} limiter permit_limit must be > 0"
                )));
            }
            if window.window().is_none() {
                return Err(ConfigError::InvalidLimiter(format!(
                    "{name} limiter window must be between 1 and {MAX_DURATION_SECS} seconds"
                )));
            }
        }
        if self.rate_limit.concurrency.permit_limit == 0 {
            return Err(ConfigError::InvalidLimiter(
                "concurrency permit_limit must be > 0".to_string(),
            ));
        }
        if self.rate_limit.concurrency.permit_limit > Semaphore::MAX_PERMITS {
            return Err(ConfigError::InvalidLimiter(format!(
                "concurrency permit_limit must be <= {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(())
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + ToString,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {key}"))
}

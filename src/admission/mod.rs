//! Admission control: per-IP and per-user fixed windows, then a global
//! concurrency gate.
//!
//! Routes opt into any subset of [`LimiterPolicy`]; the selected checks
//! always run in [`LimiterPolicy::ORDER`] and the first rejection wins.

pub mod concurrency;
pub mod fixed_window;

pub use concurrency::{ConcurrencyGate, GatePermit};
pub use fixed_window::FixedWindowLimiter;

use crate::config::RateLimitConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Named limiter a route can opt into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterPolicy {
    /// Fixed window partitioned by client IP
    Ip,
    /// Fixed window partitioned by authenticated subject
    User,
    /// Global in-flight gate
    Concurrency,
}

impl LimiterPolicy {
    pub const ORDER: [LimiterPolicy; 3] = [
        LimiterPolicy::Ip,
        LimiterPolicy::User,
        LimiterPolicy::Concurrency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterPolicy::Ip => "ipLimit",
            LimiterPolicy::User => "userLimit",
            LimiterPolicy::Concurrency => "concurrency",
        }
    }
}

impl std::fmt::Display for LimiterPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("rate limit exceeded")]
    Throttled {
        policy: LimiterPolicy,
        retry_after: Duration,
    },

    #[error("server is at capacity")]
    Overloaded,

    /// A user-partitioned route was reached without an authenticated
    /// subject. This is a routing error, not a client error.
    #[error("no authenticated subject for user-partitioned route")]
    MissingIdentity,
}

impl Rejection {
    /// The limiter that produced this rejection
    pub fn policy(&self) -> LimiterPolicy {
        match self {
            Rejection::Throttled { policy, .. } => *policy,
            Rejection::Overloaded => LimiterPolicy::Concurrency,
            Rejection::MissingIdentity => LimiterPolicy::User,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Throttled { .. } => "RATE_LIMITED",
            Rejection::Overloaded => "OVERLOADED",
            Rejection::MissingIdentity => "MISSING_IDENTITY",
        }
    }

    /// Whole seconds until the partition resets, rounded up. `None` for
    /// rejections with no retry hint.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Rejection::Throttled { retry_after, .. } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            _ => None,
        }
    }
}

/// What the admission checks see of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: String,
    /// Subject of the validated credential, if any
    pub subject: Option<String>,
}

impl RequestContext {
    pub fn new(client_ip: impl Into<String>, subject: Option<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            subject,
        }
    }
}

/// Proof of admission. Holds the gate slot, if one was taken, until dropped.
#[derive(Debug, Default)]
pub struct Admission {
    permit: Option<GatePermit>,
}

impl Admission {
    pub fn holds_gate_slot(&self) -> bool {
        self.permit.is_some()
    }
}

/// Owns every limiter in the process
#[derive(Debug)]
pub struct AdmissionController {
    enabled: bool,
    ip: FixedWindowLimiter,
    user: FixedWindowLimiter,
    gate: ConcurrencyGate,
}

impl AdmissionController {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            ip: FixedWindowLimiter::new(LimiterPolicy::Ip, config.ip),
            user: FixedWindowLimiter::new(LimiterPolicy::User, config.user),
            gate: ConcurrencyGate::new(config.concurrency),
        }
    }

    /// Controller that admits everything
    pub fn disabled() -> Self {
        Self::new(&RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn check_ip(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Result<(), Rejection> {
        self.ip.try_acquire(&ctx.client_ip, now)
    }

    pub fn check_user(&self, ctx: &RequestContext, now: DateTime<Utc>) -> Result<(), Rejection> {
        let subject = ctx.subject.as_deref().ok_or(Rejection::MissingIdentity)?;
        self.user.try_acquire(subject, now)
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Run the window checks among `policies` in canonical order.
    ///
    /// A request rejected by a later window gets its earlier window permits
    /// back. The concurrency gate is not a window and is only taken by
    /// [`Self::admit`].
    pub fn check(
        &self,
        policies: &[LimiterPolicy],
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        if !self.enabled {
            return Ok(());
        }
        let mut taken = Vec::with_capacity(2);
        for policy in LimiterPolicy::ORDER {
            if !policies.contains(&policy) {
                continue;
            }
            let result = match policy {
                LimiterPolicy::Ip => self.check_ip(ctx, now),
                LimiterPolicy::User => self.check_user(ctx, now),
                LimiterPolicy::Concurrency => continue,
            };
            if let Err(rejection) = result {
                record_rejection(&rejection);
                self.release(&taken, ctx, now);
                return Err(rejection);
            }
            taken.push(policy);
        }
        Ok(())
    }

    /// Return window permits taken at `now` for a request that was not admitted
    fn release(&self, policies: &[LimiterPolicy], ctx: &RequestContext, now: DateTime<Utc>) {
        for policy in policies {
            match policy {
                LimiterPolicy::Ip => self.ip.release(&ctx.client_ip, now),
                LimiterPolicy::User => {
                    if let Some(subject) = ctx.subject.as_deref() {
                        self.user.release(subject, now);
                    }
                }
                LimiterPolicy::Concurrency => {}
            }
        }
    }

    /// [`Self::check`], then take a gate slot if `policies` asks for one.
    ///
    /// A gate rejection hands the window permits back.
    pub async fn admit(
        &self,
        policies: &[LimiterPolicy],
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<Admission, Rejection> {
        self.check(policies, ctx, now)?;
        if !self.enabled || !policies.contains(&LimiterPolicy::Concurrency) {
            return Ok(Admission::default());
        }
        match self.gate.admit().await {
            Ok(permit) => Ok(Admission {
                permit: Some(permit),
            }),
            Err(rejection) => {
                record_rejection(&rejection);
                self.release(policies, ctx, now);
                Err(rejection)
            }
        }
    }
}

fn record_rejection(rejection: &Rejection) {
    if let Rejection::MissingIdentity = rejection {
        return;
    }
    metrics::counter!(
        "gatekeeper_rate_limit_throttled_total",
        "policy" => rejection.policy().as_str()
    )
    .increment(1);
}

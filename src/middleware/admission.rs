//! Admission control middleware
//!
//! Runs the route's declared limiters and holds the concurrency slot, if
//! one was taken, until the inner service has produced its response.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::client_ip::client_ip;
use crate::admission::{LimiterPolicy, RequestContext};
use crate::error::AppError;
use crate::jwt::Credential;
use crate::state::HasAccessControl;

/// Login and other anonymous endpoints
pub const IP_LIMITED: &[LimiterPolicy] = &[LimiterPolicy::Ip];
/// Authenticated endpoints
pub const USER_LIMITED: &[LimiterPolicy] = &[LimiterPolicy::User];
/// Authenticated endpoints that also count against the global gate
pub const USER_LIMITED_CONCURRENT: &[LimiterPolicy] =
    &[LimiterPolicy::User, LimiterPolicy::Concurrency];

/// Middleware state: the app state plus the limiters this route opts into
#[derive(Clone)]
pub struct AdmissionState<S> {
    state: S,
    policies: &'static [LimiterPolicy],
}

impl<S> AdmissionState<S> {
    pub fn new(state: S, policies: &'static [LimiterPolicy]) -> Self {
        Self { state, policies }
    }
}

pub async fn admission_middleware<S>(
    State(limits): State<AdmissionState<S>>,
    request: Request,
    next: Next,
) -> Response
where
    S: HasAccessControl,
{
    let controller = limits.state.admission();
    if !controller.is_enabled() {
        return next.run(request).await;
    }

    let ctx = RequestContext::new(
        client_ip(
            &request,
            limits.state.config().rate_limit.trust_proxy_headers,
        ),
        request
            .extensions()
            .get::<Credential>()
            .map(|c| c.subject().to_string()),
    );
    let now = limits.state.clock().now();

    match controller.admit(limits.policies, &ctx, now).await {
        Ok(admission) => {
            let response = next.run(request).await;
            drop(admission);
            response
        }
        Err(rejection) => {
            tracing::info!(
                client_ip = %ctx.client_ip,
                subject = ctx.subject.as_deref().unwrap_or("-"),
                policy = %rejection.policy(),
                "Request rejected by admission control"
            );
            AppError::from(rejection).into_response()
        }
    }
}

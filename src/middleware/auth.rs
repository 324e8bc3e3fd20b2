//! JWT authentication middleware and extractors
//!
//! Provides:
//! - `authenticate` middleware that validates an optional bearer token and
//!   attaches the resulting [`Credential`] to the request
//! - `Authenticated` extractor for handlers requiring a credential
//! - `MaybeAuthenticated` extractor for handlers that work either way

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::error::{AppError, AuthError};
use crate::jwt::Credential;
use crate::state::HasAccessControl;

/// Extract the token from a `Bearer` authorization header
fn bearer_token(header: &HeaderValue) -> Result<&str, AuthError> {
    let value = header.to_str().map_err(|_| AuthError::MalformedToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or(AuthError::MalformedToken)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Validate the bearer token, if any, and attach the credential.
///
/// Requests without an `Authorization` header pass through anonymously;
/// requests with an invalid one are rejected with 401.
pub async fn authenticate<S>(
    State(state): State<S>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError>
where
    S: HasAccessControl,
{
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return Ok(next.run(request).await);
    };

    let token = bearer_token(header)?;
    let credential = state
        .jwt_manager()
        .validate(token, state.clock().now())?;

    tracing::Span::current().record("subject", credential.subject());
    request.extensions_mut().insert(credential);
    Ok(next.run(request).await)
}

/// Axum extractor for authenticated callers
///
/// # Example
///
/// ```ignore
/// async fn protected_handler(Authenticated(credential): Authenticated) -> String {
///     format!("Hello, {}!", credential.subject())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub Credential);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Credential>()
            .cloned()
            .map(Authenticated)
            .ok_or(AppError::Unauthenticated(AuthError::MissingToken))
    }
}

/// Optional authentication extractor
///
/// Returns `Some(Credential)` if the request carried a valid token.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<Credential>);

impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticated(parts.extensions.get::<Credential>().cloned()))
    }
}

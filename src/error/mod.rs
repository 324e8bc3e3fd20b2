//! Unified error handling for Gatekeeper Core

use crate::admission::Rejection;
use crate::config::ConfigError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Credential failures. Each variant is distinguishable by callers and by
/// the `code` field of the 401 body.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("token has expired")]
    ExpiredToken,

    #[error("token is not valid yet")]
    NotYetValid,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token issuer does not match")]
    IssuerMismatch,

    #[error("token audience does not match")]
    AudienceMismatch,

    #[error("token is malformed")]
    MalformedToken,

    #[error("no bearer token supplied")]
    MissingToken,

    #[error("token has been revoked")]
    Revoked,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::ExpiredToken => "EXPIRED_TOKEN",
            AuthError::NotYetValid => "TOKEN_NOT_YET_VALID",
            AuthError::BadSignature => "BAD_SIGNATURE",
            AuthError::IssuerMismatch => "ISSUER_MISMATCH",
            AuthError::AudienceMismatch => "AUDIENCE_MISMATCH",
            AuthError::MalformedToken => "MALFORMED_TOKEN",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::Revoked => "REVOKED_TOKEN",
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Admission rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut policy = None;
        let mut retry_after = None;

        let (status, error_type, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", "BAD_REQUEST", msg.clone())
            }
            AppError::Unauthenticated(e) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", e.code(), e.to_string())
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "INVALID_CREDENTIALS",
                self.to_string(),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", "FORBIDDEN", msg.clone()),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                "VALIDATION",
                msg.clone(),
            ),
            AppError::Rejected(Rejection::MissingIdentity) => {
                tracing::error!("user-partitioned route reached without an authenticated subject");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Rejected(rejection) => {
                policy = Some(rejection.policy().as_str());
                retry_after = rejection.retry_after_secs();
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "too_many_requests",
                    rejection.code(),
                    rejection.to_string(),
                )
            }
            AppError::Configuration(e) => {
                tracing::error!("Configuration error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            code: code.to_string(),
            message,
            policy,
            retry_after,
        });

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        match &self {
            AppError::Unauthenticated(AuthError::ExpiredToken) => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(
                        "Bearer error=\"invalid_token\", error_description=\"token expired\"",
                    ),
                );
            }
            AppError::Unauthenticated(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }
        if let Some(policy) = policy {
            headers.insert("X-RateLimit-Policy", HeaderValue::from_static(policy));
        }
        if let Some(secs) = retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::LimiterPolicy;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = AppError::NotFound("Poll not found".to_string());
        assert_eq!(err.to_string(), "Not found: Poll not found");
    }

    #[test]
    fn test_error_conversion() {
        let err: AppError = anyhow::anyhow!("Something went wrong").into();
        assert!(matches!(err, AppError::Internal(_)));

        let err: AppError = AuthError::BadSignature.into();
        assert!(matches!(err, AppError::Unauthenticated(AuthError::BadSignature)));
    }

    #[test]
    fn test_auth_error_codes_are_distinct() {
        let all = [
            AuthError::ExpiredToken,
            AuthError::NotYetValid,
            AuthError::BadSignature,
            AuthError::IssuerMismatch,
            AuthError::AudienceMismatch,
            AuthError::MalformedToken,
            AuthError::MissingToken,
            AuthError::Revoked,
        ];
        let codes: std::collections::HashSet<_> = all.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[tokio::test]
    async fn test_expired_token_response() {
        let response = AppError::Unauthenticated(AuthError::ExpiredToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.contains("invalid_token"));

        let body = body_json(response).await;
        assert_eq!(body["code"], "EXPIRED_TOKEN");
    }

    #[test]
    fn test_forbidden_is_not_unauthorized() {
        let response = AppError::Forbidden("missing polls:delete".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[tokio::test]
    async fn test_throttled_response_carries_retry_after_and_policy() {
        let rejection = Rejection::Throttled {
            policy: LimiterPolicy::Ip,
            retry_after: Duration::from_secs(12),
        };
        let response = AppError::from(rejection).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "12");
        assert_eq!(response.headers().get("X-RateLimit-Policy").unwrap(), "ipLimit");

        let body = body_json(response).await;
        assert_eq!(body["policy"], "ipLimit");
        assert_eq!(body["retry_after"], 12);
    }

    #[tokio::test]
    async fn test_overloaded_response_has_no_retry_hint() {
        let response = AppError::from(Rejection::Overloaded).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
        assert_eq!(
            response.headers().get("X-RateLimit-Policy").unwrap(),
            "concurrency"
        );

        let body = body_json(response).await;
        assert!(body.get("retry_after").is_none());
    }

    #[tokio::test]
    async fn test_missing_identity_is_internal_error() {
        let response = AppError::from(Rejection::MissingIdentity).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("X-RateLimit-Policy").is_none());
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = AppError::Internal(anyhow::anyhow!("db password is hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], "An internal error occurred");
    }
}

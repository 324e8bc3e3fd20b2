//! Token endpoint and credential introspection

use crate::api::SuccessResponse;
use crate::domain::{LoginInput, PermissionsResponse, TokenResponse};
use crate::error::{AppError, Result};
use crate::middleware::Authenticated;
use crate::state::HasAccessControl;
use axum::{extract::State, Json};
use validator::Validate;

/// POST /api/v1/auth/token
///
/// Exchange an email and password for a signed access token carrying the
/// user's current permission claims.
pub async fn token<S: HasAccessControl>(
    State(state): State<S>,
    Json(input): Json<LoginInput>,
) -> Result<Json<TokenResponse>> {
    input.validate()?;

    let grant = match state
        .user_store()
        .authenticate(&input.email, &input.password)
        .await?
    {
        Some(grant) => grant,
        None => {
            metrics::counter!("gatekeeper_auth_login_total", "result" => "failure").increment(1);
            return Err(AppError::InvalidCredentials);
        }
    };

    let jwt = state.jwt_manager();
    let credential = jwt.issue(&grant.subject, grant.permissions, state.clock().now())?;

    metrics::counter!("gatekeeper_auth_login_total", "result" => "success").increment(1);
    tracing::info!(subject = %credential.subject(), "Issued access token");

    Ok(Json(TokenResponse {
        access_token: credential.token().to_string(),
        token_type: "Bearer".to_string(),
        expires_in: jwt.token_ttl(),
        expires_at: credential.expires_at(),
    }))
}

/// GET /api/v1/me/permissions
pub async fn my_permissions(
    Authenticated(credential): Authenticated,
) -> Json<SuccessResponse<PermissionsResponse>> {
    Json(SuccessResponse::new(PermissionsResponse {
        subject: credential.subject().to_string(),
        permissions: credential.permissions().to_vec(),
        expires_at: credential.expires_at(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, JwtConfig, RateLimitConfig, TelemetryConfig};
    use crate::domain::{names, Permission, UserGrant};
    use crate::repository::user::MockUserStore;
    use crate::server::AppState;
    use std::sync::Arc;

    fn state(store: MockUserStore) -> AppState {
        let config = Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            jwt: JwtConfig {
                secret: "test-secret-key-for-testing-purposes-only".to_string(),
                issuer: "gatekeeper-test".to_string(),
                audience: "gatekeeper-test-clients".to_string(),
                token_ttl_secs: 900,
            },
            rate_limit: RateLimitConfig::default(),
            telemetry: TelemetryConfig::default(),
            bootstrap_admin: None,
        };
        AppState::new(config, Arc::new(store))
    }

    fn input(email: &str, password: &str) -> Json<LoginInput> {
        Json(LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    #[tokio::test]
    async fn test_token_embeds_store_permissions() {
        let mut store = MockUserStore::new();
        store
            .expect_authenticate()
            .withf(|email, password| email == "u1@example.com" && password == "secret")
            .times(1)
            .returning(|_, _| {
                Ok(Some(UserGrant {
                    subject: "u1".to_string(),
                    permissions: vec![Permission::from(names::POLLS_CREATE)],
                }))
            });
        let state = state(store);

        let Json(response) = token(State(state.clone()), input("u1@example.com", "secret"))
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 900);
        let credential = state
            .jwt_manager()
            .validate(&response.access_token, state.clock().now())
            .unwrap();
        assert_eq!(credential.subject(), "u1");
        assert!(credential.has_permission(names::POLLS_CREATE));
    }

    #[tokio::test]
    async fn test_token_rejects_unknown_credentials() {
        let mut store = MockUserStore::new();
        store.expect_authenticate().returning(|_, _| Ok(None));

        let result = token(State(state(store)), input("u1@example.com", "wrong")).await;

        assert!(matches!(result, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_token_validates_input_before_lookup() {
        let mut store = MockUserStore::new();
        store.expect_authenticate().never();

        let result = token(State(state(store)), input("not-an-email", "secret")).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

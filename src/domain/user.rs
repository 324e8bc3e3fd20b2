//! Login request/response types and the grant a user store hands back

use super::Permission;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Identity and claims to embed in a freshly issued credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGrant {
    /// Stable user identifier, becomes the token subject
    pub subject: String,
    pub permissions: Vec<Permission>,
}

/// Input for the token endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

/// Token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

/// Claims of the calling user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub subject: String,
    pub permissions: Vec<Permission>,
    pub expires_at: DateTime<Utc>,
}

//! JWT credential issuing and validation
//!
//! Credentials are HS256-signed and carry the subject plus its permission
//! claims. Time is always supplied by the caller so expiry is testable
//! without sleeping.

use crate::config::{ConfigError, JwtConfig};
use crate::domain::Permission;
use crate::error::AuthError;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Granted permission names
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// A validated (or freshly issued) access token.
///
/// Only [`JwtManager`] can produce one, so holding a `Credential` means the
/// signature, issuer, audience and lifetime have been checked.
#[derive(Clone)]
pub struct Credential {
    subject: String,
    permissions: Vec<Permission>,
    issuer: String,
    audience: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    token: String,
}

impl Credential {
    fn from_claims(claims: Claims, token: String) -> Result<Self, AuthError> {
        let issued_at = timestamp(claims.iat)?;
        let expires_at = timestamp(claims.exp)?;
        Ok(Self {
            subject: claims.sub,
            permissions: claims.permissions.into_iter().map(Permission::from).collect(),
            issuer: claims.iss,
            audience: claims.aud,
            issued_at,
            expires_at,
            token,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The encoded token. Hand it to the client; never log it.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Exact-match claim lookup
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.as_str() == name)
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject && self.issued_at == other.issued_at
    }
}

impl Eq for Credential {}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("subject", &self.subject)
            .field("permissions", &self.permissions)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(AuthError::MalformedToken)
}

/// External revocation hook consulted after a token passes every other check.
#[cfg_attr(test, mockall::automock)]
pub trait RevocationCheck: Send + Sync {
    fn is_revoked(&self, credential: &Credential) -> bool;
}

/// Revocation hook that never fires
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRevoked;

impl RevocationCheck for NeverRevoked {
    fn is_revoked(&self, _credential: &Credential) -> bool {
        false
    }
}

/// JWT token manager
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    keys: Option<(EncodingKey, DecodingKey)>,
    revocation: Arc<dyn RevocationCheck>,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let keys = (!config.secret.is_empty()).then(|| {
            (
                EncodingKey::from_secret(config.secret.as_bytes()),
                DecodingKey::from_secret(config.secret.as_bytes()),
            )
        });
        Self {
            config,
            keys,
            revocation: Arc::new(NeverRevoked),
        }
    }

    pub fn with_revocation_check(mut self, revocation: Arc<dyn RevocationCheck>) -> Self {
        self.revocation = revocation;
        self
    }

    /// Exact issuer/audience match, HS256 only, no leeway. Lifetime is
    /// checked separately against the caller's clock.
    fn validation(&self) -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.leeway = 0;
        v.validate_exp = false;
        v.validate_nbf = false;
        v.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        v.set_issuer(&[&self.config.issuer]);
        v.set_audience(&[&self.config.audience]);
        v
    }

    /// Mint a credential for `subject` carrying `permissions`, valid from
    /// `now` for the configured lifetime.
    pub fn issue<I>(
        &self,
        subject: &str,
        permissions: I,
        now: DateTime<Utc>,
    ) -> Result<Credential, ConfigError>
    where
        I: IntoIterator,
        I::Item: Into<Permission>,
    {
        let (encoding_key, _) = self.keys.as_ref().ok_or(ConfigError::MissingSigningKey)?;

        let iat = now.timestamp();
        let exp = self
            .config
            .token_ttl()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| ConfigError::InvalidValue("token lifetime out of range".to_string()))?
            .timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            permissions: permissions
                .into_iter()
                .map(|p| {
                    let p: Permission = p.into();
                    p.as_str().to_string()
                })
                .collect(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, encoding_key)
            .map_err(|e| ConfigError::InvalidValue(format!("token encoding failed: {e}")))?;

        tracing::debug!(subject = %claims.sub, exp, "Issued access token");
        Credential::from_claims(claims, token)
            .map_err(|_| ConfigError::InvalidValue("token lifetime out of range".to_string()))
    }

    /// Verify signature, issuer and audience, then `iat <= now < exp`.
    pub fn validate(&self, raw: &str, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let result = self.validate_inner(raw, now);
        let label = match &result {
            Ok(_) => "valid",
            Err(e) => e.code(),
        };
        metrics::counter!("gatekeeper_auth_token_validation_total", "result" => label)
            .increment(1);
        if let Err(e) = &result {
            tracing::debug!(error = %e, "Rejected access token");
        }
        result
    }

    fn validate_inner(&self, raw: &str, now: DateTime<Utc>) -> Result<Credential, AuthError> {
        let (_, decoding_key) = self.keys.as_ref().ok_or(AuthError::BadSignature)?;

        let data = decode::<Claims>(raw, decoding_key, &self.validation()).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::BadSignature
                }
                ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
                ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
                _ => AuthError::MalformedToken,
            }
        })?;

        let claims = data.claims;
        let now_ts = now.timestamp();
        if claims.exp <= claims.iat {
            return Err(AuthError::MalformedToken);
        }
        if now_ts < claims.iat {
            return Err(AuthError::NotYetValid);
        }
        if now_ts >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }

        let credential = Credential::from_claims(claims, raw.to_string())?;
        if self.revocation.is_revoked(&credential) {
            return Err(AuthError::Revoked);
        }
        Ok(credential)
    }

    /// Configured token lifetime in seconds
    pub fn token_ttl(&self) -> i64 {
        self.config.token_ttl_secs
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    pub fn audience(&self) -> &str {
        &self.config.audience
    }
}

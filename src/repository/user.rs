//! User store

use crate::domain::{Permission, UserGrant};
use crate::error::{AppError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// Source of users and their current permission claims.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Check a password and return what to embed in the credential.
    /// `Ok(None)` means unknown user or wrong password.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<UserGrant>>;
}

struct StoredUser {
    id: Uuid,
    password_hash: String,
    permissions: Vec<Permission>,
}

/// Process-local user store with argon2-hashed passwords
#[derive(Default)]
pub struct InMemoryUserStore {
    users: HashMap<String, StoredUser>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user. Emails are matched case-insensitively.
    pub fn with_user<I>(mut self, email: &str, password: &str, permissions: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Permission>,
    {
        let user = StoredUser {
            id: Uuid::new_v4(),
            password_hash: hash_password(password)?,
            permissions: permissions.into_iter().map(Into::into).collect(),
        };
        self.users.insert(email.to_lowercase(), user);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<UserGrant>> {
        let Some(user) = self.users.get(&email.to_lowercase()) else {
            return Ok(None);
        };
        if !verify_password(password, &user.password_hash)? {
            return Ok(None);
        }
        Ok(Some(UserGrant {
            subject: user.id.to_string(),
            permissions: user.permissions.clone(),
        }))
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::names;

    fn store() -> InMemoryUserStore {
        InMemoryUserStore::new()
            .with_user(
                "Admin@Example.com",
                "P@ssword123",
                [names::POLLS_READ, names::POLLS_CREATE],
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let grant = store()
            .authenticate("admin@example.com", "P@ssword123")
            .await
            .unwrap()
            .unwrap();

        assert!(Uuid::parse_str(&grant.subject).is_ok());
        assert_eq!(
            grant.permissions,
            vec![
                Permission::from_static(names::POLLS_READ),
                Permission::from_static(names::POLLS_CREATE)
            ]
        );
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let result = store()
            .authenticate("admin@example.com", "wrong")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let result = store()
            .authenticate("nobody@example.com", "P@ssword123")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_subject_is_stable() {
        let store = store();
        let a = store
            .authenticate("admin@example.com", "P@ssword123")
            .await
            .unwrap()
            .unwrap();
        let b = store
            .authenticate("ADMIN@example.com", "P@ssword123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.subject, b.subject);
    }

    #[test]
    fn test_password_is_not_stored_in_clear() {
        let hash = hash_password("P@ssword123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains("P@ssword123"));
        assert!(verify_password("P@ssword123", &hash).unwrap());
        assert!(!verify_password("P@ssword124", &hash).unwrap());
    }
}

//! Authentication service.
//!
//! Password login for staff, plus the account management the admin panel
//! needs (create, update with optional password reset, delete).

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use merch_crm_core::{Email, SecurityEventType, UserId};

use crate::db::{RepositoryError, SecurityRepository, UserRepository};
use crate::models::{CurrentUser, UserInput};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Client details recorded with security events.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestMeta<'a> {
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    security: SecurityRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
            security: SecurityRepository::new(pool),
        }
    }

    // =========================================================================
    // Login / Logout
    // =========================================================================

    /// Verify credentials and build the session identity.
    ///
    /// Records `login_success` or `login_failed` either way.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the user doesn't exist or
    /// the password doesn't match.
    /// Returns `AuthError::Repository` if the database operation fails.
    #[instrument(skip(self, password, meta))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: RequestMeta<'_>,
    ) -> Result<CurrentUser, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Err(AuthError::InvalidCredentials);
        };

        let found = self.users.get_with_password(&email).await?;
        let verified = found
            .filter(|(_, hash)| verify_password(password, hash).is_ok())
            .map(|(user, _)| user);

        let Some(user) = verified else {
            warn!(email = %email, "Failed login attempt");
            self.security
                .record(
                    SecurityEventType::LoginFailed,
                    None,
                    meta.ip_address,
                    meta.user_agent,
                    json!({ "email": email.as_str() }),
                )
                .await?;
            return Err(AuthError::InvalidCredentials);
        };

        self.users.touch_last_active(user.id).await?;
        self.security
            .record(
                SecurityEventType::LoginSuccess,
                Some(user.id),
                meta.ip_address,
                meta.user_agent,
                json!({}),
            )
            .await?;

        info!(user_id = %user.id, "User logged in");

        Ok(CurrentUser {
            id: user.id,
            email: user.email,
            name: user.name,
            role_name: user.role_name,
            department_name: user.department_name,
        })
    }

    /// Record a logout.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn logout(&self, user_id: UserId, meta: RequestMeta<'_>) -> Result<(), AuthError> {
        self.security
            .record(
                SecurityEventType::Logout,
                Some(user_id),
                meta.ip_address,
                meta.user_agent,
                json!({}),
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Account management
    // =========================================================================

    /// Create a staff account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if the password is too short.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn create_user(
        &self,
        input: &UserInput,
        password: &str,
        actor: Option<UserId>,
    ) -> Result<UserId, AuthError> {
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        self.users
            .create(input, &password_hash, actor)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Update a staff account; a non-empty `password` resets it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if a new password is too short.
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    /// Returns `AuthError::UserAlreadyExists` if the email is taken.
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn update_user(
        &self,
        id: UserId,
        input: &UserInput,
        password: Option<&str>,
        actor: UserId,
    ) -> Result<(), AuthError> {
        let password_hash = match password.filter(|p| !p.is_empty()) {
            Some(p) => {
                validate_password(p)?;
                Some(hash_password(p)?)
            }
            None => None,
        };

        self.users
            .update(id, input, password_hash.as_deref(), actor)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => AuthError::UserNotFound,
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })
    }

    /// Delete a staff account other than the actor's own.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SelfDeletion` when deleting oneself.
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    /// Returns `AuthError::Repository` if the database operation fails.
    pub async fn delete_user(&self, id: UserId, actor: UserId) -> Result<(), AuthError> {
        if id == actor {
            return Err(AuthError::SelfDeletion);
        }

        self.users.delete(id, actor).await.map_err(|e| match e {
            RepositoryError::NotFound => AuthError::UserNotFound,
            other => AuthError::Repository(other),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Validate password requirements.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is shorter than
/// [`MIN_PASSWORD_LENGTH`] characters.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` if the hash is malformed or
/// doesn't match.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("battery staple", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(verify_password("whatever", "not-a-hash").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
        // Counted in characters, not bytes.
        assert!(validate_password("пароль1").is_err());
    }
}

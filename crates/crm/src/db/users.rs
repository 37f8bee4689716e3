//! Staff user repository.
//!
//! Mutations take the acting user and write their audit entry in the same
//! transaction.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;

use merch_crm_core::{DepartmentId, Email, RoleId, UserId};

use super::{RepositoryError, audit};
use crate::models::{User, UserInput, UserOption};
use crate::models::session::ADMIN_ROLE;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    email: String,
    role_id: Option<RoleId>,
    role_name: Option<String>,
    department_id: Option<DepartmentId>,
    department_name: Option<String>,
    phone: Option<String>,
    last_active_at: Option<DateTime<Utc>>,
    is_system: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            email,
            role_id: row.role_id,
            role_name: row.role_name,
            department_id: row.department_id,
            department_name: row.department_name,
            phone: row.phone,
            last_active_at: row.last_active_at,
            is_system: row.is_system,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

const SELECT_USER: &str = r"
    SELECT u.id, u.name, u.email, u.role_id, r.name AS role_name,
           u.department_id, d.name AS department_name, u.phone,
           u.last_active_at, u.is_system, u.created_at
    FROM crm.users u
    LEFT JOIN crm.roles r ON r.id = u.role_id
    LEFT JOIN crm.departments d ON d.id = u.department_id
";

const EMAIL_TAKEN: &str = "A user with this email already exists";

// =============================================================================
// Repository
// =============================================================================

/// Repository for staff user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All users, by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} ORDER BY u.name"))
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a user and their password hash by email, for login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get_with_password(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r"
            SELECT u.id, u.name, u.email, u.role_id, r.name AS role_name,
                   u.department_id, d.name AS department_name, u.phone,
                   u.last_active_at, u.is_system, u.created_at, u.password_hash
            FROM crm.users u
            LEFT JOIN crm.roles r ON r.id = u.role_id
            LEFT JOIN crm.departments d ON d.id = u.department_id
            WHERE u.email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| Ok((r.user.try_into()?, r.password_hash)))
            .transpose()
    }

    /// Whether an email is already registered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn email_exists(&self, email: &Email) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM crm.users WHERE email = $1)",
        )
        .bind(email.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Create a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        input: &UserInput,
        password_hash: &str,
        actor: Option<UserId>,
    ) -> Result<UserId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, UserId>(
            r"
            INSERT INTO crm.users (name, email, password_hash, role_id, department_id, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(input.email.as_str())
        .bind(password_hash)
        .bind(input.role_id)
        .bind(input.department_id)
        .bind(&input.phone)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_constraint(e, "users_email_key", EMAIL_TAKEN))?;

        audit::record(
            &mut tx,
            actor,
            "User created",
            "user",
            Some(id.as_uuid()),
            json!({ "name": input.name, "email": input.email.as_str() }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Update a user's profile and, optionally, password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Conflict` if the email is taken.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: UserId,
        input: &UserInput,
        password_hash: Option<&str>,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let previous_role = sqlx::query_scalar::<_, Option<RoleId>>(
            "SELECT role_id FROM crm.users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            r"
            UPDATE crm.users
            SET name = $2, email = $3, role_id = $4, department_id = $5, phone = $6,
                password_hash = COALESCE($7, password_hash)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.email.as_str())
        .bind(input.role_id)
        .bind(input.department_id)
        .bind(&input.phone)
        .bind(password_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_constraint(e, "users_email_key", EMAIL_TAKEN))?;

        if previous_role != input.role_id {
            super::security::record_event(
                &mut tx,
                merch_crm_core::SecurityEventType::RoleChange,
                Some(actor),
                None,
                None,
                json!({ "user_id": id, "from": previous_role, "to": input.role_id }),
            )
            .await?;
        }
        if password_hash.is_some() {
            super::security::record_event(
                &mut tx,
                merch_crm_core::SecurityEventType::PasswordChange,
                Some(actor),
                None,
                None,
                json!({ "user_id": id }),
            )
            .await?;
        }

        audit::record(
            &mut tx,
            Some(actor),
            "User updated",
            "user",
            Some(id.as_uuid()),
            json!({ "name": input.name, "password_reset": password_hash.is_some() }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a user. System users are refused.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Conflict` for system users.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: UserId, actor: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (name, is_system) = sqlx::query_as::<_, (String, bool)>(
            "SELECT name, is_system FROM crm.users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if is_system {
            return Err(RepositoryError::Conflict(
                "System users cannot be deleted".to_owned(),
            ));
        }

        sqlx::query("DELETE FROM crm.users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "User deleted",
            "user",
            Some(id.as_uuid()),
            json!({ "name": name }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Stamp `last_active_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn touch_last_active(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE crm.users SET last_active_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Non-system users for select boxes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn options(&self) -> Result<Vec<UserOption>, RepositoryError> {
        let users = sqlx::query_as::<_, UserOption>(
            "SELECT id, name FROM crm.users WHERE NOT is_system ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(users)
    }

    /// IDs of every non-system user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn staff_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, UserId>("SELECT id FROM crm.users WHERE NOT is_system")
            .fetch_all(self.pool)
            .await?;

        Ok(ids)
    }

    /// IDs of every administrator.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn admin_ids(&self) -> Result<Vec<UserId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, UserId>(
            r"
            SELECT u.id FROM crm.users u
            JOIN crm.roles r ON r.id = u.role_id
            WHERE r.name = $1
            ",
        )
        .bind(ADMIN_ROLE)
        .fetch_all(self.pool)
        .await?;

        Ok(ids)
    }
}

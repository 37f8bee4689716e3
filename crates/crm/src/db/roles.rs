//! Role repository.

use serde_json::json;
use sqlx::PgPool;

use merch_crm_core::{RoleId, UserId};

use super::{RepositoryError, audit};
use crate::models::{Role, RoleInput};

const SELECT_ROLE: &str = r"
    SELECT r.id, r.name, r.permissions, r.is_system, r.department_id,
           d.name AS department_name, r.color,
           (SELECT COUNT(*) FROM crm.users u WHERE u.role_id = r.id) AS user_count,
           r.created_at
    FROM crm.roles r
    LEFT JOIN crm.departments d ON d.id = r.department_id
";

const NAME_TAKEN: &str = "A role with this name already exists";

/// Repository for role database operations.
pub struct RoleRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RoleRepository<'a> {
    /// Create a new role repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All roles with user counts, system roles first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Role>, RepositoryError> {
        let roles = sqlx::query_as::<_, Role>(&format!(
            "{SELECT_ROLE} ORDER BY r.is_system DESC, r.name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(roles)
    }

    /// Get a role by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: RoleId) -> Result<Option<Role>, RepositoryError> {
        let role = sqlx::query_as::<_, Role>(&format!("{SELECT_ROLE} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(role)
    }

    /// Find a role by exact name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<RoleId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, RoleId>("SELECT id FROM crm.roles WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;

        Ok(id)
    }

    /// Create a role with an empty permission map.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(&self, input: &RoleInput, actor: UserId) -> Result<RoleId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, RoleId>(
            r"
            INSERT INTO crm.roles (name, department_id, color)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(input.department_id)
        .bind(&input.color)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_unique(e, NAME_TAKEN))?;

        audit::record(
            &mut tx,
            Some(actor),
            "Role created",
            "role",
            Some(id.as_uuid()),
            json!({ "name": input.name }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Update a role. System roles keep their name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the role doesn't exist.
    /// Returns `RepositoryError::Conflict` when renaming a system role or on a duplicate name.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: RoleId,
        input: &RoleInput,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (name, is_system) = sqlx::query_as::<_, (String, bool)>(
            "SELECT name, is_system FROM crm.roles WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if is_system && name != input.name {
            return Err(RepositoryError::Conflict(
                "System roles cannot be renamed".to_owned(),
            ));
        }

        sqlx::query("UPDATE crm.roles SET name = $2, department_id = $3, color = $4 WHERE id = $1")
            .bind(id)
            .bind(&input.name)
            .bind(input.department_id)
            .bind(&input.color)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::on_unique(e, NAME_TAKEN))?;

        audit::record(
            &mut tx,
            Some(actor),
            "Role updated",
            "role",
            Some(id.as_uuid()),
            json!({ "name": input.name }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace a role's permission map.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the role doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_permissions(
        &self,
        id: RoleId,
        permissions: &serde_json::Value,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE crm.roles SET permissions = $2 WHERE id = $1")
            .bind(id)
            .bind(permissions)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Role permissions updated",
            "role",
            Some(id.as_uuid()),
            json!({ "permissions": permissions }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a role that is neither a system role nor assigned to anyone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the role doesn't exist.
    /// Returns `RepositoryError::Conflict` for system roles and roles with users.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: RoleId, actor: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (name, is_system) = sqlx::query_as::<_, (String, bool)>(
            "SELECT name, is_system FROM crm.roles WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if is_system {
            return Err(RepositoryError::Conflict(
                "System roles cannot be deleted".to_owned(),
            ));
        }

        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crm.users WHERE role_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        if users > 0 {
            return Err(RepositoryError::Conflict(format!(
                "Role is assigned to {users} user(s)"
            )));
        }

        sqlx::query("DELETE FROM crm.roles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Role deleted",
            "role",
            Some(id.as_uuid()),
            json!({ "name": name }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

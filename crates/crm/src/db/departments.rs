//! Department repository.

use serde_json::json;
use sqlx::PgPool;

use merch_crm_core::{DepartmentId, UserId};

use super::{RepositoryError, audit};
use crate::models::{Department, DepartmentInput};

const SELECT_DEPARTMENT: &str = r"
    SELECT d.id, d.name, d.description, d.color, d.is_active, d.is_system,
           (SELECT COUNT(*) FROM crm.users u WHERE u.department_id = d.id) AS user_count,
           d.created_at
    FROM crm.departments d
";

const NAME_TAKEN: &str = "A department with this name already exists";

/// Repository for department database operations.
pub struct DepartmentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DepartmentRepository<'a> {
    /// Create a new department repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All departments with user counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Department>, RepositoryError> {
        let departments = sqlx::query_as::<_, Department>(&format!(
            "{SELECT_DEPARTMENT} ORDER BY d.is_system DESC, d.name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(departments)
    }

    /// Create a department.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        input: &DepartmentInput,
        actor: UserId,
    ) -> Result<DepartmentId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, DepartmentId>(
            r"
            INSERT INTO crm.departments (name, description, color, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.color)
        .bind(input.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_unique(e, NAME_TAKEN))?;

        audit::record(
            &mut tx,
            Some(actor),
            "Department created",
            "department",
            Some(id.as_uuid()),
            json!({ "name": input.name }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Update a department.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the department doesn't exist.
    /// Returns `RepositoryError::Conflict` on a duplicate name.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: DepartmentId,
        input: &DepartmentInput,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE crm.departments
            SET name = $2, description = $3, color = $4, is_active = $5
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.color)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_unique(e, NAME_TAKEN))?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Department updated",
            "department",
            Some(id.as_uuid()),
            json!({ "name": input.name }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete a non-system department, detaching its users first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the department doesn't exist.
    /// Returns `RepositoryError::Conflict` for system departments.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: DepartmentId, actor: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (name, is_system) = sqlx::query_as::<_, (String, bool)>(
            "SELECT name, is_system FROM crm.departments WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if is_system {
            return Err(RepositoryError::Conflict(
                "System departments cannot be deleted".to_owned(),
            ));
        }

        let detached = sqlx::query("UPDATE crm.users SET department_id = NULL WHERE department_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM crm.departments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Department deleted",
            "department",
            Some(id.as_uuid()),
            json!({ "name": name, "detached_users": detached }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

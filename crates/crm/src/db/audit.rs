//! Audit trail.
//!
//! [`record`] runs on any connection so the entry commits (or rolls back)
//! together with the change it describes.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use merch_crm_core::UserId;

use super::{RepositoryError, like_pattern, page_window};
use crate::models::{AuditFilter, AuditLogEntry};

/// Audit rows per page.
pub const AUDIT_PAGE_SIZE: i64 = 50;

/// Write one audit entry.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn record(
    conn: &mut PgConnection,
    user_id: Option<UserId>,
    action: &str,
    entity_type: &str,
    entity_id: Option<Uuid>,
    details: serde_json::Value,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO crm.audit_logs (user_id, action, entity_type, entity_id, details)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(user_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(details)
    .execute(conn)
    .await?;

    Ok(())
}

const SELECT_ENTRY: &str = r"
    SELECT a.id, a.user_id, u.name AS user_name, a.action, a.entity_type,
           a.entity_id, a.details, a.created_at
    FROM crm.audit_logs a
    LEFT JOIN crm.users u ON u.id = a.user_id
";

/// Repository for reading and clearing the audit log.
pub struct AuditRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AuditRepository<'a> {
    /// Create a new audit repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// One page of entries, newest first, plus the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &AuditFilter,
    ) -> Result<(Vec<AuditLogEntry>, i64), RepositoryError> {
        let pattern = like_pattern(filter.search.as_deref());
        let entity_type = filter.entity_type.as_deref().filter(|s| !s.is_empty());
        let (limit, offset) = page_window(filter.page, AUDIT_PAGE_SIZE);

        let where_clause = r"
            WHERE ($1::text IS NULL OR a.action ILIKE $1 OR a.entity_type ILIKE $1
                   OR u.name ILIKE $1 OR a.details::text ILIKE $1)
              AND ($2::text IS NULL OR a.entity_type = $2)
              AND ($3::uuid IS NULL OR a.user_id = $3)
        ";

        let entries = sqlx::query_as::<_, AuditLogEntry>(&format!(
            "{SELECT_ENTRY} {where_clause} ORDER BY a.created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(&pattern)
        .bind(entity_type)
        .bind(filter.user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            r"SELECT COUNT(*) FROM crm.audit_logs a
              LEFT JOIN crm.users u ON u.id = a.user_id {where_clause}"
        ))
        .bind(&pattern)
        .bind(entity_type)
        .bind(filter.user_id)
        .fetch_one(self.pool)
        .await?;

        Ok((entries, total))
    }

    /// Latest entries for one entity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let entries = sqlx::query_as::<_, AuditLogEntry>(&format!(
            "{SELECT_ENTRY} WHERE a.entity_type = $1 AND a.entity_id = $2
             ORDER BY a.created_at DESC LIMIT $3"
        ))
        .bind(entity_type)
        .bind(entity_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(entries)
    }

    /// Distinct entity types for the filter dropdown.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn entity_types(&self) -> Result<Vec<String>, RepositoryError> {
        let types = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT entity_type FROM crm.audit_logs ORDER BY entity_type",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(types)
    }

    /// Delete every entry, leaving one "Audit log cleared" entry by `actor`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, actor: UserId) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM crm.audit_logs")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        record(
            &mut tx,
            Some(actor),
            "Audit log cleared",
            "system",
            None,
            serde_json::json!({ "deleted": deleted }),
        )
        .await?;

        tx.commit().await?;
        Ok(deleted)
    }
}

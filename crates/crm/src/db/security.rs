//! Security events and the persisted error log.

use serde_json::json;
use sqlx::{PgConnection, PgPool};

use merch_crm_core::{SecurityEventType, UserId};

use super::{PAGE_SIZE, RepositoryError, audit, page_window};
use crate::models::{NewSystemError, SecurityEvent, SystemError};

/// Record a security event on any connection.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn record_event(
    conn: &mut PgConnection,
    event_type: SecurityEventType,
    user_id: Option<UserId>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    details: serde_json::Value,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO crm.security_events (user_id, event_type, ip_address, user_agent, details)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(user_id)
    .bind(event_type)
    .bind(ip_address)
    .bind(user_agent)
    .bind(details)
    .execute(conn)
    .await?;

    Ok(())
}

/// Repository for the admin security page.
pub struct SecurityRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SecurityRepository<'a> {
    /// Create a new security repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a security event outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record(
        &self,
        event_type: SecurityEventType,
        user_id: Option<UserId>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        details: serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        record_event(&mut conn, event_type, user_id, ip_address, user_agent, details).await
    }

    /// Persist an unexpected failure.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record_error(&self, error: &NewSystemError) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO crm.system_errors (user_id, message, path, method, severity, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(error.user_id)
        .bind(&error.message)
        .bind(&error.path)
        .bind(&error.method)
        .bind(error.severity)
        .bind(&error.details)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// One page of security events, newest first, and the total.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn events(&self, page: u32) -> Result<(Vec<SecurityEvent>, i64), RepositoryError> {
        let (limit, offset) = page_window(page, PAGE_SIZE);

        let events = sqlx::query_as::<_, SecurityEvent>(
            r"
            SELECT e.id, e.user_id, u.name AS user_name, e.event_type, e.ip_address,
                   e.user_agent, e.details, e.created_at
            FROM crm.security_events e
            LEFT JOIN crm.users u ON u.id = e.user_id
            ORDER BY e.created_at DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crm.security_events")
            .fetch_one(self.pool)
            .await?;

        Ok((events, total))
    }

    /// One page of system errors, newest first, and the total.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn errors(&self, page: u32) -> Result<(Vec<SystemError>, i64), RepositoryError> {
        let (limit, offset) = page_window(page, PAGE_SIZE);

        let errors = sqlx::query_as::<_, SystemError>(
            r"
            SELECT id, user_id, message, stack, path, method, ip_address, severity,
                   details, created_at
            FROM crm.system_errors
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crm.system_errors")
            .fetch_one(self.pool)
            .await?;

        Ok((errors, total))
    }

    /// Failed logins in the last 24 hours.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent_failed_logins(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(*) FROM crm.security_events
            WHERE event_type = 'login_failed' AND created_at > NOW() - INTERVAL '24 hours'
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Delete every system error.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_errors(&self, actor: UserId) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM crm.system_errors")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        audit::record(
            &mut tx,
            Some(actor),
            "System errors cleared",
            "security",
            None,
            json!({ "deleted": deleted }),
        )
        .await?;

        tx.commit().await?;
        Ok(deleted)
    }

    /// Delete every failed-login event.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_failed_logins(&self, actor: UserId) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted =
            sqlx::query("DELETE FROM crm.security_events WHERE event_type = 'login_failed'")
                .execute(&mut *tx)
                .await?
                .rows_affected();

        audit::record(
            &mut tx,
            Some(actor),
            "Failed logins cleared",
            "security",
            None,
            json!({ "deleted": deleted }),
        )
        .await?;

        tx.commit().await?;
        Ok(deleted)
    }
}

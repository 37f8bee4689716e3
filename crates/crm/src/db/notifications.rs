//! In-app notification repository.

use sqlx::{PgConnection, PgPool};

use merch_crm_core::{NotificationId, NotificationType, UserId};

use super::RepositoryError;
use crate::models::Notification;

/// Notifications shown in the list.
pub const NOTIFICATION_LIMIT: i64 = 50;

/// Notify several users at once.
///
/// With `dedupe`, users who already have an identical unread notification
/// are skipped. Returns the number of rows inserted.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn notify_many(
    conn: &mut PgConnection,
    user_ids: &[UserId],
    title: &str,
    message: &str,
    kind: NotificationType,
    dedupe: bool,
) -> Result<u64, RepositoryError> {
    let inserted = sqlx::query(
        r"
        INSERT INTO crm.notifications (user_id, title, message, type)
        SELECT u, $2, $3, $4
        FROM UNNEST($1::uuid[]) AS u
        WHERE NOT $5 OR NOT EXISTS (
            SELECT 1 FROM crm.notifications n
            WHERE n.user_id = u AND n.title = $2 AND n.message = $3 AND NOT n.is_read
        )
        ",
    )
    .bind(user_ids)
    .bind(title)
    .bind(message)
    .bind(kind)
    .bind(dedupe)
    .execute(conn)
    .await?
    .rows_affected();

    Ok(inserted)
}

/// Repository for a user's notifications.
pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    /// Create a new notification repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Notify one user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn notify(
        &self,
        user_id: UserId,
        title: &str,
        message: &str,
        kind: NotificationType,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        notify_many(&mut conn, &[user_id], title, message, kind, false).await?;
        Ok(())
    }

    /// Notify several users outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn notify_many(
        &self,
        user_ids: &[UserId],
        title: &str,
        message: &str,
        kind: NotificationType,
        dedupe: bool,
    ) -> Result<u64, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        notify_many(&mut conn, user_ids, title, message, kind, dedupe).await
    }

    /// The latest notifications for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError> {
        let notifications = sqlx::query_as::<_, Notification>(
            r"
            SELECT id, user_id, title, message, type, is_read, created_at
            FROM crm.notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(user_id)
        .bind(NOTIFICATION_LIMIT)
        .fetch_all(self.pool)
        .await?;

        Ok(notifications)
    }

    /// Unread notifications for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unread_count(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM crm.notifications WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Mark one of the user's notifications read.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if it isn't theirs or doesn't exist.
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_read(
        &self,
        user_id: UserId,
        id: NotificationId,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            "UPDATE crm.notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Mark every notification of a user read.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE crm.notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(self.pool)
        .await?
        .rows_affected();

        Ok(updated)
    }

    /// Clients whose latest order is between `min_days` and `max_days` old,
    /// with their manager.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lost_clients(
        &self,
        min_days: i32,
        max_days: i32,
    ) -> Result<Vec<(String, Option<UserId>)>, RepositoryError> {
        let clients = sqlx::query_as::<_, (String, Option<UserId>)>(
            r"
            SELECT c.name, c.manager_id
            FROM crm.clients c
            JOIN LATERAL (
                SELECT MAX(created_at) AS last_order FROM crm.orders WHERE client_id = c.id
            ) o ON TRUE
            WHERE NOT c.is_archived
              AND o.last_order < NOW() - make_interval(days => $1)
              AND o.last_order > NOW() - make_interval(days => $2)
            ",
        )
        .bind(min_days)
        .bind(max_days)
        .fetch_all(self.pool)
        .await?;

        Ok(clients)
    }
}

//! Staff notifications: broadcast helpers, stock alerts and the once-a-day checks.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};

use merch_crm_core::{InventoryItemId, NotificationType, UserId};

use crate::db::settings::{self, SettingsError};
use crate::db::{NotificationRepository, RepositoryError, UserRepository};
use crate::models::StockLevel;
use crate::models::settings::keys;
use crate::services::stock::{StockError, StockService};

/// A client counts as lost after this many days without an order...
pub const LOST_CLIENT_MIN_DAYS: i32 = 90;

/// ...and stops being reported after this many.
pub const LOST_CLIENT_MAX_DAYS: i32 = 97;

/// Errors from notification jobs.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("auto-archive failed: {0}")]
    Stock(#[from] StockError),
}

/// What one run of the daily checks did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyReport {
    pub lost_clients: usize,
    pub archived_items: u64,
}

/// Notification service.
pub struct NotificationService<'a> {
    pool: &'a PgPool,
    notifications: NotificationRepository<'a>,
}

impl<'a> NotificationService<'a> {
    /// Create a new notification service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            notifications: NotificationRepository::new(pool),
        }
    }

    /// Notify every non-system user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn notify_staff(
        &self,
        title: &str,
        message: &str,
        kind: NotificationType,
    ) -> Result<u64, RepositoryError> {
        let staff = UserRepository::new(self.pool).staff_ids().await?;
        self.notifications
            .notify_many(&staff, title, message, kind, false)
            .await
    }

    /// Warn staff when an item is at or below its low or critical threshold.
    ///
    /// Users who still have the same unread alert are not notified again.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn check_item_stock_alerts(
        &self,
        item_id: InventoryItemId,
    ) -> Result<(), RepositoryError> {
        let Some(item) = crate::db::InventoryRepository::new(self.pool).get(item_id).await? else {
            return Ok(());
        };

        let (title, kind) = match item.stock_level() {
            StockLevel::Critical => ("Critical stock level", NotificationType::Error),
            StockLevel::Low => ("Low stock level", NotificationType::Warning),
            StockLevel::Ok => return Ok(()),
        };
        let message = format!(
            "{}: {} {} left",
            item.name,
            item.quantity,
            item.unit.label()
        );

        let staff = UserRepository::new(self.pool).staff_ids().await?;
        let sent = self
            .notifications
            .notify_many(&staff, title, &message, kind, true)
            .await?;
        if sent > 0 {
            info!(item = %item.name, quantity = item.quantity, sent, "Stock alert sent");
        }
        Ok(())
    }

    /// Run the daily checks unless they already ran today.
    ///
    /// The day is claimed before any check runs, so concurrent callers do
    /// the work once. Returns `None` when today was already claimed.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError` if claiming the day or a check fails.
    #[instrument(skip(self))]
    pub async fn run_daily_checks(&self) -> Result<Option<DailyReport>, NotificationError> {
        let today = Utc::now().date_naive();
        if !settings::claim_day(self.pool, keys::LAST_NOTIFICATION_CHECK, today).await? {
            return Ok(None);
        }

        let lost_clients = self.notify_lost_clients().await?;
        let archived_items = StockService::new(self.pool).auto_archive_stale().await?;

        let report = DailyReport {
            lost_clients,
            archived_items,
        };
        info!(?report, "Daily checks finished");
        Ok(Some(report))
    }

    async fn notify_lost_clients(&self) -> Result<usize, RepositoryError> {
        let clients = self
            .notifications
            .lost_clients(LOST_CLIENT_MIN_DAYS, LOST_CLIENT_MAX_DAYS)
            .await?;
        if clients.is_empty() {
            return Ok(0);
        }

        let admins = UserRepository::new(self.pool).admin_ids().await?;
        for (name, manager) in &clients {
            let recipients = recipients(manager.as_ref(), &admins);
            let message = format!(
                "{name} has not ordered for {LOST_CLIENT_MIN_DAYS} days. Time to get in touch."
            );
            self.notifications
                .notify_many(
                    &recipients,
                    "Client at risk",
                    &message,
                    NotificationType::Warning,
                    true,
                )
                .await?;
        }

        Ok(clients.len())
    }
}

/// The manager followed by every admin, without repeats.
fn recipients(manager: Option<&UserId>, admins: &[UserId]) -> Vec<UserId> {
    let mut users: Vec<UserId> = manager.into_iter().copied().collect();
    for admin in admins {
        if !users.contains(admin) {
            users.push(*admin);
        }
    }
    users
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipients_dedupes_manager_who_is_admin() {
        let admin = UserId::generate();
        let other = UserId::generate();

        assert_eq!(recipients(Some(&admin), &[admin, other]), vec![admin, other]);
        assert_eq!(recipients(None, &[other]), vec![other]);

        let manager = UserId::generate();
        assert_eq!(recipients(Some(&manager), &[]), vec![manager]);
    }
}

//! Database operations for the CRM `PostgreSQL` schema.
//!
//! # Schema: `crm`
//!
//! ## Tables
//!
//! - `users`, `roles`, `departments` - staff and access
//! - `clients` - customers
//! - `orders`, `order_items`, `order_attachments`, `payments` - order intake
//! - `inventory_items`, `inventory_categories`, `storage_locations`,
//!   `inventory_stocks`, `inventory_transactions`, `inventory_transfers` - warehouse
//! - `promocodes`, `expenses` - finance
//! - `notifications`, `audit_logs`, `security_events`, `system_errors` - activity
//! - `system_settings` - branding and flags (JSONB)
//! - `session` - tower-sessions store
//!
//! # Conventions
//!
//! Read paths live on `XRepository<'a>` structs borrowing the pool. Writes that
//! must share a transaction with other writes are free functions taking
//! `&mut PgConnection`, so callers pass `&mut *tx`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/crm/migrations/` and run via:
//! ```bash
//! cargo run -p merch-crm-cli -- migrate
//! ```

pub mod audit;
pub mod categories;
pub mod clients;
pub mod departments;
pub mod finance;
pub mod inventory;
pub mod locations;
pub mod notifications;
pub mod orders;
pub mod production;
pub mod promocodes;
pub mod roles;
pub mod search;
pub mod security;
pub mod settings;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use audit::AuditRepository;
pub use categories::CategoryRepository;
pub use clients::ClientRepository;
pub use departments::DepartmentRepository;
pub use finance::FinanceRepository;
pub use inventory::InventoryRepository;
pub use locations::LocationRepository;
pub use notifications::NotificationRepository;
pub use orders::OrderRepository;
pub use production::ProductionRepository;
pub use promocodes::PromocodeRepository;
pub use roles::RoleRepository;
pub use security::SecurityRepository;
pub use users::UserRepository;

/// Rows per page on list screens.
pub const PAGE_SIZE: i64 = 20;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A foreign key points at a row that doesn't exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

impl RepositoryError {
    /// Map a violation of `constraint` to `Conflict(message)`, anything else to `Database`.
    pub(crate) fn on_constraint(e: sqlx::Error, constraint: &str, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.constraint() == Some(constraint)
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }

    /// Map any foreign key violation to `InvalidReference(message)`.
    pub(crate) fn on_foreign_key(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_foreign_key_violation()
        {
            return Self::InvalidReference(message.to_owned());
        }
        Self::Database(e)
    }

    /// Map any unique violation to `Conflict(message)`.
    pub(crate) fn on_unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }
}

/// `LIMIT`/`OFFSET` for a 1-based page number.
#[must_use]
pub fn page_window(page: u32, limit: i64) -> (i64, i64) {
    let page = i64::from(page.max(1));
    (limit, (page - 1) * limit)
}

/// Number of pages needed for `total` rows.
#[must_use]
pub const fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

/// `%term%` for `ILIKE`, or `None` for a blank search.
#[must_use]
pub fn like_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(0, 20), (20, 0));
        assert_eq!(page_window(1, 20), (20, 0));
        assert_eq!(page_window(3, 50), (50, 100));
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern(None), None);
        assert_eq!(like_pattern(Some("   ")), None);
        assert_eq!(like_pattern(Some(" Ivan ")), Some("%Ivan%".to_owned()));
        assert_eq!(like_pattern(Some("50%_off")), Some("%50\\%\\_off%".to_owned()));
    }

    #[test]
    fn test_repository_error_display() {
        assert_eq!(RepositoryError::NotFound.to_string(), "not found");
        assert_eq!(
            RepositoryError::Conflict("email taken".into()).to_string(),
            "constraint violation: email taken"
        );
    }
}

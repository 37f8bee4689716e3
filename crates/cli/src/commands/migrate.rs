//! Database migration command.
//!
//! Applies `crates/crm/migrations/` in order. Already applied migrations are
//! skipped, so running it twice is harmless.

use super::{CommandError, connect};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run all pending migrations.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running CRM migrations...");
    sqlx::migrate!("../crm/migrations").run(&pool).await?;

    tracing::info!("CRM migrations complete!");
    Ok(())
}

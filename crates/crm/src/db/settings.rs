//! System settings database operations.
//!
//! Settings are JSONB values keyed by name in `crm.system_settings`.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};

use crate::models::{SystemSetting, SystemStats};

/// Error type for settings operations.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Get a setting value.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn get_setting(pool: &PgPool, key: &str) -> Result<Option<JsonValue>, SettingsError> {
    let result = sqlx::query_scalar::<_, JsonValue>(
        "SELECT value FROM crm.system_settings WHERE key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(result)
}

/// Set a setting value inside a caller's transaction.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn set_setting(
    conn: &mut PgConnection,
    key: &str,
    value: &JsonValue,
) -> Result<(), SettingsError> {
    sqlx::query(
        r"
        INSERT INTO crm.system_settings (key, value)
        VALUES ($1, $2)
        ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()
        ",
    )
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;

    Ok(())
}

/// Every setting, by key.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn list_settings(pool: &PgPool) -> Result<Vec<SystemSetting>, SettingsError> {
    let settings = sqlx::query_as::<_, SystemSetting>(
        "SELECT key, value, updated_at FROM crm.system_settings ORDER BY key",
    )
    .fetch_all(pool)
    .await?;

    Ok(settings)
}

/// Read a boolean flag; anything but JSON `true` is false.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn get_flag(pool: &PgPool, key: &str) -> Result<bool, SettingsError> {
    Ok(get_setting(pool, key).await? == Some(JsonValue::Bool(true)))
}

/// Store `today` under `key` unless it already holds `today`.
///
/// Returns `true` for the single caller that moved the date forward, so a
/// once-a-day job runs once even when two requests race.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn claim_day(pool: &PgPool, key: &str, today: NaiveDate) -> Result<bool, SettingsError> {
    let value = serde_json::to_value(today)?;
    let claimed = sqlx::query(
        r"
        INSERT INTO crm.system_settings (key, value)
        VALUES ($1, $2)
        ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()
        WHERE crm.system_settings.value IS DISTINCT FROM $2
        ",
    )
    .bind(key)
    .bind(&value)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(claimed == 1)
}

/// Row counts and database size; storage usage is filled in by the caller.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn system_counts(pool: &PgPool) -> Result<SystemStats, SettingsError> {
    let (users, clients, orders, items, database_size_bytes) =
        sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            r"
            SELECT
                (SELECT COUNT(*) FROM crm.users),
                (SELECT COUNT(*) FROM crm.clients),
                (SELECT COUNT(*) FROM crm.orders),
                (SELECT COUNT(*) FROM crm.inventory_items),
                pg_database_size(current_database())
            ",
        )
        .fetch_one(pool)
        .await?;

    Ok(SystemStats {
        users,
        clients,
        orders,
        items,
        database_size_bytes,
        ..SystemStats::default()
    })
}

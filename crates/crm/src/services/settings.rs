//! Branding, system settings and maintenance mode.
//!
//! Branding is read on every page render, so it is cached with `moka`
//! (60-second TTL) and invalidated on update. Maintenance mode is read by
//! middleware on every request and shares the same cache.

use std::time::Duration;

use moka::future::Cache;
use serde_json::{Value as JsonValue, json};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use merch_crm_core::{SecurityEventType, UserId};

use crate::db::settings::{self, SettingsError};
use crate::db::{RepositoryError, audit, security};
use crate::models::settings::keys;
use crate::models::{Branding, SystemSetting};

/// How long a cached setting is trusted.
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Errors from settings management.
#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for SettingsServiceError {
    fn from(e: sqlx::Error) -> Self {
        Self::Settings(SettingsError::Database(e))
    }
}

/// Cached values.
#[derive(Debug, Clone)]
enum CacheValue {
    Branding(Box<Branding>),
    Flag(bool),
}

/// Process-wide cache of settings read on hot paths.
#[derive(Clone)]
pub struct SettingsCache {
    cache: Cache<&'static str, CacheValue>,
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(16)
                .time_to_live(CACHE_TTL)
                .build(),
        }
    }

    async fn invalidate(&self, key: &'static str) {
        self.cache.invalidate(key).await;
    }
}

/// Settings service.
pub struct SettingsService<'a> {
    pool: &'a PgPool,
    cache: &'a SettingsCache,
}

impl<'a> SettingsService<'a> {
    /// Create a new settings service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, cache: &'a SettingsCache) -> Self {
        Self { pool, cache }
    }

    /// Stored branding merged over the defaults.
    ///
    /// Falls back to the defaults if the database can't be read, so a
    /// settings outage never takes page rendering down with it.
    pub async fn branding(&self) -> Branding {
        if let Some(CacheValue::Branding(branding)) = self.cache.cache.get(keys::BRANDING).await {
            return *branding;
        }

        match settings::get_setting(self.pool, keys::BRANDING).await {
            Ok(stored) => {
                let branding = Branding::from_stored(stored);
                self.cache
                    .cache
                    .insert(keys::BRANDING, CacheValue::Branding(Box::new(branding.clone())))
                    .await;
                branding
            }
            Err(e) => {
                warn!(error = %e, "Failed to load branding, using defaults");
                Branding::default()
            }
        }
    }

    /// Validate and store new branding.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError::Invalid` with a user-facing message if
    /// validation fails.
    /// Returns `SettingsServiceError::Settings` if the write fails.
    #[instrument(skip(self, branding))]
    pub async fn update_branding(
        &self,
        branding: &Branding,
        actor: UserId,
    ) -> Result<(), SettingsServiceError> {
        branding.validate().map_err(SettingsServiceError::Invalid)?;
        let value = serde_json::to_value(branding).map_err(SettingsError::from)?;

        let mut tx = self.pool.begin().await?;
        settings::set_setting(&mut tx, keys::BRANDING, &value).await?;
        audit::record(
            &mut tx,
            Some(actor),
            "Branding updated",
            "system_settings",
            None,
            json!({ "company_name": branding.company_name }),
        )
        .await?;
        tx.commit().await?;

        self.cache.invalidate(keys::BRANDING).await;
        info!("Branding updated");
        Ok(())
    }

    /// Whether maintenance mode is on. Read errors count as "off".
    pub async fn maintenance_mode(&self) -> bool {
        if let Some(CacheValue::Flag(on)) = self.cache.cache.get(keys::MAINTENANCE_MODE).await {
            return on;
        }

        match settings::get_flag(self.pool, keys::MAINTENANCE_MODE).await {
            Ok(on) => {
                self.cache
                    .cache
                    .insert(keys::MAINTENANCE_MODE, CacheValue::Flag(on))
                    .await;
                on
            }
            Err(e) => {
                warn!(error = %e, "Failed to read maintenance flag");
                false
            }
        }
    }

    /// Turn maintenance mode on or off and record a security event.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError::Settings` if the write fails.
    #[instrument(skip(self))]
    pub async fn toggle_maintenance(
        &self,
        enabled: bool,
        actor: UserId,
    ) -> Result<(), SettingsServiceError> {
        let mut tx = self.pool.begin().await?;
        settings::set_setting(&mut tx, keys::MAINTENANCE_MODE, &JsonValue::Bool(enabled)).await?;
        security::record_event(
            &mut tx,
            SecurityEventType::MaintenanceToggle,
            Some(actor),
            None,
            None,
            json!({ "enabled": enabled }),
        )
        .await?;
        audit::record(
            &mut tx,
            Some(actor),
            if enabled {
                "Maintenance mode enabled"
            } else {
                "Maintenance mode disabled"
            },
            "system_settings",
            None,
            json!({ "enabled": enabled }),
        )
        .await?;
        tx.commit().await?;

        self.cache.invalidate(keys::MAINTENANCE_MODE).await;
        warn!(enabled, "Maintenance mode toggled");
        Ok(())
    }

    /// Every stored setting.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError::Settings` if the query fails.
    pub async fn list(&self) -> Result<Vec<SystemSetting>, SettingsServiceError> {
        Ok(settings::list_settings(self.pool).await?)
    }

    /// Store an arbitrary setting.
    ///
    /// Branding goes through [`Self::update_branding`] so it is validated.
    ///
    /// # Errors
    ///
    /// Returns `SettingsServiceError::Invalid` for an empty key or the branding key.
    /// Returns `SettingsServiceError::Settings` if the write fails.
    #[instrument(skip(self, value))]
    pub async fn update_setting(
        &self,
        key: &str,
        value: &JsonValue,
        actor: UserId,
    ) -> Result<(), SettingsServiceError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SettingsServiceError::Invalid("Setting key is required".to_owned()));
        }
        if key == keys::BRANDING {
            return Err(SettingsServiceError::Invalid(
                "Branding is edited on the branding page".to_owned(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        settings::set_setting(&mut tx, key, value).await?;
        audit::record(
            &mut tx,
            Some(actor),
            "System setting updated",
            "system_settings",
            None,
            json!({ "key": key, "value": value }),
        )
        .await?;
        tx.commit().await?;

        if key == keys::MAINTENANCE_MODE {
            self.cache.invalidate(keys::MAINTENANCE_MODE).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_round_trip() {
        let cache = SettingsCache::new();
        cache
            .cache
            .insert(keys::MAINTENANCE_MODE, CacheValue::Flag(true))
            .await;
        assert!(matches!(
            cache.cache.get(keys::MAINTENANCE_MODE).await,
            Some(CacheValue::Flag(true))
        ));

        cache.invalidate(keys::MAINTENANCE_MODE).await;
        assert!(cache.cache.get(keys::MAINTENANCE_MODE).await.is_none());
    }

    #[test]
    fn test_invalid_message_is_shown_verbatim() {
        let err = SettingsServiceError::Invalid("Company name is required".to_owned());
        assert_eq!(err.to_string(), "Company name is required");
    }
}

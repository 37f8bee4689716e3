//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::CrmConfig;
use crate::services::{LocalStorage, SettingsCache, SettingsService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CrmConfig,
    pool: PgPool,
    storage: LocalStorage,
    settings_cache: SettingsCache,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - CRM configuration
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub fn new(config: CrmConfig, pool: PgPool) -> Self {
        let storage = LocalStorage::new(config.storage_root.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                storage,
                settings_cache: SettingsCache::new(),
            }),
        }
    }

    /// Get a reference to the CRM configuration.
    #[must_use]
    pub fn config(&self) -> &CrmConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the local file storage.
    #[must_use]
    pub fn storage(&self) -> &LocalStorage {
        &self.inner.storage
    }

    /// Settings service backed by the shared cache.
    #[must_use]
    pub fn settings(&self) -> SettingsService<'_> {
        SettingsService::new(&self.inner.pool, &self.inner.settings_cache)
    }
}

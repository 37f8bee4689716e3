//! Storage location repository.

use serde_json::json;
use sqlx::PgPool;

use merch_crm_core::{StorageLocationId, UserId};

use super::{RepositoryError, audit};
use crate::models::{LocationInput, StorageLocation};

const SELECT_LOCATION: &str = r"
    SELECT l.id, l.name, l.address, l.description, l.responsible_user_id,
           u.name AS responsible_user_name, l.type, l.is_system, l.is_default, l.is_active,
           l.sort_order,
           (SELECT COUNT(*) FROM crm.inventory_stocks s
             WHERE s.storage_location_id = l.id AND s.quantity > 0) AS item_count,
           (SELECT COALESCE(SUM(s.quantity), 0)::bigint FROM crm.inventory_stocks s
             WHERE s.storage_location_id = l.id) AS total_quantity
    FROM crm.storage_locations l
    LEFT JOIN crm.users u ON u.id = l.responsible_user_id
";

/// Repository for storage locations.
pub struct LocationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LocationRepository<'a> {
    /// Create a new location repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All locations with stock counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<StorageLocation>, RepositoryError> {
        let locations = sqlx::query_as::<_, StorageLocation>(&format!(
            "{SELECT_LOCATION} ORDER BY l.sort_order, l.name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(locations)
    }

    /// Get a location by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        id: StorageLocationId,
    ) -> Result<Option<StorageLocation>, RepositoryError> {
        let location =
            sqlx::query_as::<_, StorageLocation>(&format!("{SELECT_LOCATION} WHERE l.id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        Ok(location)
    }

    /// Create a location. A new default location clears the previous default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        input: &LocationInput,
        actor: UserId,
    ) -> Result<StorageLocationId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            sqlx::query("UPDATE crm.storage_locations SET is_default = FALSE WHERE is_default")
                .execute(&mut *tx)
                .await?;
        }

        let id = sqlx::query_scalar::<_, StorageLocationId>(
            r"
            INSERT INTO crm.storage_locations
                (name, address, description, responsible_user_id, type, is_default, is_active,
                 sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7,
                    (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM crm.storage_locations))
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(&input.address)
        .bind(&input.description)
        .bind(input.responsible_user_id)
        .bind(input.kind)
        .bind(input.is_default)
        .bind(input.is_active)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Storage location created",
            "storage_location",
            Some(id.as_uuid()),
            json!({ "name": input.name }),
        )
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Update a location.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the location doesn't exist.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: StorageLocationId,
        input: &LocationInput,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            sqlx::query(
                "UPDATE crm.storage_locations SET is_default = FALSE WHERE is_default AND id <> $1",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            r"
            UPDATE crm.storage_locations
            SET name = $2, address = $3, description = $4, responsible_user_id = $5,
                type = $6, is_default = $7, is_active = $8
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.address)
        .bind(&input.description)
        .bind(input.responsible_user_id)
        .bind(input.kind)
        .bind(input.is_default)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Storage location updated",
            "storage_location",
            Some(id.as_uuid()),
            json!({ "name": input.name }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete an empty, non-system location.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the location doesn't exist.
    /// Returns `RepositoryError::Conflict` for system locations or when stock remains.
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: StorageLocationId, actor: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let (name, is_system, stock) = sqlx::query_as::<_, (String, bool, i64)>(
            r"
            SELECT l.name, l.is_system,
                   (SELECT COALESCE(SUM(quantity), 0)::bigint FROM crm.inventory_stocks
                     WHERE storage_location_id = l.id)
            FROM crm.storage_locations l
            WHERE l.id = $1
            FOR UPDATE
            ",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if is_system {
            return Err(RepositoryError::Conflict(
                "System locations cannot be deleted".to_owned(),
            ));
        }
        if stock > 0 {
            return Err(RepositoryError::Conflict(format!(
                "Location still holds {stock} unit(s) of stock"
            )));
        }

        sqlx::query("DELETE FROM crm.storage_locations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Storage location deleted",
            "storage_location",
            Some(id.as_uuid()),
            json!({ "name": name }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Store a new sort order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn reorder(
        &self,
        order: &[(StorageLocationId, i32)],
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (id, sort_order) in order {
            sqlx::query("UPDATE crm.storage_locations SET sort_order = $2 WHERE id = $1")
                .bind(id)
                .bind(sort_order)
                .execute(&mut *tx)
                .await?;
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Storage locations reordered",
            "storage_location",
            None,
            json!({ "count": order.len() }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

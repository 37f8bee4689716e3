//! Warehouse item repository and the stock primitives used by services.
//!
//! Reads and single-step mutations live on `InventoryRepository`. Anything
//! that moves stock is a free function over `&mut PgConnection` so that the
//! order, production and stock services can compose it inside one
//! transaction.

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgConnection, PgPool};

use merch_crm_core::{
    CategoryId, InventoryItemId, StorageLocationId, TransactionId, TransactionType, UserId,
};

use super::{PAGE_SIZE, RepositoryError, audit, like_pattern, page_window};
use crate::models::{
    CriticalItem, InventoryItem, InventoryTransaction, ItemDetails, ItemFilter, ItemInput,
    ItemStock, WarehouseActivity, WarehouseStats,
};

/// Transactions shown on an item card.
pub const ITEM_HISTORY_LIMIT: i64 = 50;

/// Critical items shown on the warehouse overview.
const CRITICAL_ITEMS_LIMIT: i64 = 20;

const SELECT_ITEM: &str = r"
    SELECT i.id, i.name, i.sku, i.category_id, c.name AS category_name, i.item_type,
           i.quantity, i.reserved_quantity, i.unit, i.low_stock_threshold,
           i.critical_stock_threshold, i.description, i.cost_price, i.selling_price,
           i.is_archived, i.archived_at, i.archive_reason, i.zero_stock_since,
           i.attributes, i.created_at, i.updated_at
    FROM crm.inventory_items i
    LEFT JOIN crm.inventory_categories c ON c.id = i.category_id
";

const LIST_WHERE: &str = r"
    WHERE i.is_archived = $1
      AND ($2::text IS NULL OR i.name ILIKE $2 OR i.sku ILIKE $2)
      AND ($3::uuid IS NULL OR i.category_id = $3)
      AND (NOT $4 OR i.quantity <= i.low_stock_threshold)
";

const SELECT_TRANSACTION: &str = r"
    SELECT t.id, t.item_id, i.name AS item_name, t.change_amount, t.type, t.reason,
           l.name AS location_name, fl.name AS from_location_name, t.cost_price,
           u.name AS created_by_name, t.created_at
    FROM crm.inventory_transactions t
    JOIN crm.inventory_items i ON i.id = t.item_id
    LEFT JOIN crm.storage_locations l ON l.id = t.storage_location_id
    LEFT JOIN crm.storage_locations fl ON fl.id = t.from_storage_location_id
    LEFT JOIN crm.users u ON u.id = t.created_by
";

const SKU_TAKEN: &str = "An item with this SKU already exists";

// =============================================================================
// Repository
// =============================================================================

/// Repository for warehouse items.
pub struct InventoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InventoryRepository<'a> {
    /// Create a new inventory repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// One page of items by name, and the total.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &ItemFilter,
    ) -> Result<(Vec<InventoryItem>, i64), RepositoryError> {
        let pattern = like_pattern(filter.search.as_deref());
        let (limit, offset) = page_window(filter.page, PAGE_SIZE);

        let items = sqlx::query_as::<_, InventoryItem>(&format!(
            "{SELECT_ITEM} {LIST_WHERE} ORDER BY i.name LIMIT $5 OFFSET $6"
        ))
        .bind(filter.archived)
        .bind(&pattern)
        .bind(filter.category_id)
        .bind(filter.low_stock_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM crm.inventory_items i {LIST_WHERE}"
        ))
        .bind(filter.archived)
        .bind(&pattern)
        .bind(filter.category_id)
        .bind(filter.low_stock_only)
        .fetch_one(self.pool)
        .await?;

        Ok((items, total))
    }

    /// Every non-archived item by name, for order forms.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active(&self) -> Result<Vec<InventoryItem>, RepositoryError> {
        let items = sqlx::query_as::<_, InventoryItem>(&format!(
            "{SELECT_ITEM} WHERE NOT i.is_archived ORDER BY i.name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Get an item by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, RepositoryError> {
        let item = sqlx::query_as::<_, InventoryItem>(&format!("{SELECT_ITEM} WHERE i.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(item)
    }

    /// An item with its stock per location and recent history.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn details(&self, id: InventoryItemId) -> Result<Option<ItemDetails>, RepositoryError> {
        let Some(item) = self.get(id).await? else {
            return Ok(None);
        };

        let stocks = self.stocks(id).await?;
        let history = self.history(Some(id), ITEM_HISTORY_LIMIT).await?;

        Ok(Some(ItemDetails {
            item,
            stocks,
            history,
        }))
    }

    /// Stock of one item per location.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stocks(&self, id: InventoryItemId) -> Result<Vec<ItemStock>, RepositoryError> {
        let stocks = sqlx::query_as::<_, ItemStock>(
            r"
            SELECT s.storage_location_id, l.name AS location_name, s.quantity
            FROM crm.inventory_stocks s
            JOIN crm.storage_locations l ON l.id = s.storage_location_id
            WHERE s.item_id = $1
            ORDER BY l.sort_order, l.name
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(stocks)
    }

    /// Stock transactions newest first, for one item or the whole warehouse.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn history(
        &self,
        item_id: Option<InventoryItemId>,
        limit: i64,
    ) -> Result<Vec<InventoryTransaction>, RepositoryError> {
        let history = sqlx::query_as::<_, InventoryTransaction>(&format!(
            r"{SELECT_TRANSACTION}
              WHERE ($1::uuid IS NULL OR t.item_id = $1)
              ORDER BY t.created_at DESC
              LIMIT $2"
        ))
        .bind(item_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(history)
    }

    /// Whether another item already uses this name (case-insensitive) or SKU.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn duplicate_exists(
        &self,
        name: &str,
        sku: Option<&str>,
        exclude: Option<InventoryItemId>,
    ) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS(
                SELECT 1 FROM crm.inventory_items
                WHERE (LOWER(name) = LOWER($1) OR ($2::text IS NOT NULL AND sku = $2))
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            ",
        )
        .bind(name)
        .bind(sku)
        .bind(exclude)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Warehouse overview counters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn stats(&self) -> Result<WarehouseStats, RepositoryError> {
        let (total_quantity, total_reserved, archived_count) =
            sqlx::query_as::<_, (i64, i64, i64)>(
                r"
                SELECT
                    COALESCE(SUM(quantity) FILTER (WHERE NOT is_archived), 0)::bigint,
                    COALESCE(SUM(reserved_quantity) FILTER (WHERE NOT is_archived), 0)::bigint,
                    COUNT(*) FILTER (WHERE is_archived)
                FROM crm.inventory_items
                ",
            )
            .fetch_one(self.pool)
            .await?;

        let critical_items = self.critical_items().await?;

        let activity = sqlx::query_as::<_, WarehouseActivity>(
            r"
            SELECT
                COUNT(*) FILTER (WHERE type = 'in') AS ins,
                COUNT(*) FILTER (WHERE type = 'out') AS usage,
                COUNT(*) FILTER (
                    WHERE type = 'out'
                      AND (reason ILIKE '%defect%' OR reason ILIKE '%write-off%')
                ) AS waste,
                COUNT(*) FILTER (WHERE type = 'transfer') AS transfers
            FROM crm.inventory_transactions
            WHERE created_at > NOW() - INTERVAL '30 days'
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(WarehouseStats {
            total_quantity,
            total_reserved,
            archived_count,
            critical_items,
            activity,
        })
    }

    /// Non-archived items at or below their low-stock threshold.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn critical_items(&self) -> Result<Vec<CriticalItem>, RepositoryError> {
        let items = sqlx::query_as::<_, CriticalItem>(
            r"
            SELECT id, name, sku, quantity, low_stock_threshold, unit
            FROM crm.inventory_items
            WHERE NOT is_archived AND quantity <= low_stock_threshold
            ORDER BY quantity, name
            LIMIT $1
            ",
        )
        .bind(CRITICAL_ITEMS_LIMIT)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Items with zero stock since before `months` months ago.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stale_ids(&self, months: i32) -> Result<Vec<InventoryItemId>, RepositoryError> {
        let ids = sqlx::query_scalar::<_, InventoryItemId>(
            r"
            SELECT id FROM crm.inventory_items
            WHERE NOT is_archived
              AND quantity = 0
              AND COALESCE(zero_stock_since, updated_at) < NOW() - make_interval(months => $1)
            ",
        )
        .bind(months)
        .fetch_all(self.pool)
        .await?;

        Ok(ids)
    }

    /// Update an item's descriptive fields.
    ///
    /// Changed attributes are also written to the stock ledger.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist.
    /// Returns `RepositoryError::Conflict` if the SKU is taken.
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn update(
        &self,
        id: InventoryItemId,
        input: &ItemInput,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT attributes FROM crm.inventory_items WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        sqlx::query(
            r"
            UPDATE crm.inventory_items
            SET name = $2, sku = $3, category_id = $4, item_type = $5, unit = $6,
                low_stock_threshold = $7, critical_stock_threshold = $8, description = $9,
                cost_price = $10, selling_price = $11, attributes = $12
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.sku)
        .bind(input.category_id)
        .bind(input.item_type)
        .bind(input.unit)
        .bind(input.low_stock_threshold)
        .bind(input.critical_stock_threshold)
        .bind(&input.description)
        .bind(input.cost_price)
        .bind(input.selling_price)
        .bind(&input.attributes)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::on_constraint(e, "inventory_items_sku_key", SKU_TAKEN))?;

        if previous != input.attributes {
            insert_transaction(
                &mut tx,
                &NewTransaction {
                    reason: Some("Attributes changed".to_owned()),
                    ..NewTransaction::new(id, TransactionType::AttributeChange, 0, Some(actor))
                },
            )
            .await?;
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Item updated",
            "inventory_item",
            Some(id.as_uuid()),
            json!({ "name": input.name, "sku": input.sku }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Move items to another category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn update_category(
        &self,
        ids: &[InventoryItemId],
        category_id: Option<CategoryId>,
        actor: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE crm.inventory_items SET category_id = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(category_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        audit::record(
            &mut tx,
            Some(actor),
            "Items recategorised",
            "inventory_item",
            None,
            json!({ "count": updated, "category_id": category_id }),
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Archive items, writing an `archive` ledger entry per item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn archive(
        &self,
        ids: &[InventoryItemId],
        reason: &str,
        actor: Option<UserId>,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let archived = sqlx::query_scalar::<_, InventoryItemId>(
            r"
            UPDATE crm.inventory_items
            SET is_archived = TRUE, archived_at = NOW(), archived_by = $2, archive_reason = $3
            WHERE id = ANY($1) AND NOT is_archived
            RETURNING id
            ",
        )
        .bind(ids)
        .bind(actor)
        .bind(reason)
        .fetch_all(&mut *tx)
        .await?;

        for &id in &archived {
            insert_transaction(
                &mut tx,
                &NewTransaction {
                    reason: Some(reason.to_owned()),
                    ..NewTransaction::new(id, TransactionType::Archive, 0, actor)
                },
            )
            .await?;
        }

        audit::record(
            &mut tx,
            actor,
            "Items archived",
            "inventory_item",
            None,
            json!({ "count": archived.len(), "reason": reason }),
        )
        .await?;

        tx.commit().await?;
        Ok(archived.len() as u64)
    }

    /// Restore archived items, writing a `restore` ledger entry per item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn restore(
        &self,
        ids: &[InventoryItemId],
        reason: &str,
        actor: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let restored = sqlx::query_scalar::<_, InventoryItemId>(
            r"
            UPDATE crm.inventory_items
            SET is_archived = FALSE, archived_at = NULL, archived_by = NULL, archive_reason = NULL
            WHERE id = ANY($1) AND is_archived
            RETURNING id
            ",
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await?;

        for &id in &restored {
            insert_transaction(
                &mut tx,
                &NewTransaction {
                    reason: Some(reason.to_owned()),
                    ..NewTransaction::new(id, TransactionType::Restore, 0, Some(actor))
                },
            )
            .await?;
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Items restored",
            "inventory_item",
            None,
            json!({ "count": restored.len(), "reason": reason }),
        )
        .await?;

        tx.commit().await?;
        Ok(restored.len() as u64)
    }

    /// Delete items that no order line references.
    ///
    /// Returns the number of items deleted; referenced items are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn delete(
        &self,
        ids: &[InventoryItemId],
        actor: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r"
            DELETE FROM crm.inventory_items i
            WHERE i.id = ANY($1)
              AND NOT EXISTS (SELECT 1 FROM crm.order_items oi WHERE oi.inventory_id = i.id)
            ",
        )
        .bind(ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        audit::record(
            &mut tx,
            Some(actor),
            "Items deleted",
            "inventory_item",
            None,
            json!({ "requested": ids.len(), "deleted": deleted }),
        )
        .await?;

        tx.commit().await?;
        Ok(deleted)
    }
}

// =============================================================================
// Stock primitives
// =============================================================================

/// The columns of an item that stock moves need, read under a row lock.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LockedItem {
    pub id: InventoryItemId,
    pub name: String,
    pub quantity: i32,
    pub reserved_quantity: i32,
    pub cost_price: Option<Decimal>,
}

/// A stock ledger entry to insert.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub item_id: InventoryItemId,
    pub kind: TransactionType,
    pub change_amount: i32,
    pub reason: Option<String>,
    pub location_id: Option<StorageLocationId>,
    pub from_location_id: Option<StorageLocationId>,
    pub cost_price: Option<Decimal>,
    pub created_by: Option<UserId>,
}

impl NewTransaction {
    /// An entry with no reason, locations or cost.
    #[must_use]
    pub const fn new(
        item_id: InventoryItemId,
        kind: TransactionType,
        change_amount: i32,
        created_by: Option<UserId>,
    ) -> Self {
        Self {
            item_id,
            kind,
            change_amount,
            reason: None,
            location_id: None,
            from_location_id: None,
            cost_price: None,
            created_by,
        }
    }
}

/// Lock an item row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_item(
    conn: &mut PgConnection,
    id: InventoryItemId,
) -> Result<Option<LockedItem>, RepositoryError> {
    let item = sqlx::query_as::<_, LockedItem>(
        r"
        SELECT id, name, quantity, reserved_quantity, cost_price
        FROM crm.inventory_items WHERE id = $1 FOR UPDATE
        ",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(item)
}

/// The name of an item, for error messages.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn item_name(
    conn: &mut PgConnection,
    id: InventoryItemId,
) -> Result<String, RepositoryError> {
    let name = sqlx::query_scalar::<_, String>("SELECT name FROM crm.inventory_items WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    Ok(name.unwrap_or_else(|| id.to_string()))
}

/// Reserve `quantity` units if that many are free.
///
/// Returns `false` without changing anything when stock is short.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn reserve(
    conn: &mut PgConnection,
    id: InventoryItemId,
    quantity: i32,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query(
        r"
        UPDATE crm.inventory_items
        SET reserved_quantity = reserved_quantity + $2
        WHERE id = $1 AND reserved_quantity + $2 <= quantity
        ",
    )
    .bind(id)
    .bind(quantity)
    .execute(conn)
    .await?
    .rows_affected();

    Ok(updated == 1)
}

/// Give back a reservation, never going below zero.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn release_reservation(
    conn: &mut PgConnection,
    id: InventoryItemId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE crm.inventory_items
        SET reserved_quantity = GREATEST(0, reserved_quantity - $2)
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(quantity)
    .execute(conn)
    .await?;

    Ok(())
}

/// Consume reserved stock on shipment: both counters drop, floored at zero.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn consume_reserved(
    conn: &mut PgConnection,
    id: InventoryItemId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE crm.inventory_items
        SET reserved_quantity = GREATEST(0, reserved_quantity - $2),
            quantity = GREATEST(0, quantity - $2),
            zero_stock_since = CASE
                WHEN GREATEST(0, quantity - $2) = 0 THEN COALESCE(zero_stock_since, NOW())
                ELSE NULL
            END
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(quantity)
    .execute(conn)
    .await?;

    Ok(())
}

/// Write off stock outside any reservation, floored at zero. Returns the new quantity.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn write_off(
    conn: &mut PgConnection,
    id: InventoryItemId,
    quantity: i32,
) -> Result<i32, RepositoryError> {
    let remaining = sqlx::query_scalar::<_, i32>(
        r"
        UPDATE crm.inventory_items
        SET quantity = GREATEST(0, quantity - $2),
            zero_stock_since = CASE
                WHEN GREATEST(0, quantity - $2) = 0 THEN COALESCE(zero_stock_since, NOW())
                ELSE NULL
            END
        WHERE id = $1
        RETURNING quantity
        ",
    )
    .bind(id)
    .bind(quantity)
    .fetch_one(conn)
    .await?;

    Ok(remaining)
}

/// The location holding the most stock of an item, if it holds at least `at_least`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn largest_stock_location(
    conn: &mut PgConnection,
    id: InventoryItemId,
    at_least: i32,
) -> Result<Option<StorageLocationId>, RepositoryError> {
    let location = sqlx::query_scalar::<_, StorageLocationId>(
        r"
        SELECT storage_location_id FROM crm.inventory_stocks
        WHERE item_id = $1 AND quantity >= $2
        ORDER BY quantity DESC
        LIMIT 1
        FOR UPDATE
        ",
    )
    .bind(id)
    .bind(at_least)
    .fetch_optional(conn)
    .await?;

    Ok(location)
}

/// Current stock at one location, locking the row when it exists.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn location_stock(
    conn: &mut PgConnection,
    id: InventoryItemId,
    location_id: StorageLocationId,
) -> Result<i32, RepositoryError> {
    let quantity = sqlx::query_scalar::<_, i32>(
        r"
        SELECT quantity FROM crm.inventory_stocks
        WHERE item_id = $1 AND storage_location_id = $2
        FOR UPDATE
        ",
    )
    .bind(id)
    .bind(location_id)
    .fetch_optional(conn)
    .await?;

    Ok(quantity.unwrap_or(0))
}

/// Every stock row of an item, locked.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn item_stock_rows(
    conn: &mut PgConnection,
    id: InventoryItemId,
) -> Result<Vec<(StorageLocationId, i32)>, RepositoryError> {
    let rows = sqlx::query_as::<_, (StorageLocationId, i32)>(
        r"
        SELECT storage_location_id, quantity FROM crm.inventory_stocks
        WHERE item_id = $1 AND quantity > 0
        FOR UPDATE
        ",
    )
    .bind(id)
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

/// Add `delta` to the stock at one location, creating the row if needed.
///
/// Returns the new quantity.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the upsert fails.
pub async fn add_location_stock(
    conn: &mut PgConnection,
    id: InventoryItemId,
    location_id: StorageLocationId,
    delta: i32,
) -> Result<i32, RepositoryError> {
    let quantity = sqlx::query_scalar::<_, i32>(
        r"
        INSERT INTO crm.inventory_stocks (item_id, storage_location_id, quantity)
        VALUES ($1, $2, $3)
        ON CONFLICT (item_id, storage_location_id)
        DO UPDATE SET quantity = crm.inventory_stocks.quantity + EXCLUDED.quantity
        RETURNING quantity
        ",
    )
    .bind(id)
    .bind(location_id)
    .bind(delta)
    .fetch_one(conn)
    .await?;

    Ok(quantity)
}

/// Recompute an item's total after a stock move and track zero stock.
///
/// With stock rows the total is their sum; without, `net` is applied to the
/// stored quantity, floored at zero. Returns the new quantity.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn sync_quantity(
    conn: &mut PgConnection,
    id: InventoryItemId,
    net: i32,
) -> Result<i32, RepositoryError> {
    let quantity = sqlx::query_scalar::<_, i32>(
        r"
        WITH totals AS (
            SELECT COUNT(*) AS row_count, COALESCE(SUM(quantity), 0)::int AS total
            FROM crm.inventory_stocks WHERE item_id = $1
        )
        UPDATE crm.inventory_items i
        SET quantity = CASE
                WHEN totals.row_count > 0 THEN totals.total
                ELSE GREATEST(0, i.quantity + $2)
            END,
            zero_stock_since = CASE
                WHEN (CASE WHEN totals.row_count > 0 THEN totals.total
                           ELSE GREATEST(0, i.quantity + $2) END) <= 0
                    THEN COALESCE(i.zero_stock_since, NOW())
                ELSE NULL
            END
        FROM totals
        WHERE i.id = $1
        RETURNING i.quantity
        ",
    )
    .bind(id)
    .bind(net)
    .fetch_one(conn)
    .await?;

    Ok(quantity)
}

/// Update an item's cost price.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_cost_price(
    conn: &mut PgConnection,
    id: InventoryItemId,
    cost_price: Decimal,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE crm.inventory_items SET cost_price = $2 WHERE id = $1")
        .bind(id)
        .bind(cost_price)
        .execute(conn)
        .await?;

    Ok(())
}

/// Append a stock ledger entry.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_transaction(
    conn: &mut PgConnection,
    entry: &NewTransaction,
) -> Result<TransactionId, RepositoryError> {
    let id = sqlx::query_scalar::<_, TransactionId>(
        r"
        INSERT INTO crm.inventory_transactions (
            item_id, change_amount, type, reason, storage_location_id,
            from_storage_location_id, cost_price, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        ",
    )
    .bind(entry.item_id)
    .bind(entry.change_amount)
    .bind(entry.kind)
    .bind(&entry.reason)
    .bind(entry.location_id)
    .bind(entry.from_location_id)
    .bind(entry.cost_price)
    .bind(entry.created_by)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

/// Record a move between locations.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_transfer(
    conn: &mut PgConnection,
    id: InventoryItemId,
    from: StorageLocationId,
    to: StorageLocationId,
    quantity: i32,
    comment: &str,
    created_by: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO crm.inventory_transfers
            (item_id, from_location_id, to_location_id, quantity, comment, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(quantity)
    .bind(comment)
    .bind(created_by)
    .execute(conn)
    .await?;

    Ok(())
}

/// Insert a new item with zero stock.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the SKU is taken.
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    input: &ItemInput,
    sku: &str,
) -> Result<InventoryItemId, RepositoryError> {
    let id = sqlx::query_scalar::<_, InventoryItemId>(
        r"
        INSERT INTO crm.inventory_items (
            name, sku, category_id, item_type, unit, low_stock_threshold,
            critical_stock_threshold, description, cost_price, selling_price, attributes,
            zero_stock_since
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
        RETURNING id
        ",
    )
    .bind(&input.name)
    .bind(sku)
    .bind(input.category_id)
    .bind(input.item_type)
    .bind(input.unit)
    .bind(input.low_stock_threshold)
    .bind(input.critical_stock_threshold)
    .bind(&input.description)
    .bind(input.cost_price)
    .bind(input.selling_price)
    .bind(&input.attributes)
    .fetch_one(conn)
    .await
    .map_err(|e| RepositoryError::on_constraint(e, "inventory_items_sku_key", SKU_TAKEN))?;

    Ok(id)
}

/// The SKU prefix of a category, if it has one.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn category_prefix(
    conn: &mut PgConnection,
    category_id: CategoryId,
) -> Result<Option<String>, RepositoryError> {
    let prefix = sqlx::query_scalar::<_, Option<String>>(
        "SELECT prefix FROM crm.inventory_categories WHERE id = $1",
    )
    .bind(category_id)
    .fetch_optional(conn)
    .await?;

    Ok(prefix.flatten())
}

//! Stock movements: manual adjustments, transfers between locations, item
//! intake and the stale-item auto-archive.
//!
//! Each operation runs in one transaction built from the primitives in
//! [`crate::db::inventory`]. Stock alerts are checked after commit.

use rand::Rng;
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use merch_crm_core::{InventoryItemId, StorageLocationId, TransactionType, UserId};

use crate::db::inventory::{self, NewTransaction};
use crate::db::{InventoryRepository, LocationRepository, RepositoryError, audit};
use crate::models::{AdjustKind, ItemInput, StockAdjustment, StockTransfer};
use crate::services::notifications::NotificationService;

/// SKU prefix for items without a categorised prefix.
pub const DEFAULT_SKU_PREFIX: &str = "ITM";

/// Random characters after the SKU prefix.
pub const SKU_SUFFIX_LEN: usize = 6;

/// Items out of stock for this many months are archived.
pub const STALE_MONTHS: i32 = 3;

/// Reason written on automatically archived items.
pub const AUTO_ARCHIVE_REASON: &str = "Automatic archive: zero stock for 3 months";

const SKU_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Errors from stock operations.
#[derive(Debug, Error)]
pub enum StockError {
    #[error("item not found")]
    ItemNotFound,

    #[error("storage location not found")]
    LocationNotFound,

    #[error("{0}")]
    Invalid(String),

    #[error("not enough stock at source")]
    InsufficientStock,

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for StockError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

impl From<sqlx::Error> for StockError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// An initial stock entry for a new item.
#[derive(Debug, Clone, Copy)]
pub struct InitialStock {
    pub location_id: StorageLocationId,
    pub quantity: i32,
}

/// Stock service.
pub struct StockService<'a> {
    pool: &'a PgPool,
}

impl<'a> StockService<'a> {
    /// Create a new stock service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an item, generating its SKU when none is given.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Invalid` if the name is empty or the initial quantity is negative.
    /// Returns `StockError::Conflict` if an item with the same name or SKU exists.
    /// Returns `StockError::Repository` if a query fails.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_item(
        &self,
        input: &ItemInput,
        initial: Option<InitialStock>,
        actor: UserId,
    ) -> Result<InventoryItemId, StockError> {
        if input.name.trim().is_empty() {
            return Err(StockError::Invalid("Item name is required".to_owned()));
        }
        if initial.is_some_and(|s| s.quantity < 0) {
            return Err(StockError::Invalid("Initial quantity cannot be negative".to_owned()));
        }

        let given_sku = input.sku.as_deref().map(str::trim).filter(|s| !s.is_empty());
        if InventoryRepository::new(self.pool)
            .duplicate_exists(&input.name, given_sku, None)
            .await?
        {
            return Err(StockError::Conflict(
                "An item with this name or SKU already exists".to_owned(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let sku = match given_sku {
            Some(sku) => sku.to_owned(),
            None => {
                let prefix = match input.category_id {
                    Some(category) => inventory::category_prefix(&mut tx, category).await?,
                    None => None,
                };
                generate_sku(&mut rand::rng(), prefix.as_deref())
            }
        };

        let id = inventory::insert_item(&mut tx, input, &sku).await?;

        if let Some(stock) = initial.filter(|s| s.quantity > 0) {
            inventory::add_location_stock(&mut tx, id, stock.location_id, stock.quantity).await?;
            inventory::sync_quantity(&mut tx, id, stock.quantity).await?;
            inventory::insert_transaction(
                &mut tx,
                &NewTransaction {
                    reason: Some("Initial stock".to_owned()),
                    location_id: Some(stock.location_id),
                    cost_price: input.cost_price,
                    ..NewTransaction::new(id, TransactionType::In, stock.quantity, Some(actor))
                },
            )
            .await?;
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Item created",
            "inventory_item",
            Some(id.as_uuid()),
            json!({ "name": input.name, "sku": sku }),
        )
        .await?;

        tx.commit().await?;

        info!(item_id = %id, sku = %sku, "Inventory item created");
        self.check_alerts(id).await;
        Ok(id)
    }

    /// Apply a manual adjustment. Returns the item's new quantity.
    ///
    /// A `set` that changes nothing writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Invalid` for a bad amount.
    /// Returns `StockError::ItemNotFound` if the item doesn't exist.
    /// Returns `StockError::InsufficientStock` if a location would go negative.
    /// Returns `StockError::Repository` if a query fails.
    #[instrument(skip(self, adjustment), fields(item_id = %adjustment.item_id))]
    pub async fn adjust(
        &self,
        adjustment: &StockAdjustment,
        actor: UserId,
    ) -> Result<i32, StockError> {
        validate_adjustment(adjustment)?;
        let id = adjustment.item_id;

        let mut tx = self.pool.begin().await?;

        let item = inventory::lock_item(&mut tx, id)
            .await?
            .ok_or(StockError::ItemNotFound)?;

        let current = match adjustment.location_id {
            Some(location) => inventory::location_stock(&mut tx, id, location).await?,
            None => item.quantity,
        };
        let net = adjustment.kind.net_change(adjustment.amount, current);
        if adjustment.kind == AdjustKind::Set && net == 0 {
            return Ok(item.quantity);
        }

        if let Some(location) = adjustment.location_id {
            if current + net < 0 {
                return Err(StockError::InsufficientStock);
            }
            inventory::add_location_stock(&mut tx, id, location, net).await?;
        }

        let quantity = inventory::sync_quantity(&mut tx, id, net).await?;

        if let Some(cost_price) = adjustment.cost_price {
            inventory::set_cost_price(&mut tx, id, cost_price).await?;
        }

        let kind = if net >= 0 {
            TransactionType::In
        } else {
            TransactionType::Out
        };
        inventory::insert_transaction(
            &mut tx,
            &NewTransaction {
                reason: Some(adjustment_reason(adjustment.kind, &adjustment.reason)),
                location_id: adjustment.location_id,
                cost_price: adjustment.cost_price.or(item.cost_price),
                ..NewTransaction::new(id, kind, net, Some(actor))
            },
        )
        .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Stock adjusted",
            "inventory_item",
            Some(id.as_uuid()),
            json!({
                "name": item.name,
                "change": net,
                "quantity": quantity,
                "reason": adjustment.reason,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(change = net, quantity, "Stock adjusted");
        self.check_alerts(id).await;
        Ok(quantity)
    }

    /// Move stock between two locations.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Invalid` for a non-positive amount or identical locations.
    /// Returns `StockError::ItemNotFound` or `StockError::LocationNotFound`.
    /// Returns `StockError::InsufficientStock` if the source holds too little.
    /// Returns `StockError::Repository` if a query fails.
    #[instrument(skip(self, transfer), fields(item_id = %transfer.item_id))]
    pub async fn transfer(&self, transfer: &StockTransfer, actor: UserId) -> Result<(), StockError> {
        if transfer.amount <= 0 {
            return Err(StockError::Invalid("Amount must be positive".to_owned()));
        }
        if transfer.from_location_id == transfer.to_location_id {
            return Err(StockError::Invalid(
                "Source and destination must differ".to_owned(),
            ));
        }

        let locations = LocationRepository::new(self.pool);
        let from = locations
            .get(transfer.from_location_id)
            .await?
            .ok_or(StockError::LocationNotFound)?;
        let to = locations
            .get(transfer.to_location_id)
            .await?
            .ok_or(StockError::LocationNotFound)?;

        let id = transfer.item_id;
        let mut tx = self.pool.begin().await?;

        let item = inventory::lock_item(&mut tx, id)
            .await?
            .ok_or(StockError::ItemNotFound)?;

        let available = inventory::location_stock(&mut tx, id, from.id).await?;
        if available < transfer.amount {
            return Err(StockError::InsufficientStock);
        }

        let reason = transfer_reason(&from.name, &to.name, &transfer.reason);
        move_stock(&mut tx, id, from.id, to.id, transfer.amount, &reason, actor).await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Stock transferred",
            "inventory_item",
            Some(id.as_uuid()),
            json!({
                "name": item.name,
                "from": from.name,
                "to": to.name,
                "quantity": transfer.amount,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(from = %from.name, to = %to.name, quantity = transfer.amount, "Stock transferred");
        Ok(())
    }

    /// Move every stock row of each item to one location. Returns the number of rows moved.
    ///
    /// # Errors
    ///
    /// Returns `StockError::LocationNotFound` if the target doesn't exist.
    /// Returns `StockError::Repository` if a query fails.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_move(
        &self,
        ids: &[InventoryItemId],
        to_location: StorageLocationId,
        reason: &str,
        actor: UserId,
    ) -> Result<u64, StockError> {
        let locations = LocationRepository::new(self.pool).list().await?;
        let name_of = |id: StorageLocationId| {
            locations
                .iter()
                .find(|l| l.id == id)
                .map_or_else(|| id.to_string(), |l| l.name.clone())
        };
        if !locations.iter().any(|l| l.id == to_location) {
            return Err(StockError::LocationNotFound);
        }
        let to_name = name_of(to_location);

        let mut tx = self.pool.begin().await?;
        let mut moved = 0_u64;

        for &id in ids {
            if inventory::lock_item(&mut tx, id).await?.is_none() {
                continue;
            }
            for (from, quantity) in inventory::item_stock_rows(&mut tx, id).await? {
                if from == to_location {
                    continue;
                }
                let reason = transfer_reason(&name_of(from), &to_name, reason);
                move_stock(&mut tx, id, from, to_location, quantity, &reason, actor).await?;
                moved += 1;
            }
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Items moved",
            "inventory_item",
            None,
            json!({ "items": ids.len(), "moved": moved, "to": to_name, "reason": reason }),
        )
        .await?;

        tx.commit().await?;
        Ok(moved)
    }

    /// Archive items that have had zero stock for [`STALE_MONTHS`] months.
    ///
    /// # Errors
    ///
    /// Returns `StockError::Repository` if a query fails.
    #[instrument(skip(self))]
    pub async fn auto_archive_stale(&self) -> Result<u64, StockError> {
        let repo = InventoryRepository::new(self.pool);
        let stale = repo.stale_ids(STALE_MONTHS).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let archived = repo.archive(&stale, AUTO_ARCHIVE_REASON, None).await?;
        info!(archived, "Stale items archived");
        Ok(archived)
    }

    async fn check_alerts(&self, id: InventoryItemId) {
        if let Err(e) = NotificationService::new(self.pool)
            .check_item_stock_alerts(id)
            .await
        {
            warn!(item_id = %id, error = %e, "Stock alert check failed");
        }
    }
}

/// Decrement `from`, increment `to` and record both the transfer and the ledger entry.
async fn move_stock(
    conn: &mut sqlx::PgConnection,
    id: InventoryItemId,
    from: StorageLocationId,
    to: StorageLocationId,
    quantity: i32,
    reason: &str,
    actor: UserId,
) -> Result<(), RepositoryError> {
    inventory::add_location_stock(conn, id, from, -quantity).await?;
    inventory::add_location_stock(conn, id, to, quantity).await?;
    inventory::insert_transfer(conn, id, from, to, quantity, reason, actor).await?;
    inventory::insert_transaction(
        conn,
        &NewTransaction {
            reason: Some(reason.to_owned()),
            location_id: Some(to),
            from_location_id: Some(from),
            ..NewTransaction::new(id, TransactionType::Transfer, quantity, Some(actor))
        },
    )
    .await?;
    Ok(())
}

fn validate_adjustment(adjustment: &StockAdjustment) -> Result<(), StockError> {
    match adjustment.kind {
        AdjustKind::Set if adjustment.amount < 0 => Err(StockError::Invalid(
            "Quantity cannot be negative".to_owned(),
        )),
        AdjustKind::In | AdjustKind::Out if adjustment.amount <= 0 => Err(StockError::Invalid(
            "Amount must be positive".to_owned(),
        )),
        _ => Ok(()),
    }
}

/// Ledger reason for an adjustment; corrections are labelled as such.
#[must_use]
pub fn adjustment_reason(kind: AdjustKind, reason: &str) -> String {
    match kind {
        AdjustKind::Set => format!("Stock correction: {reason}"),
        AdjustKind::In | AdjustKind::Out => reason.to_owned(),
    }
}

/// Ledger reason for a move between two named locations.
#[must_use]
pub fn transfer_reason(from: &str, to: &str, reason: &str) -> String {
    format!("Transfer from «{from}» to «{to}». Reason: {reason}")
}

/// `{PREFIX}-{6 random upper alphanumerics}`, with [`DEFAULT_SKU_PREFIX`] when
/// the prefix is missing or blank.
pub fn generate_sku(rng: &mut impl Rng, prefix: Option<&str>) -> String {
    let prefix = prefix
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map_or_else(|| DEFAULT_SKU_PREFIX.to_owned(), str::to_uppercase);
    let suffix: String = (0..SKU_SUFFIX_LEN)
        .map(|_| char::from(SKU_ALPHABET[rng.random_range(0..SKU_ALPHABET.len())]))
        .collect();
    format!("{prefix}-{suffix}")
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_generate_sku_uses_category_prefix() {
        let mut rng = StdRng::seed_from_u64(7);
        let sku = generate_sku(&mut rng, Some("tsh"));

        let (prefix, suffix) = sku.split_once('-').unwrap_or_default();
        assert_eq!(prefix, "TSH");
        assert_eq!(suffix.len(), SKU_SUFFIX_LEN);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_generate_sku_falls_back_to_default_prefix() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(generate_sku(&mut rng, None).starts_with("ITM-"));
        assert!(generate_sku(&mut rng, Some("  ")).starts_with("ITM-"));
    }

    #[test]
    fn test_adjustment_reason() {
        assert_eq!(
            adjustment_reason(AdjustKind::Set, "inventory count"),
            "Stock correction: inventory count"
        );
        assert_eq!(adjustment_reason(AdjustKind::In, "delivery"), "delivery");
    }

    #[test]
    fn test_transfer_reason() {
        assert_eq!(
            transfer_reason("Main", "Print shop", "job 12"),
            "Transfer from «Main» to «Print shop». Reason: job 12"
        );
    }

    #[test]
    fn test_validate_adjustment() {
        let adjustment = |kind, amount| StockAdjustment {
            item_id: InventoryItemId::generate(),
            amount,
            kind,
            reason: String::new(),
            location_id: None,
            cost_price: None,
        };

        assert!(validate_adjustment(&adjustment(AdjustKind::Set, 0)).is_ok());
        assert!(validate_adjustment(&adjustment(AdjustKind::Set, -1)).is_err());
        assert!(validate_adjustment(&adjustment(AdjustKind::In, 0)).is_err());
        assert!(validate_adjustment(&adjustment(AdjustKind::Out, 3)).is_ok());
    }
}

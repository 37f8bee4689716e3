//! Production board and defect reporting.

use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};

use merch_crm_core::{OrderItemId, ProductionStage, StageStatus, TransactionType, UserId};

use crate::db::inventory::{self, NewTransaction};
use crate::db::production;
use crate::db::{ProductionRepository, RepositoryError, audit};
use crate::models::{ProductionItem, ProductionStats};
use crate::services::notifications::NotificationService;

/// Errors from production operations.
#[derive(Debug, Error)]
pub enum ProductionError {
    #[error("position not found")]
    ItemNotFound,

    #[error("position not linked to warehouse item")]
    NotLinked,

    #[error("quantity must be positive")]
    InvalidQuantity,

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ProductionError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::ItemNotFound,
            other => Self::Repository(other),
        }
    }
}

impl From<sqlx::Error> for ProductionError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Production service.
pub struct ProductionService<'a> {
    pool: &'a PgPool,
    repo: ProductionRepository<'a>,
}

impl<'a> ProductionService<'a> {
    /// Create a new production service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            repo: ProductionRepository::new(pool),
        }
    }

    /// Items on the board and the counters above it.
    ///
    /// # Errors
    ///
    /// Returns `ProductionError::Repository` if a query fails.
    pub async fn board(&self) -> Result<(Vec<ProductionItem>, ProductionStats), ProductionError> {
        let items = self.repo.items().await?;
        let stats = self.repo.stats(&items).await?;
        Ok((items, stats))
    }

    /// Set the status of one stage of one item.
    ///
    /// # Errors
    ///
    /// Returns `ProductionError::ItemNotFound` if the item doesn't exist.
    /// Returns `ProductionError::Repository` if the update fails.
    pub async fn update_stage(
        &self,
        item_id: OrderItemId,
        stage: ProductionStage,
        status: StageStatus,
        actor: UserId,
    ) -> Result<(), ProductionError> {
        self.repo.update_stage(item_id, stage, status, actor).await?;
        Ok(())
    }

    /// Write off spoiled units of an item's linked stock.
    ///
    /// Returns the remaining stock of the warehouse item.
    ///
    /// # Errors
    ///
    /// Returns `ProductionError::InvalidQuantity` if `quantity` is not positive.
    /// Returns `ProductionError::ItemNotFound` if the order item doesn't exist.
    /// Returns `ProductionError::NotLinked` if it has no warehouse item.
    /// Returns `ProductionError::Repository` if a query fails.
    #[instrument(skip(self, reason))]
    pub async fn report_defect(
        &self,
        item_id: OrderItemId,
        quantity: i32,
        reason: &str,
        actor: UserId,
    ) -> Result<i32, ProductionError> {
        if quantity <= 0 {
            return Err(ProductionError::InvalidQuantity);
        }

        let mut tx = self.pool.begin().await?;

        let target = production::defect_target(&mut tx, item_id)
            .await?
            .ok_or(ProductionError::ItemNotFound)?;
        let inventory_id = target.inventory_id.ok_or(ProductionError::NotLinked)?;
        let item = inventory::lock_item(&mut tx, inventory_id)
            .await?
            .ok_or(ProductionError::NotLinked)?;

        let remaining = inventory::write_off(&mut tx, inventory_id, quantity).await?;

        inventory::insert_transaction(
            &mut tx,
            &NewTransaction {
                reason: Some(format!(
                    "Defect (production): order #{}. Reason: {reason}",
                    target.order_number
                )),
                cost_price: item.cost_price,
                ..NewTransaction::new(inventory_id, TransactionType::Out, -quantity, Some(actor))
            },
        )
        .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Defect recorded",
            "order",
            Some(target.order_id.as_uuid()),
            json!({
                "order_number": target.order_number,
                "item": item.name,
                "quantity": quantity,
                "reason": reason,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(order = %target.order_number, quantity, remaining, "Defect recorded");

        if let Err(e) = NotificationService::new(self.pool)
            .check_item_stock_alerts(inventory_id)
            .await
        {
            warn!(item_id = %inventory_id, error = %e, "Stock alert check failed");
        }

        Ok(remaining)
    }
}

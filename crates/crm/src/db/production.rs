//! Production board queries and per-item stage updates.

use serde_json::json;
use sqlx::{PgConnection, PgPool};

use merch_crm_core::{
    InventoryItemId, OrderId, OrderItemId, ProductionStage, StageStatus, UserId,
};

use super::{RepositoryError, audit, orders::STATUS_CHANGED};
use crate::models::{ProductionItem, ProductionStats, StageCounts};

/// Repository for the production board.
pub struct ProductionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductionRepository<'a> {
    /// Create a new production repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every item of every active order in production: urgent first, then
    /// high priority, then by deadline.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self) -> Result<Vec<ProductionItem>, RepositoryError> {
        let items = sqlx::query_as::<_, ProductionItem>(
            r"
            SELECT oi.id, o.id AS order_id, o.order_number, c.name AS client_name, o.priority,
                   o.is_urgent, o.deadline, oi.description, oi.quantity, oi.inventory_id,
                   oi.stage_prep_status, oi.stage_print_status, oi.stage_application_status,
                   oi.stage_packaging_status,
                   (SELECT COUNT(*) FROM crm.order_attachments a WHERE a.order_id = o.id)
                       AS attachment_count
            FROM crm.order_items oi
            JOIN crm.orders o ON o.id = oi.order_id
            JOIN crm.clients c ON c.id = o.client_id
            WHERE o.status = 'production' AND NOT o.is_archived
            ORDER BY o.is_urgent DESC,
                     (o.priority = 'high') DESC,
                     o.deadline ASC NULLS LAST,
                     o.created_at,
                     oi.created_at
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Board counters, with stage tallies over `items`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn stats(&self, items: &[ProductionItem]) -> Result<ProductionStats, RepositoryError> {
        let (active, urgent) = sqlx::query_as::<_, (i64, i64)>(
            r"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE is_urgent OR priority = 'high')
            FROM crm.orders
            WHERE status = 'production' AND NOT is_archived
            ",
        )
        .fetch_one(self.pool)
        .await?;

        let completed_today = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(DISTINCT entity_id) FROM crm.audit_logs
            WHERE action = $1
              AND entity_type = 'order'
              AND details->>'to' = 'done'
              AND created_at >= date_trunc('day', NOW())
            ",
        )
        .bind(STATUS_CHANGED)
        .fetch_one(self.pool)
        .await?;

        let stages = ProductionStage::ALL
            .iter()
            .map(|&stage| StageCounts::tally(stage, items))
            .collect();

        Ok(ProductionStats {
            active,
            urgent,
            completed_today,
            stages,
        })
    }

    /// Set one stage of one item.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist.
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn update_stage(
        &self,
        item_id: OrderItemId,
        stage: ProductionStage,
        status: StageStatus,
        actor: UserId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The column comes from a closed enum, never from input.
        let order_number = sqlx::query_scalar::<_, String>(&format!(
            r"
            UPDATE crm.order_items oi
            SET {column} = $2
            FROM crm.orders o
            WHERE oi.id = $1 AND o.id = oi.order_id
            RETURNING o.order_number
            ",
            column = stage.column()
        ))
        .bind(item_id)
        .bind(status)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        audit::record(
            &mut tx,
            Some(actor),
            "Production stage updated",
            "order_item",
            Some(item_id.as_uuid()),
            json!({ "order_number": order_number, "stage": stage, "status": status }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// An order line about to have a defect recorded against it.
#[derive(Debug, sqlx::FromRow)]
pub struct DefectTarget {
    pub order_id: OrderId,
    pub order_number: String,
    pub inventory_id: Option<InventoryItemId>,
}

/// Load an order line with its order number.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn defect_target(
    conn: &mut PgConnection,
    item_id: OrderItemId,
) -> Result<Option<DefectTarget>, RepositoryError> {
    let target = sqlx::query_as::<_, DefectTarget>(
        r"
        SELECT o.id AS order_id, o.order_number, oi.inventory_id
        FROM crm.order_items oi
        JOIN crm.orders o ON o.id = oi.order_id
        WHERE oi.id = $1
        ",
    )
    .bind(item_id)
    .fetch_optional(conn)
    .await?;

    Ok(target)
}

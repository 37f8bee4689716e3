//! Production floor view of order items.

use chrono::{DateTime, Utc};
use serde::Serialize;

use merch_crm_core::{
    InventoryItemId, OrderId, OrderItemId, Priority, ProductionStage, StageStatus,
};

/// An order item in production, flattened with its order's context.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductionItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub order_number: String,
    pub client_name: String,
    pub priority: Priority,
    pub is_urgent: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub description: String,
    pub quantity: i32,
    pub inventory_id: Option<InventoryItemId>,
    pub stage_prep_status: StageStatus,
    pub stage_print_status: StageStatus,
    pub stage_application_status: StageStatus,
    pub stage_packaging_status: StageStatus,
    pub attachment_count: i64,
}

impl ProductionItem {
    /// Status of one stage.
    #[must_use]
    pub const fn stage_status(&self, stage: ProductionStage) -> StageStatus {
        match stage {
            ProductionStage::Prep => self.stage_prep_status,
            ProductionStage::Print => self.stage_print_status,
            ProductionStage::Application => self.stage_application_status,
            ProductionStage::Packaging => self.stage_packaging_status,
        }
    }
}

/// Count of items per status for one stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageCounts {
    pub stage: Option<ProductionStage>,
    pub pending: i64,
    pub in_progress: i64,
    pub done: i64,
    pub failed: i64,
}

impl StageCounts {
    /// Tally `items` for `stage`.
    #[must_use]
    pub fn tally(stage: ProductionStage, items: &[ProductionItem]) -> Self {
        let mut counts = Self {
            stage: Some(stage),
            ..Self::default()
        };
        for item in items {
            match item.stage_status(stage) {
                StageStatus::Pending => counts.pending += 1,
                StageStatus::InProgress => counts.in_progress += 1,
                StageStatus::Done => counts.done += 1,
                StageStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Production board counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductionStats {
    pub active: i64,
    pub urgent: i64,
    pub completed_today: i64,
    pub stages: Vec<StageCounts>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(prep: StageStatus, print: StageStatus) -> ProductionItem {
        ProductionItem {
            id: OrderItemId::generate(),
            order_id: OrderId::generate(),
            order_number: "ORD-26-1000".to_owned(),
            client_name: "Client".to_owned(),
            priority: Priority::Normal,
            is_urgent: false,
            deadline: None,
            description: "Hoodie".to_owned(),
            quantity: 5,
            inventory_id: None,
            stage_prep_status: prep,
            stage_print_status: print,
            stage_application_status: StageStatus::Pending,
            stage_packaging_status: StageStatus::Pending,
            attachment_count: 0,
        }
    }

    #[test]
    fn test_tally_counts_each_status() {
        let items = vec![
            item(StageStatus::Done, StageStatus::InProgress),
            item(StageStatus::Done, StageStatus::Failed),
            item(StageStatus::Pending, StageStatus::Pending),
        ];

        let prep = StageCounts::tally(ProductionStage::Prep, &items);
        assert_eq!((prep.pending, prep.done), (1, 2));

        let print = StageCounts::tally(ProductionStage::Print, &items);
        assert_eq!(
            (print.pending, print.in_progress, print.failed, print.done),
            (1, 1, 1, 0)
        );
    }
}

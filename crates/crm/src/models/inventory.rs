//! Warehouse domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merch_crm_core::{
    CategoryId, InventoryItemId, InventoryItemType, MeasurementUnit, StorageLocationId,
    StorageLocationType, TransactionId, TransactionType, UserId,
};

/// A warehouse item with its category.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub name: String,
    pub sku: Option<String>,
    pub category_id: Option<CategoryId>,
    pub category_name: Option<String>,
    pub item_type: InventoryItemType,
    pub quantity: i32,
    pub reserved_quantity: i32,
    pub unit: MeasurementUnit,
    pub low_stock_threshold: i32,
    pub critical_stock_threshold: i32,
    pub description: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_reason: Option<String>,
    pub zero_stock_since: Option<DateTime<Utc>>,
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Quantity not held by any order.
    #[must_use]
    pub const fn available(&self) -> i32 {
        self.quantity - self.reserved_quantity
    }

    /// Stock level classification for badges and alerts.
    #[must_use]
    pub const fn stock_level(&self) -> StockLevel {
        StockLevel::classify(
            self.quantity,
            self.low_stock_threshold,
            self.critical_stock_threshold,
        )
    }
}

/// How worrying an item's stock is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    Ok,
    Low,
    Critical,
}

impl StockLevel {
    /// Critical at or below `critical`, low at or below `low`.
    #[must_use]
    pub const fn classify(quantity: i32, low: i32, critical: i32) -> Self {
        if quantity <= critical {
            Self::Critical
        } else if quantity <= low {
            Self::Low
        } else {
            Self::Ok
        }
    }

    /// CSS-friendly name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Low => "low",
            Self::Critical => "critical",
        }
    }
}

/// Stock of one item at one location.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ItemStock {
    pub storage_location_id: StorageLocationId,
    pub location_name: String,
    pub quantity: i32,
}

/// A stock ledger entry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InventoryTransaction {
    pub id: TransactionId,
    pub item_id: InventoryItemId,
    pub item_name: String,
    pub change_amount: i32,
    #[sqlx(rename = "type")]
    pub kind: TransactionType,
    pub reason: Option<String>,
    pub location_name: Option<String>,
    pub from_location_name: Option<String>,
    pub cost_price: Option<Decimal>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Item card data.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDetails {
    pub item: InventoryItem,
    pub stocks: Vec<ItemStock>,
    pub history: Vec<InventoryTransaction>,
}

/// Filters for the item list.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub search: Option<String>,
    pub category_id: Option<CategoryId>,
    pub archived: bool,
    pub low_stock_only: bool,
    pub page: u32,
}

/// Validated item fields for create and update.
#[derive(Debug, Clone)]
pub struct ItemInput {
    pub name: String,
    pub sku: Option<String>,
    pub category_id: Option<CategoryId>,
    pub item_type: InventoryItemType,
    pub unit: MeasurementUnit,
    pub low_stock_threshold: i32,
    pub critical_stock_threshold: i32,
    pub description: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub attributes: serde_json::Value,
}

/// Direction of a manual stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustKind {
    In,
    Out,
    Set,
}

impl AdjustKind {
    /// Signed change given the current quantity.
    #[must_use]
    pub const fn net_change(self, amount: i32, current: i32) -> i32 {
        match self {
            Self::In => amount,
            Self::Out => -amount,
            Self::Set => amount - current,
        }
    }
}

impl std::str::FromStr for AdjustKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            "set" => Ok(Self::Set),
            other => Err(format!("invalid adjustment type: {other}")),
        }
    }
}

/// A manual stock adjustment request.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub item_id: InventoryItemId,
    pub amount: i32,
    pub kind: AdjustKind,
    pub reason: String,
    pub location_id: Option<StorageLocationId>,
    pub cost_price: Option<Decimal>,
}

/// A move between locations.
#[derive(Debug, Clone)]
pub struct StockTransfer {
    pub item_id: InventoryItemId,
    pub from_location_id: StorageLocationId,
    pub to_location_id: StorageLocationId,
    pub amount: i32,
    pub reason: String,
}

/// A category with usage counts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub prefix: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i32,
    pub is_active: bool,
    pub is_system: bool,
    pub default_unit: MeasurementUnit,
    pub item_count: i64,
    pub total_quantity: i64,
}

/// Validated category fields.
#[derive(Debug, Clone)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub prefix: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub default_unit: MeasurementUnit,
    pub is_active: bool,
}

/// A storage location with usage counts.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StorageLocation {
    pub id: StorageLocationId,
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub responsible_user_id: Option<UserId>,
    pub responsible_user_name: Option<String>,
    #[sqlx(rename = "type")]
    pub kind: StorageLocationType,
    pub is_system: bool,
    pub is_default: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub item_count: i64,
    pub total_quantity: i64,
}

/// Validated storage location fields.
#[derive(Debug, Clone)]
pub struct LocationInput {
    pub name: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub responsible_user_id: Option<UserId>,
    pub kind: StorageLocationType,
    pub is_default: bool,
    pub is_active: bool,
}

/// An item at or below its low-stock threshold.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CriticalItem {
    pub id: InventoryItemId,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub unit: MeasurementUnit,
}

/// Movement counts for the last 30 days.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct WarehouseActivity {
    pub ins: i64,
    pub usage: i64,
    pub waste: i64,
    pub transfers: i64,
}

/// Warehouse overview counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarehouseStats {
    pub total_quantity: i64,
    pub total_reserved: i64,
    pub archived_count: i64,
    pub critical_items: Vec<CriticalItem>,
    pub activity: WarehouseActivity,
}

/// Build the "Root / Child / Leaf" path of a category.
///
/// `parents` yields `(id, parent_id, name)`; cycles stop the walk.
#[must_use]
pub fn category_path(id: CategoryId, categories: &[(CategoryId, Option<CategoryId>, String)]) -> String {
    let mut names = Vec::new();
    let mut seen = Vec::new();
    let mut current = Some(id);

    while let Some(cid) = current {
        if seen.contains(&cid) {
            break;
        }
        seen.push(cid);
        let Some((_, parent, name)) = categories.iter().find(|(c, _, _)| *c == cid) else {
            break;
        };
        names.push(name.as_str());
        current = *parent;
    }

    names.reverse();
    names.join(" / ")
}

/// Whether `candidate_parent` is `id` itself or one of its descendants.
#[must_use]
pub fn creates_category_cycle(
    id: CategoryId,
    candidate_parent: CategoryId,
    categories: &[(CategoryId, Option<CategoryId>, String)],
) -> bool {
    let mut current = Some(candidate_parent);
    let mut steps = 0;
    while let Some(cid) = current {
        if cid == id {
            return true;
        }
        steps += 1;
        if steps > categories.len() {
            return true;
        }
        current = categories
            .iter()
            .find(|(c, _, _)| *c == cid)
            .and_then(|(_, parent, _)| *parent);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_level() {
        assert_eq!(StockLevel::classify(0, 10, 0), StockLevel::Critical);
        assert_eq!(StockLevel::classify(3, 10, 3), StockLevel::Critical);
        assert_eq!(StockLevel::classify(10, 10, 0), StockLevel::Low);
        assert_eq!(StockLevel::classify(11, 10, 0), StockLevel::Ok);
    }

    #[test]
    fn test_adjust_net_change() {
        assert_eq!(AdjustKind::In.net_change(5, 10), 5);
        assert_eq!(AdjustKind::Out.net_change(5, 10), -5);
        assert_eq!(AdjustKind::Set.net_change(4, 10), -6);
        assert_eq!(AdjustKind::Set.net_change(10, 10), 0);
    }

    fn tree() -> (CategoryId, CategoryId, CategoryId, Vec<(CategoryId, Option<CategoryId>, String)>) {
        let root = CategoryId::generate();
        let child = CategoryId::generate();
        let leaf = CategoryId::generate();
        let all = vec![
            (root, None, "Clothing".to_owned()),
            (child, Some(root), "T-shirts".to_owned()),
            (leaf, Some(child), "Oversize".to_owned()),
        ];
        (root, child, leaf, all)
    }

    #[test]
    fn test_category_path() {
        let (root, _, leaf, all) = tree();
        assert_eq!(category_path(leaf, &all), "Clothing / T-shirts / Oversize");
        assert_eq!(category_path(root, &all), "Clothing");
        assert_eq!(category_path(CategoryId::generate(), &all), "");
    }

    #[test]
    fn test_creates_category_cycle() {
        let (root, child, leaf, all) = tree();
        assert!(creates_category_cycle(root, root, &all));
        assert!(creates_category_cycle(root, leaf, &all));
        assert!(!creates_category_cycle(leaf, root, &all));
        assert!(!creates_category_cycle(child, root, &all));
    }
}

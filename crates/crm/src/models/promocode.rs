//! Promocode types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merch_crm_core::{DiscountType, InventoryItemId, PromocodeId};

/// Product and category restrictions stored as JSON on the promocode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromoConstraints {
    pub included_products: Vec<InventoryItemId>,
    pub excluded_products: Vec<InventoryItemId>,
    pub excluded_categories: Vec<String>,
}

impl PromoConstraints {
    /// Whether this cart line may be discounted.
    #[must_use]
    pub fn applies_to(&self, item: &CartItem) -> bool {
        if let Some(id) = item.inventory_id
            && !self.included_products.is_empty()
            && !self.included_products.contains(&id)
        {
            return false;
        }
        if let Some(id) = item.inventory_id
            && self.excluded_products.contains(&id)
        {
            return false;
        }
        if let Some(category) = item.category.as_deref()
            && self.excluded_categories.iter().any(|c| c == category)
        {
            return false;
        }
        true
    }

    /// Comma-separated form values for the edit form.
    #[must_use]
    pub fn included_text(&self) -> String {
        join_ids(&self.included_products)
    }

    #[must_use]
    pub fn excluded_text(&self) -> String {
        join_ids(&self.excluded_products)
    }

    #[must_use]
    pub fn categories_text(&self) -> String {
        self.excluded_categories.join(", ")
    }
}

fn join_ids(ids: &[InventoryItemId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A promocode row.
#[derive(Debug, Clone, Serialize)]
pub struct Promocode {
    pub id: PromocodeId,
    pub name: Option<String>,
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_amount: Decimal,
    pub max_discount_amount: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub is_active: bool,
    pub admin_comment: Option<String>,
    pub constraints: PromoConstraints,
    pub created_at: DateTime<Utc>,
}

/// A promocode with how much it has saved customers so far.
#[derive(Debug, Clone, Serialize)]
pub struct PromocodeListRow {
    pub promocode: Promocode,
    pub total_saved: Decimal,
}

/// Validated promocode fields.
#[derive(Debug, Clone)]
pub struct PromocodeInput {
    pub name: Option<String>,
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_amount: Decimal,
    pub max_discount_amount: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub is_active: bool,
    pub admin_comment: Option<String>,
    pub constraints: PromoConstraints,
}

/// A cart line submitted for promocode validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub inventory_id: Option<InventoryItemId>,
    pub category: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
}

impl CartItem {
    /// `price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Public summary of a promocode returned after validation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoSummary {
    pub id: PromocodeId,
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
}

/// Result of validating a promocode against a cart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoValidation {
    pub is_valid: bool,
    pub discount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo: Option<PromoSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PromoValidation {
    /// A rejection with a user-facing reason.
    #[must_use]
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            discount: Decimal::ZERO,
            error: Some(error.into()),
            promo: None,
            message: None,
        }
    }
}

/// Template for bulk generation.
#[derive(Debug, Clone)]
pub struct BulkPromocodes {
    pub count: u32,
    pub prefix: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_amount: Decimal,
    pub max_discount_amount: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: Option<InventoryItemId>, category: Option<&str>) -> CartItem {
        CartItem {
            inventory_id: id,
            category: category.map(str::to_owned),
            price: Decimal::ONE_HUNDRED,
            quantity: 1,
        }
    }

    #[test]
    fn test_constraints_deserialize_camel_case() {
        let json = r#"{"excludedCategories": ["Packaging"]}"#;
        let c: PromoConstraints = serde_json::from_str(json).unwrap();
        assert!(c.included_products.is_empty());
        assert_eq!(c.excluded_categories, vec!["Packaging".to_owned()]);
    }

    #[test]
    fn test_included_products_restrict_cart() {
        let allowed = InventoryItemId::generate();
        let c = PromoConstraints {
            included_products: vec![allowed],
            ..PromoConstraints::default()
        };
        assert!(c.applies_to(&line(Some(allowed), None)));
        assert!(!c.applies_to(&line(Some(InventoryItemId::generate()), None)));
        // Lines not linked to inventory can't be matched against the list.
        assert!(c.applies_to(&line(None, None)));
    }

    #[test]
    fn test_exclusions() {
        let banned = InventoryItemId::generate();
        let c = PromoConstraints {
            excluded_products: vec![banned],
            excluded_categories: vec!["Packaging".to_owned()],
            ..PromoConstraints::default()
        };
        assert!(!c.applies_to(&line(Some(banned), None)));
        assert!(!c.applies_to(&line(None, Some("Packaging"))));
        assert!(c.applies_to(&line(None, Some("packaging"))));
        assert!(c.applies_to(&line(Some(InventoryItemId::generate()), Some("Clothing"))));
    }
}

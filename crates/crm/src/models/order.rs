//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use merch_crm_core::{
    AttachmentId, ClientId, InventoryItemId, OrderCategory, OrderId, OrderItemId, OrderStatus,
    HIDDEN_CONTACT, PaymentId, PaymentMethod, Priority, PromocodeId, StageStatus, UserId,
};

/// An order header with client and creator names.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub client_id: ClientId,
    pub client_name: String,
    pub client_phone: String,
    pub client_email: Option<String>,
    pub status: OrderStatus,
    pub category: OrderCategory,
    pub total_amount: Decimal,
    pub advance_amount: Decimal,
    pub discount_amount: Decimal,
    pub priority: Priority,
    pub is_urgent: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub promocode_id: Option<PromocodeId>,
    pub promocode_code: Option<String>,
    pub created_by: Option<UserId>,
    pub creator_name: Option<String>,
    pub is_archived: bool,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Replace the client's phone and email with the hidden marker.
    pub fn hide_contacts(&mut self) {
        HIDDEN_CONTACT.clone_into(&mut self.client_phone);
        if self.client_email.is_some() {
            self.client_email = Some(HIDDEN_CONTACT.to_owned());
        }
    }

    /// Amount still to be paid, never negative.
    #[must_use]
    pub fn balance_due(&self, paid: Decimal) -> Decimal {
        (self.total_amount - paid).max(Decimal::ZERO)
    }
}

/// One line of an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub description: String,
    pub quantity: i32,
    pub price: Decimal,
    pub inventory_id: Option<InventoryItemId>,
    pub inventory_name: Option<String>,
    pub stage_prep_status: StageStatus,
    pub stage_print_status: StageStatus,
    pub stage_application_status: StageStatus,
    pub stage_packaging_status: StageStatus,
}

impl OrderItem {
    /// Line total.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A row of the order list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderListRow {
    pub id: OrderId,
    pub order_number: String,
    pub client_id: ClientId,
    pub client_name: String,
    pub client_phone: String,
    pub status: OrderStatus,
    pub category: OrderCategory,
    pub priority: Priority,
    pub is_urgent: bool,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub deadline: Option<DateTime<Utc>>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

impl OrderListRow {
    /// Replace the client's phone with the hidden marker.
    pub fn hide_contacts(&mut self) {
        HIDDEN_CONTACT.clone_into(&mut self.client_phone);
    }
}

/// A payment (or refund, when negative) against an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub is_advance: bool,
    pub comment: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A file attached to an order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: AttachmentId,
    pub order_id: OrderId,
    pub file_name: String,
    pub file_key: String,
    pub file_url: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Order card data.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
    pub attachments: Vec<Attachment>,
    pub paid_amount: Decimal,
}

/// Filters for the order list.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub status: Option<OrderStatus>,
    pub archived: bool,
    pub page: u32,
    pub limit: u32,
}

/// A page of orders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<OrderListRow>,
    pub total: i64,
    pub total_pages: i64,
}

/// Order counters for a period.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct OrderStats {
    pub total: i64,
    pub new: i64,
    pub in_production: i64,
    pub completed: i64,
    pub revenue: Decimal,
}

/// One line of a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrderItem {
    pub description: String,
    pub quantity: i32,
    pub price: Decimal,
    pub inventory_id: Option<InventoryItemId>,
}

/// Everything needed to create an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub client_id: ClientId,
    pub category: OrderCategory,
    pub priority: Priority,
    pub is_urgent: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub promocode: Option<String>,
    pub advance_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Sum of quantity x price over all lines.
    #[must_use]
    pub fn items_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|i| i.price * Decimal::from(i.quantity))
            .sum()
    }
}

/// Order fields that may be edited inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    IsUrgent,
    Priority,
    Deadline,
    Status,
}

impl std::str::FromStr for OrderField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "is_urgent" | "isUrgent" => Ok(Self::IsUrgent),
            "priority" => Ok(Self::Priority),
            "deadline" => Ok(Self::Deadline),
            "status" => Ok(Self::Status),
            other => Err(format!("field cannot be edited: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(qty: i32, price: &str) -> NewOrderItem {
        NewOrderItem {
            description: "T-shirt".to_owned(),
            quantity: qty,
            price: price.parse().unwrap(),
            inventory_id: None,
        }
    }

    #[test]
    fn test_items_total() {
        let order = NewOrder {
            client_id: ClientId::generate(),
            category: OrderCategory::Print,
            priority: Priority::Normal,
            is_urgent: false,
            deadline: None,
            promocode: None,
            advance_amount: Decimal::ZERO,
            payment_method: PaymentMethod::Cash,
            items: vec![item(10, "450.00"), item(2, "99.50")],
        };
        assert_eq!(order.items_total(), "4699.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_order_field_whitelist() {
        assert_eq!("isUrgent".parse::<OrderField>().unwrap(), OrderField::IsUrgent);
        assert_eq!("status".parse::<OrderField>().unwrap(), OrderField::Status);
        assert!("total_amount".parse::<OrderField>().is_err());
    }
}

//! Order intake and lifecycle.
//!
//! Creating an order, moving it through its statuses and deleting it all
//! touch warehouse reservations, so each runs as one transaction that
//! combines [`crate::db::orders`] and [`crate::db::inventory`] primitives
//! with its audit entry. Notifications go out after commit.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument, warn};

use merch_crm_core::{
    AttachmentId, InventoryItemId, NotificationType, OrderId, OrderStatus, PaymentMethod,
    Priority, StockEffect, TransactionType, UserId, next_order_number, order_number_prefix,
};

use crate::db::inventory::{self, NewTransaction};
use crate::db::orders::{self, NewAttachment, OrderHeader, STATUS_CHANGED};
use crate::db::promocodes;
use crate::db::{ClientRepository, NotificationRepository, OrderRepository, RepositoryError, audit};
use crate::models::{CurrentUser, NewOrder, OrderField};
use crate::services::notifications::NotificationService;
use crate::services::promocodes::order_discount;
use crate::services::storage::{LocalStorage, StorageError, sanitize_file_name};

/// Largest attachment accepted.
pub const MAX_ATTACHMENT_BYTES: usize = 20 * 1024 * 1024;

/// Payment comment for the advance taken at order creation.
const PREPAYMENT_COMMENT: &str = "Prepayment";

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("client not found")]
    ClientNotFound,

    #[error("{0}")]
    Invalid(String),

    #[error("not enough stock: {0}")]
    InsufficientStock(String),

    #[error("cannot change status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    UnknownField(String),

    #[error("only the creator or management can change this order")]
    Forbidden,

    #[error("file storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// A newly created order.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub id: OrderId,
    pub order_number: String,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
}

/// An uploaded file.
#[derive(Debug)]
pub struct Upload<'a> {
    pub file_name: &'a str,
    pub content_type: Option<&'a str>,
    pub bytes: &'a [u8],
}

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    orders: OrderRepository<'a>,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(pool),
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create an order, reserving linked stock and applying a promocode.
    ///
    /// A promocode that is unknown or not currently usable is ignored.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Invalid` for empty orders or bad lines.
    /// Returns `OrderError::ClientNotFound` if the client doesn't exist.
    /// Returns `OrderError::InsufficientStock` naming the first item that can't be reserved.
    /// Returns `OrderError::Repository` if a query fails.
    #[instrument(skip(self, input), fields(client_id = %input.client_id, items = input.items.len()))]
    pub async fn create_order(
        &self,
        input: &NewOrder,
        actor: UserId,
    ) -> Result<CreatedOrder, OrderError> {
        validate_new_order(input)?;

        let client = ClientRepository::new(self.pool)
            .get(input.client_id)
            .await?
            .ok_or(OrderError::ClientNotFound)?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let year = now.year();
        let latest = orders::lock_latest_number(&mut tx, &order_number_prefix(year)).await?;
        let order_number = next_order_number(year, latest.as_deref());

        let id = orders::insert_order(
            &mut tx,
            &OrderHeader {
                order_number: &order_number,
                client_id: input.client_id,
                category: input.category,
                priority: input.priority,
                is_urgent: input.is_urgent,
                deadline: input.deadline,
                advance_amount: input.advance_amount,
                created_by: actor,
            },
        )
        .await?;

        for item in &input.items {
            orders::insert_item(&mut tx, id, item).await?;
            if let Some(inventory_id) = item.inventory_id {
                reserve_or_fail(&mut tx, inventory_id, item.quantity).await?;
            }
        }

        let total = input.items_total();
        let mut discount = Decimal::ZERO;
        let mut promocode_id = None;
        if let Some(code) = input.promocode.as_deref().filter(|c| !c.trim().is_empty()) {
            let found = promocodes::find_by_code(&mut tx, code, true).await?;
            match found.and_then(|p| order_discount(&p, total, now).map(|d| (p.id, d))) {
                Some((promo_id, amount)) => {
                    promocodes::increment_usage(&mut tx, promo_id).await?;
                    discount = amount;
                    promocode_id = Some(promo_id);
                }
                None => info!(code, "Promocode not applied"),
            }
        }
        let total_amount = (total - discount).max(Decimal::ZERO);
        orders::set_totals(&mut tx, id, total_amount, discount, promocode_id).await?;

        if input.advance_amount > Decimal::ZERO {
            orders::insert_payment(
                &mut tx,
                id,
                input.advance_amount,
                input.payment_method,
                true,
                Some(PREPAYMENT_COMMENT),
                actor,
            )
            .await?;
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Order created",
            "order",
            Some(id.as_uuid()),
            json!({
                "order_number": order_number,
                "client": client.name,
                "total": total_amount,
                "discount": discount,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(order_id = %id, order_number = %order_number, "Order created");

        if let Err(e) = NotificationService::new(self.pool)
            .notify_staff(
                "New order",
                &format!("Order {order_number} for {}", client.name),
                NotificationType::Info,
            )
            .await
        {
            warn!(error = %e, "Failed to notify staff about new order");
        }

        Ok(CreatedOrder {
            id,
            order_number,
            total_amount,
            discount_amount: discount,
        })
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Move an order to `to`, applying the stock effect of the move.
    ///
    /// Moving to the current status does nothing.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order doesn't exist.
    /// Returns `OrderError::InvalidTransition` if the move isn't allowed.
    /// Returns `OrderError::InsufficientStock` if re-reserving a cancelled order fails.
    /// Returns `OrderError::Repository` if a query fails.
    #[instrument(skip(self, cancel_reason))]
    pub async fn update_status(
        &self,
        id: OrderId,
        to: OrderStatus,
        cancel_reason: Option<&str>,
        actor: UserId,
    ) -> Result<(), OrderError> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock_order(&mut tx, id)
            .await?
            .ok_or(OrderError::NotFound)?;
        let from = order.status;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(OrderError::InvalidTransition { from, to });
        }

        let lines = orders::linked_lines(&mut tx, id).await?;
        match from.stock_effect(to) {
            StockEffect::Deduct => {
                for &(item_id, quantity) in &lines {
                    ship_line(&mut tx, item_id, quantity, &order.order_number, actor).await?;
                }
            }
            StockEffect::Release => {
                for &(item_id, quantity) in &lines {
                    inventory::release_reservation(&mut tx, item_id, quantity).await?;
                }
            }
            StockEffect::Reserve => {
                for &(item_id, quantity) in &lines {
                    reserve_or_fail(&mut tx, item_id, quantity).await?;
                }
            }
            StockEffect::None => {}
        }

        let cancel_reason = cancel_reason.map(str::trim).filter(|r| !r.is_empty());
        orders::set_status(&mut tx, id, to, cancel_reason).await?;

        audit::record(
            &mut tx,
            Some(actor),
            STATUS_CHANGED,
            "order",
            Some(id.as_uuid()),
            json!({
                "order_number": order.order_number,
                "from": from,
                "to": to,
                "cancel_reason": cancel_reason,
            }),
        )
        .await?;

        tx.commit().await?;

        info!(order_number = %order.order_number, %from, %to, "Order status changed");

        if let Some(creator) = order.created_by.filter(|c| *c != actor) {
            let message = format!(
                "Order {}: {} → {}",
                order.order_number,
                from.label(),
                to.label()
            );
            if let Err(e) = NotificationRepository::new(self.pool)
                .notify(creator, "Order status changed", &message, NotificationType::Info)
                .await
            {
                warn!(error = %e, "Failed to notify order creator");
            }
        }

        if matches!(from.stock_effect(to), StockEffect::Deduct) {
            let alerts = NotificationService::new(self.pool);
            for (item_id, _) in lines {
                if let Err(e) = alerts.check_item_stock_alerts(item_id).await {
                    warn!(item_id = %item_id, error = %e, "Stock alert check failed");
                }
            }
        }

        Ok(())
    }

    /// Apply a status to several orders. Returns how many succeeded.
    pub async fn bulk_update_status(
        &self,
        ids: &[OrderId],
        to: OrderStatus,
        actor: UserId,
    ) -> usize {
        let mut updated = 0;
        for &id in ids {
            match self.update_status(id, to, None, actor).await {
                Ok(()) => updated += 1,
                Err(e) => warn!(order_id = %id, error = %e, "Bulk status change skipped order"),
            }
        }
        updated
    }

    // =========================================================================
    // Inline edits
    // =========================================================================

    /// Change one editable field from its form value.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::UnknownField` if the field can't be edited.
    /// Returns `OrderError::Forbidden` unless the actor created the order or is management.
    /// Returns `OrderError::Invalid` if the value doesn't parse.
    /// Returns `OrderError::NotFound` if the order doesn't exist.
    #[instrument(skip(self, actor), fields(user_id = %actor.id))]
    pub async fn update_field(
        &self,
        id: OrderId,
        field: &str,
        value: &str,
        actor: &CurrentUser,
    ) -> Result<(), OrderError> {
        let field: OrderField = field.parse().map_err(OrderError::UnknownField)?;

        let order = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;
        if order.created_by != Some(actor.id) && !actor.is_management() {
            return Err(OrderError::Forbidden);
        }

        if field == OrderField::Status {
            let status = value.parse().map_err(OrderError::Invalid)?;
            return self.update_status(id, status, None, actor.id).await;
        }

        let mut tx = self.pool.begin().await?;
        match field {
            OrderField::IsUrgent => {
                orders::set_urgent(&mut tx, id, parse_flag(value)?).await?;
            }
            OrderField::Priority => {
                let priority: Priority = value.parse().map_err(OrderError::Invalid)?;
                orders::set_priority(&mut tx, id, priority).await?;
            }
            OrderField::Deadline => {
                orders::set_deadline(&mut tx, id, parse_deadline(value)?).await?;
            }
            OrderField::Status => {}
        }

        audit::record(
            &mut tx,
            Some(actor.id),
            "Order updated",
            "order",
            Some(id.as_uuid()),
            json!({ "order_number": order.order_number, "field": format!("{field:?}"), "value": value }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Shortcut for a priority edit.
    ///
    /// # Errors
    ///
    /// See [`Self::update_field`].
    pub async fn update_priority(
        &self,
        id: OrderId,
        priority: Priority,
        actor: &CurrentUser,
    ) -> Result<(), OrderError> {
        self.update_field(id, "priority", priority.as_str(), actor)
            .await
    }

    // =========================================================================
    // Archive / delete
    // =========================================================================

    /// Archive or restore orders. Returns the number changed.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if a query fails.
    pub async fn set_archived(
        &self,
        ids: &[OrderId],
        archived: bool,
        actor: UserId,
    ) -> Result<u64, OrderError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::set_archived(&mut tx, ids, archived).await?;

        audit::record(
            &mut tx,
            Some(actor),
            if archived { "Orders archived" } else { "Orders restored" },
            "order",
            single_id(ids),
            json!({ "count": updated }),
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Delete orders, giving back stock they still hold. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if a query fails.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn delete(&self, ids: &[OrderId], actor: UserId) -> Result<u64, OrderError> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = Vec::with_capacity(ids.len());

        for &id in ids {
            let Some(order) = orders::lock_order(&mut tx, id).await? else {
                continue;
            };
            if order.status.holds_reservation() {
                for (item_id, quantity) in orders::linked_lines(&mut tx, id).await? {
                    inventory::release_reservation(&mut tx, item_id, quantity).await?;
                }
            }
            orders::delete(&mut tx, id).await?;
            deleted.push(order.order_number);
        }

        audit::record(
            &mut tx,
            Some(actor),
            "Orders deleted",
            "order",
            single_id(ids),
            json!({ "order_numbers": deleted }),
        )
        .await?;

        tx.commit().await?;

        info!(count = deleted.len(), "Orders deleted");
        Ok(deleted.len() as u64)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Record a payment.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Invalid` if the amount is not positive.
    /// Returns `OrderError::NotFound` if the order doesn't exist.
    /// Returns `OrderError::Repository` if a query fails.
    pub async fn add_payment(
        &self,
        order_id: OrderId,
        amount: Decimal,
        method: PaymentMethod,
        comment: Option<&str>,
        actor: UserId,
    ) -> Result<(), OrderError> {
        if amount <= Decimal::ZERO {
            return Err(OrderError::Invalid("Amount must be positive".to_owned()));
        }
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        self.record_payment(order_id, amount, method, comment, "Payment added", actor)
            .await
    }

    /// Record a cash refund as a negative payment.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Invalid` if the amount is not positive.
    /// Returns `OrderError::NotFound` if the order doesn't exist.
    /// Returns `OrderError::Repository` if a query fails.
    pub async fn refund(
        &self,
        order_id: OrderId,
        amount: Decimal,
        reason: &str,
        actor: UserId,
    ) -> Result<(), OrderError> {
        if amount <= Decimal::ZERO {
            return Err(OrderError::Invalid("Amount must be positive".to_owned()));
        }
        let comment = format!("Refund: {}", reason.trim());
        self.record_payment(
            order_id,
            -amount,
            PaymentMethod::Cash,
            Some(&comment),
            "Order refunded",
            actor,
        )
        .await
    }

    async fn record_payment(
        &self,
        order_id: OrderId,
        amount: Decimal,
        method: PaymentMethod,
        comment: Option<&str>,
        action: &str,
        actor: UserId,
    ) -> Result<(), OrderError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(&mut tx, order_id)
            .await?
            .ok_or(OrderError::NotFound)?;

        orders::insert_payment(&mut tx, order_id, amount, method, false, comment, actor).await?;

        audit::record(
            &mut tx,
            Some(actor),
            action,
            "order",
            Some(order_id.as_uuid()),
            json!({
                "order_number": order.order_number,
                "amount": amount,
                "method": method,
                "comment": comment,
            }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Store a file against an order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Invalid` for empty or oversized files.
    /// Returns `OrderError::NotFound` if the order doesn't exist.
    /// Returns `OrderError::Storage` if the file can't be written.
    /// Returns `OrderError::Repository` if a query fails.
    #[instrument(skip(self, storage, upload), fields(file_name = upload.file_name, size = upload.bytes.len()))]
    pub async fn upload_attachment(
        &self,
        order_id: OrderId,
        upload: &Upload<'_>,
        storage: &LocalStorage,
        actor: UserId,
    ) -> Result<AttachmentId, OrderError> {
        if upload.bytes.is_empty() {
            return Err(OrderError::Invalid("File is empty".to_owned()));
        }
        if upload.bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(OrderError::Invalid("File is larger than 20 MB".to_owned()));
        }
        let order = self.orders.get(order_id).await?.ok_or(OrderError::NotFound)?;

        let id = AttachmentId::generate();
        let file_key = attachment_key(order_id, id, upload.file_name);
        let file_url = format!("/orders/{order_id}/attachments/{id}");
        storage.write(&file_key, upload.bytes).await?;

        let saved = self
            .insert_attachment(&order.order_number, upload, id, order_id, &file_key, &file_url, actor)
            .await;
        if saved.is_err()
            && let Err(e) = storage.delete(&file_key).await
        {
            warn!(file_key = %file_key, error = %e, "Failed to remove orphaned upload");
        }
        saved?;

        info!(attachment_id = %id, "Attachment uploaded");
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_attachment(
        &self,
        order_number: &str,
        upload: &Upload<'_>,
        id: AttachmentId,
        order_id: OrderId,
        file_key: &str,
        file_url: &str,
        actor: UserId,
    ) -> Result<(), OrderError> {
        let file_size = i64::try_from(upload.bytes.len()).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await?;

        orders::insert_attachment(
            &mut tx,
            &NewAttachment {
                id,
                order_id,
                file_name: upload.file_name,
                file_key,
                file_url,
                file_size,
                content_type: upload.content_type,
                created_by: actor,
            },
        )
        .await?;

        audit::record(
            &mut tx,
            Some(actor),
            "Attachment uploaded",
            "order",
            Some(order_id.as_uuid()),
            json!({ "order_number": order_number, "file_name": upload.file_name, "size": file_size }),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Take a reservation or fail naming the item.
async fn reserve_or_fail(
    conn: &mut PgConnection,
    item_id: InventoryItemId,
    quantity: i32,
) -> Result<(), OrderError> {
    if inventory::reserve(conn, item_id, quantity).await? {
        return Ok(());
    }
    let name = inventory::item_name(conn, item_id).await?;
    Err(OrderError::InsufficientStock(name))
}

/// Ship one linked line: consume the reservation, take the units from the
/// fullest location and write the ledger entry.
async fn ship_line(
    conn: &mut PgConnection,
    item_id: InventoryItemId,
    quantity: i32,
    order_number: &str,
    actor: UserId,
) -> Result<(), RepositoryError> {
    let Some(item) = inventory::lock_item(conn, item_id).await? else {
        return Ok(());
    };

    inventory::consume_reserved(conn, item_id, quantity).await?;

    let location = inventory::largest_stock_location(conn, item_id, quantity).await?;
    if let Some(location_id) = location {
        inventory::add_location_stock(conn, item_id, location_id, -quantity).await?;
    }

    inventory::insert_transaction(
        conn,
        &NewTransaction {
            reason: Some(format!("Shipment: order #{order_number}")),
            location_id: location,
            cost_price: item.cost_price,
            ..NewTransaction::new(item_id, TransactionType::Out, -quantity, Some(actor))
        },
    )
    .await?;

    Ok(())
}

fn validate_new_order(input: &NewOrder) -> Result<(), OrderError> {
    if input.items.is_empty() {
        return Err(OrderError::Invalid("Add at least one item".to_owned()));
    }
    for item in &input.items {
        if item.description.trim().is_empty() {
            return Err(OrderError::Invalid("Every item needs a description".to_owned()));
        }
        if item.quantity < 1 {
            return Err(OrderError::Invalid("Quantity must be at least 1".to_owned()));
        }
        if item.price < Decimal::ZERO {
            return Err(OrderError::Invalid("Price cannot be negative".to_owned()));
        }
    }
    if input.advance_amount < Decimal::ZERO {
        return Err(OrderError::Invalid("Advance cannot be negative".to_owned()));
    }
    Ok(())
}

/// Storage key of an attachment: `orders/{order}/{attachment}-{sanitised name}`.
#[must_use]
pub fn attachment_key(order_id: OrderId, id: AttachmentId, file_name: &str) -> String {
    format!("orders/{order_id}/{id}-{}", sanitize_file_name(file_name))
}

/// A checkbox or select value as a boolean.
///
/// # Errors
///
/// Returns `OrderError::Invalid` for anything unrecognised.
pub fn parse_flag(value: &str) -> Result<bool, OrderError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" | "" => Ok(false),
        other => Err(OrderError::Invalid(format!("invalid flag: {other}"))),
    }
}

/// A deadline from a form: empty clears it; a date means midnight UTC.
///
/// Accepts RFC 3339, `datetime-local` (`2026-03-01T14:30`) and plain dates.
///
/// # Errors
///
/// Returns `OrderError::Invalid` for anything else.
pub fn parse_deadline(value: &str) -> Result<Option<DateTime<Utc>>, OrderError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Ok(Some(Utc.from_utc_datetime(&dt)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Some(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))));
    }
    Err(OrderError::Invalid(format!("invalid deadline: {value}")))
}

fn single_id(ids: &[OrderId]) -> Option<uuid::Uuid> {
    match ids {
        [id] => Some(id.as_uuid()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use merch_crm_core::{ClientId, OrderCategory};

    use super::*;
    use crate::models::NewOrderItem;

    fn order(items: Vec<NewOrderItem>) -> NewOrder {
        NewOrder {
            client_id: ClientId::generate(),
            category: OrderCategory::Print,
            priority: Priority::Normal,
            is_urgent: false,
            deadline: None,
            promocode: None,
            advance_amount: Decimal::ZERO,
            payment_method: PaymentMethod::Cash,
            items,
        }
    }

    fn item(description: &str, quantity: i32, price: i64) -> NewOrderItem {
        NewOrderItem {
            description: description.to_owned(),
            quantity,
            price: Decimal::from(price),
            inventory_id: None,
        }
    }

    #[test]
    fn test_validate_new_order() {
        assert!(validate_new_order(&order(vec![item("Hoodie", 2, 1500)])).is_ok());
        assert!(validate_new_order(&order(vec![])).is_err());
        assert!(validate_new_order(&order(vec![item("Hoodie", 0, 1500)])).is_err());
        assert!(validate_new_order(&order(vec![item("Hoodie", 1, -1)])).is_err());
        assert!(validate_new_order(&order(vec![item("  ", 1, 10)])).is_err());
        // Free items are fine.
        assert!(validate_new_order(&order(vec![item("Sticker", 10, 0)])).is_ok());

        let mut negative_advance = order(vec![item("Cap", 1, 500)]);
        negative_advance.advance_amount = Decimal::from(-1);
        assert!(validate_new_order(&negative_advance).is_err());
    }

    #[test]
    fn test_parse_deadline() {
        assert_eq!(parse_deadline("").unwrap(), None);
        assert_eq!(
            parse_deadline("2026-03-01").unwrap().unwrap().to_rfc3339(),
            "2026-03-01T00:00:00+00:00"
        );
        assert_eq!(
            parse_deadline("2026-03-01T14:30").unwrap().unwrap().to_rfc3339(),
            "2026-03-01T14:30:00+00:00"
        );
        assert_eq!(
            parse_deadline("2026-03-01T14:30:00+03:00")
                .unwrap()
                .unwrap()
                .to_rfc3339(),
            "2026-03-01T11:30:00+00:00"
        );
        assert!(parse_deadline("next friday").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("on").unwrap());
        assert!(parse_flag("TRUE").unwrap());
        assert!(!parse_flag("").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_attachment_key() {
        let order_id = OrderId::generate();
        let id = AttachmentId::generate();
        assert_eq!(
            attachment_key(order_id, id, "logo final.png"),
            format!("orders/{order_id}/{id}-logo_final.png")
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let e = OrderError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Done,
        };
        assert_eq!(e.to_string(), "cannot change status from shipped to done");
    }
}

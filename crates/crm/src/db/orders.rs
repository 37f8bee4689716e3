//! Order repository and transactional order writes.
//!
//! `OrderRepository` serves the read paths. The free functions below take a
//! `&mut PgConnection` and are composed into transactions by
//! [`crate::services::orders`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use merch_crm_core::{
    AttachmentId, ClientId, InventoryItemId, OrderCategory, OrderId, OrderItemId, OrderStatus,
    PaymentId, PaymentMethod, Priority, PromocodeId, UserId,
};

use super::{RepositoryError, like_pattern, page_window, total_pages};
use crate::models::{
    Attachment, NewOrderItem, Order, OrderDetails, OrderFilter, OrderItem, OrderListRow, OrderPage,
    OrderStats, Payment,
};

/// Audit action written on every status change; production stats count it.
pub const STATUS_CHANGED: &str = "Order status changed";

/// Advisory lock key serialising order number allocation.
const ORDER_NUMBER_LOCK: i64 = 0x4f52_445f_4e55_4d;

const SELECT_ORDER: &str = r"
    SELECT o.id, o.order_number, o.client_id, c.name AS client_name,
           c.phone AS client_phone, c.email AS client_email, o.status, o.category,
           o.total_amount, o.advance_amount, o.discount_amount, o.priority, o.is_urgent,
           o.deadline, o.promocode_id, p.code AS promocode_code, o.created_by,
           u.name AS creator_name, o.is_archived, o.cancel_reason, o.created_at, o.updated_at
    FROM crm.orders o
    JOIN crm.clients c ON c.id = o.client_id
    LEFT JOIN crm.promocodes p ON p.id = o.promocode_id
    LEFT JOIN crm.users u ON u.id = o.created_by
";

const SELECT_LIST_ROW: &str = r"
    SELECT o.id, o.order_number, o.client_id, c.name AS client_name,
           c.phone AS client_phone, o.status, o.category, o.priority, o.is_urgent,
           o.total_amount,
           COALESCE((SELECT SUM(amount) FROM crm.payments WHERE order_id = o.id), 0) AS paid_amount,
           o.deadline, o.is_archived, o.created_at
    FROM crm.orders o
    JOIN crm.clients c ON c.id = o.client_id
";

const LIST_WHERE: &str = r"
    WHERE o.is_archived = $1
      AND ($2::timestamptz IS NULL OR o.created_at >= $2)
      AND ($3::timestamptz IS NULL OR o.created_at <= $3)
      AND ($4::text IS NULL OR o.order_number ILIKE $4 OR c.name ILIKE $4
           OR c.phone ILIKE $4 OR c.email ILIKE $4)
      AND ($5::crm.order_status IS NULL OR o.status = $5)
";

// =============================================================================
// Repository
// =============================================================================

/// Repository for order reads.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// One page of orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &OrderFilter) -> Result<OrderPage, RepositoryError> {
        let pattern = like_pattern(filter.search.as_deref());
        let limit = if filter.limit == 0 {
            super::PAGE_SIZE
        } else {
            i64::from(filter.limit)
        };
        let (limit, offset) = page_window(filter.page, limit);

        let orders = sqlx::query_as::<_, OrderListRow>(&format!(
            "{SELECT_LIST_ROW} {LIST_WHERE} ORDER BY o.created_at DESC LIMIT $6 OFFSET $7"
        ))
        .bind(filter.archived)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&pattern)
        .bind(filter.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            r"SELECT COUNT(*) FROM crm.orders o
              JOIN crm.clients c ON c.id = o.client_id {LIST_WHERE}"
        ))
        .bind(filter.archived)
        .bind(filter.from)
        .bind(filter.to)
        .bind(&pattern)
        .bind(filter.status)
        .fetch_one(self.pool)
        .await?;

        Ok(OrderPage {
            orders,
            total,
            total_pages: total_pages(total, limit),
        })
    }

    /// The most recent non-archived orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent(&self, limit: i64) -> Result<Vec<OrderListRow>, RepositoryError> {
        let orders = sqlx::query_as::<_, OrderListRow>(&format!(
            "{SELECT_LIST_ROW} WHERE NOT o.is_archived ORDER BY o.created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// A client's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_client(
        &self,
        client_id: ClientId,
        limit: i64,
    ) -> Result<Vec<OrderListRow>, RepositoryError> {
        let orders = sqlx::query_as::<_, OrderListRow>(&format!(
            "{SELECT_LIST_ROW} WHERE o.client_id = $1 ORDER BY o.created_at DESC LIMIT $2"
        ))
        .bind(client_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Orders created in a period, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderListRow>, RepositoryError> {
        let orders = sqlx::query_as::<_, OrderListRow>(&format!(
            r"{SELECT_LIST_ROW}
              WHERE o.created_at BETWEEN $1 AND $2
              ORDER BY o.created_at DESC LIMIT $3"
        ))
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    /// Status counters and revenue for orders created in a period.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<OrderStats, RepositoryError> {
        let stats = sqlx::query_as::<_, OrderStats>(
            r"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'new') AS new,
                COUNT(*) FILTER (WHERE status IN ('design', 'production')) AS in_production,
                COUNT(*) FILTER (WHERE status IN ('done', 'shipped')) AS completed,
                COALESCE(SUM(total_amount) FILTER (WHERE status <> 'cancelled'), 0) AS revenue
            FROM crm.orders
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            ",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.pool)
        .await?;

        Ok(stats)
    }

    /// Get an order header by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!("{SELECT_ORDER} WHERE o.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(order)
    }

    /// An order with its items, payments and attachments.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn details(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItem>(
            r"
            SELECT oi.id, oi.order_id, oi.description, oi.quantity, oi.price, oi.inventory_id,
                   i.name AS inventory_name, oi.stage_prep_status, oi.stage_print_status,
                   oi.stage_application_status, oi.stage_packaging_status
            FROM crm.order_items oi
            LEFT JOIN crm.inventory_items i ON i.id = oi.inventory_id
            WHERE oi.order_id = $1
            ORDER BY oi.created_at
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let payments = sqlx::query_as::<_, Payment>(
            r"
            SELECT p.id, p.order_id, p.amount, p.method, p.is_advance, p.comment,
                   u.name AS created_by_name, p.created_at
            FROM crm.payments p
            LEFT JOIN crm.users u ON u.id = p.created_by
            WHERE p.order_id = $1
            ORDER BY p.created_at
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let attachments = sqlx::query_as::<_, Attachment>(
            r"
            SELECT id, order_id, file_name, file_key, file_url, file_size, content_type, created_at
            FROM crm.order_attachments
            WHERE order_id = $1
            ORDER BY created_at
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let paid_amount = payments.iter().map(|p| p.amount).sum();

        Ok(Some(OrderDetails {
            order,
            items,
            payments,
            attachments,
            paid_amount,
        }))
    }

    /// One attachment of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn attachment(
        &self,
        order_id: OrderId,
        attachment_id: AttachmentId,
    ) -> Result<Option<Attachment>, RepositoryError> {
        let attachment = sqlx::query_as::<_, Attachment>(
            r"
            SELECT id, order_id, file_name, file_key, file_url, file_size, content_type, created_at
            FROM crm.order_attachments
            WHERE order_id = $1 AND id = $2
            ",
        )
        .bind(order_id)
        .bind(attachment_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(attachment)
    }
}

// =============================================================================
// Transactional writes
// =============================================================================

/// Columns of an order needed to change its status.
#[derive(Debug, sqlx::FromRow)]
pub struct OrderLock {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub created_by: Option<UserId>,
}

/// A new order header.
#[derive(Debug)]
pub struct OrderHeader<'a> {
    pub order_number: &'a str,
    pub client_id: ClientId,
    pub category: OrderCategory,
    pub priority: Priority,
    pub is_urgent: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub advance_amount: Decimal,
    pub created_by: UserId,
}

/// Take the order-number lock and return the highest number issued with `prefix`.
///
/// The lock is held until the surrounding transaction ends.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_latest_number(
    conn: &mut PgConnection,
    prefix: &str,
) -> Result<Option<String>, RepositoryError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ORDER_NUMBER_LOCK)
        .execute(&mut *conn)
        .await?;

    let latest = sqlx::query_scalar::<_, String>(
        r"
        SELECT order_number FROM crm.orders
        WHERE order_number LIKE $1 || '%'
        ORDER BY LENGTH(order_number) DESC, order_number DESC
        LIMIT 1
        ",
    )
    .bind(prefix)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(latest)
}

/// Insert an order header with status `new`.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the number is already taken.
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_order(
    conn: &mut PgConnection,
    header: &OrderHeader<'_>,
) -> Result<OrderId, RepositoryError> {
    let id = sqlx::query_scalar::<_, OrderId>(
        r"
        INSERT INTO crm.orders (
            order_number, client_id, status, category, priority, is_urgent, deadline,
            advance_amount, created_by
        )
        VALUES ($1, $2, 'new', $3, $4, $5, $6, $7, $8)
        RETURNING id
        ",
    )
    .bind(header.order_number)
    .bind(header.client_id)
    .bind(header.category)
    .bind(header.priority)
    .bind(header.is_urgent)
    .bind(header.deadline)
    .bind(header.advance_amount)
    .bind(header.created_by)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        RepositoryError::on_constraint(e, "orders_order_number_key", "order number already taken")
    })?;

    Ok(id)
}

/// Insert one order line.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: &NewOrderItem,
) -> Result<OrderItemId, RepositoryError> {
    let id = sqlx::query_scalar::<_, OrderItemId>(
        r"
        INSERT INTO crm.order_items (order_id, description, quantity, price, inventory_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        ",
    )
    .bind(order_id)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.price)
    .bind(item.inventory_id)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

/// Store the computed totals and the applied promocode.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_totals(
    conn: &mut PgConnection,
    id: OrderId,
    total_amount: Decimal,
    discount_amount: Decimal,
    promocode_id: Option<PromocodeId>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE crm.orders
        SET total_amount = $2, discount_amount = $3, promocode_id = $4
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(total_amount)
    .bind(discount_amount)
    .bind(promocode_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Record a payment; negative amounts are refunds.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_payment(
    conn: &mut PgConnection,
    order_id: OrderId,
    amount: Decimal,
    method: PaymentMethod,
    is_advance: bool,
    comment: Option<&str>,
    created_by: UserId,
) -> Result<PaymentId, RepositoryError> {
    let id = sqlx::query_scalar::<_, PaymentId>(
        r"
        INSERT INTO crm.payments (order_id, amount, method, is_advance, comment, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        ",
    )
    .bind(order_id)
    .bind(amount)
    .bind(method)
    .bind(is_advance)
    .bind(comment)
    .bind(created_by)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

/// Lock an order row for a status change.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_order(
    conn: &mut PgConnection,
    id: OrderId,
) -> Result<Option<OrderLock>, RepositoryError> {
    let order = sqlx::query_as::<_, OrderLock>(
        "SELECT id, order_number, status, created_by FROM crm.orders WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(order)
}

/// `(inventory item, quantity)` for every inventory-linked line of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn linked_lines(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Vec<(InventoryItemId, i32)>, RepositoryError> {
    let lines = sqlx::query_as::<_, (InventoryItemId, i32)>(
        r"
        SELECT inventory_id, quantity FROM crm.order_items
        WHERE order_id = $1 AND inventory_id IS NOT NULL
        ",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;

    Ok(lines)
}

/// Inventory-linked lines of the given clients' orders that still hold a reservation.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn reserved_lines_for_clients(
    conn: &mut PgConnection,
    client_ids: &[ClientId],
) -> Result<Vec<(InventoryItemId, i32)>, RepositoryError> {
    let lines = sqlx::query_as::<_, (InventoryItemId, i32)>(
        r"
        SELECT oi.inventory_id, oi.quantity
        FROM crm.order_items oi
        JOIN crm.orders o ON o.id = oi.order_id
        WHERE o.client_id = ANY($1)
          AND oi.inventory_id IS NOT NULL
          AND o.status IN ('new', 'design', 'production')
        ",
    )
    .bind(client_ids)
    .fetch_all(conn)
    .await?;

    Ok(lines)
}

/// Store a new status and cancel reason.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
    cancel_reason: Option<&str>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE crm.orders
        SET status = $2,
            cancel_reason = CASE WHEN $2 = 'cancelled'::crm.order_status THEN $3 ELSE NULL END
        WHERE id = $1
        ",
    )
    .bind(id)
    .bind(status)
    .bind(cancel_reason)
    .execute(conn)
    .await?;

    Ok(())
}

/// Set `is_urgent`.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_urgent(
    conn: &mut PgConnection,
    id: OrderId,
    is_urgent: bool,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE crm.orders SET is_urgent = $2 WHERE id = $1")
        .bind(id)
        .bind(is_urgent)
        .execute(conn)
        .await?;
    Ok(())
}

/// Set the priority.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_priority(
    conn: &mut PgConnection,
    id: OrderId,
    priority: Priority,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE crm.orders SET priority = $2 WHERE id = $1")
        .bind(id)
        .bind(priority)
        .execute(conn)
        .await?;
    Ok(())
}

/// Set or clear the deadline.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_deadline(
    conn: &mut PgConnection,
    id: OrderId,
    deadline: Option<DateTime<Utc>>,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE crm.orders SET deadline = $2 WHERE id = $1")
        .bind(id)
        .bind(deadline)
        .execute(conn)
        .await?;
    Ok(())
}

/// Archive or restore orders.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the update fails.
pub async fn set_archived(
    conn: &mut PgConnection,
    ids: &[OrderId],
    archived: bool,
) -> Result<u64, RepositoryError> {
    let updated = sqlx::query("UPDATE crm.orders SET is_archived = $2 WHERE id = ANY($1)")
        .bind(ids)
        .bind(archived)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(updated)
}

/// Delete an order; items, payments and attachments cascade.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the delete fails.
pub async fn delete(conn: &mut PgConnection, id: OrderId) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM crm.orders WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

/// A stored order attachment.
#[derive(Debug)]
pub struct NewAttachment<'a> {
    pub id: AttachmentId,
    pub order_id: OrderId,
    pub file_name: &'a str,
    pub file_key: &'a str,
    pub file_url: &'a str,
    pub file_size: i64,
    pub content_type: Option<&'a str>,
    pub created_by: UserId,
}

/// Insert an attachment row.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_attachment(
    conn: &mut PgConnection,
    attachment: &NewAttachment<'_>,
) -> Result<AttachmentId, RepositoryError> {
    let id = sqlx::query_scalar::<_, AttachmentId>(
        r"
        INSERT INTO crm.order_attachments
            (id, order_id, file_name, file_key, file_url, file_size, content_type, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        ",
    )
    .bind(attachment.id)
    .bind(attachment.order_id)
    .bind(attachment.file_name)
    .bind(attachment.file_key)
    .bind(attachment.file_url)
    .bind(attachment.file_size)
    .bind(attachment.content_type)
    .bind(attachment.created_by)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

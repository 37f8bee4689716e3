//! Order route handlers.
//!
//! List, new-order form, order card with inline edits, status changes,
//! payments, refunds, attachments and bulk actions.

use std::collections::HashMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};

use merch_crm_core::{
    AttachmentId, ClientId, InventoryItemId, OrderCategory, OrderId, OrderStatus, PaymentMethod,
    Priority,
};

use crate::db::{self, ClientRepository, InventoryRepository, OrderRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{
    ClientOption, InventoryItem, NewOrder, NewOrderItem, OrderDetails, OrderFilter, OrderListRow,
    OrderStats,
};
use crate::routes::{
    ActionResult, DateRangeQuery, Flash, Layout, checkbox, parse_amount, parse_enum, parse_id,
    parse_int, redirect_with, require_admin, require_management, require_id, selected_ids, text,
    with_flash,
};
use crate::services::orders::{MAX_ATTACHMENT_BYTES, parse_deadline};
use crate::services::{OrderService, Upload};
use crate::state::AppState;

/// Most item lines the new-order form submits.
pub const MAX_FORM_ITEMS: usize = 20;

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(index).post(create))
        .route("/orders/new", get(new_order))
        .route("/orders/bulk", post(bulk))
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/status", post(update_status))
        .route("/orders/{id}/field", post(update_field))
        .route("/orders/{id}/archive", post(archive))
        .route("/orders/{id}/delete", post(delete))
        .route("/orders/{id}/payments", post(add_payment))
        .route("/orders/{id}/refund", post(refund))
        .route(
            "/orders/{id}/attachments",
            post(upload_attachment).layer(DefaultBodyLimit::max(MAX_ATTACHMENT_BYTES + 64 * 1024)),
        )
        .route(
            "/orders/{id}/attachments/{attachment_id}",
            get(download_attachment),
        )
        .route("/api/orders/stats", get(stats))
}

// =============================================================================
// List
// =============================================================================

/// Order list query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub archived: Option<String>,
    pub page: Option<String>,
}

impl OrderListQuery {
    fn to_filter(&self) -> OrderFilter {
        let range = DateRangeQuery {
            from: self.from.clone(),
            to: self.to.clone(),
        };
        let has_range = text(self.from.as_ref()).is_some() || text(self.to.as_ref()).is_some();
        let (from, to) = range.resolve(365);

        OrderFilter {
            from: has_range.then_some(from),
            to: has_range.then_some(to),
            search: text(self.q.as_ref()),
            status: self.status.as_deref().and_then(|s| s.parse().ok()),
            archived: checkbox(self.archived.as_ref()),
            page: self
                .page
                .as_deref()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1)
                .max(1),
            limit: u32::try_from(db::PAGE_SIZE).unwrap_or(20),
        }
    }

    /// Link to another page with the same filters.
    #[must_use]
    pub fn page_link(&self, page: u32) -> String {
        let mut link = format!("/orders?page={page}");
        for (key, value) in [
            ("q", &self.q),
            ("status", &self.status),
            ("from", &self.from),
            ("to", &self.to),
            ("archived", &self.archived),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                link.push_str(&format!("&{key}={}", urlencoding::encode(value)));
            }
        }
        link
    }

    /// Current value of a filter, or "".
    #[must_use]
    pub fn value(&self, key: &str) -> &str {
        match key {
            "q" => self.q.as_deref(),
            "status" => self.status.as_deref(),
            "from" => self.from.as_deref(),
            "to" => self.to.as_deref(),
            _ => None,
        }
        .unwrap_or_default()
    }
}

/// Orders list page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersIndexTemplate {
    pub layout: Layout,
    pub orders: Vec<OrderListRow>,
    pub total: i64,
    pub page: u32,
    pub total_pages: i64,
    pub archived: bool,
    pub query: OrderListQuery,
    pub stats: OrderStats,
    pub statuses: &'static [OrderStatus],
}

/// Orders list page handler.
#[instrument(skip(user, state))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(query): Query<OrderListQuery>,
) -> Result<OrdersIndexTemplate, AppError> {
    let filter = query.to_filter();
    let repo = OrderRepository::new(state.pool());

    let mut page = repo.list(&filter).await?;
    if user.hides_client_contacts() {
        page.orders.iter_mut().for_each(OrderListRow::hide_contacts);
    }
    let stats = repo.stats(filter.from, filter.to).await?;

    Ok(OrdersIndexTemplate {
        layout: Layout::new(&state, &user, "/orders", flash).await,
        orders: page.orders,
        total: page.total,
        page: filter.page,
        total_pages: page.total_pages,
        archived: filter.archived,
        query,
        stats,
        statuses: OrderStatus::ALL,
    })
}

// =============================================================================
// Create
// =============================================================================

/// Preselected client for the new-order form.
#[derive(Debug, Deserialize)]
pub struct NewOrderQuery {
    pub client_id: Option<String>,
}

/// New order form template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/new.html")]
pub struct NewOrderTemplate {
    pub layout: Layout,
    pub clients: Vec<ClientOption>,
    pub items: Vec<InventoryItem>,
    pub selected_client: String,
    pub categories: &'static [OrderCategory],
    pub priorities: &'static [Priority],
    pub payment_methods: &'static [PaymentMethod],
    pub lines: Vec<usize>,
}

/// New order form handler.
#[instrument(skip(user, state))]
pub async fn new_order(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
    Query(query): Query<NewOrderQuery>,
) -> Result<NewOrderTemplate, AppError> {
    let mut clients = ClientRepository::new(state.pool()).options().await?;
    if user.hides_client_contacts() {
        for client in &mut clients {
            merch_crm_core::HIDDEN_CONTACT.clone_into(&mut client.phone);
        }
    }

    Ok(NewOrderTemplate {
        layout: Layout::new(&state, &user, "/orders", flash).await,
        clients,
        items: InventoryRepository::new(state.pool()).active().await?,
        selected_client: query.client_id.unwrap_or_default(),
        categories: OrderCategory::ALL,
        priorities: Priority::ALL,
        payment_methods: PaymentMethod::ALL,
        lines: (0..5).collect(),
    })
}

/// Read the numbered item lines (`item_description_N`, `item_quantity_N`,
/// `item_price_N`, `item_inventory_N`) of the new-order form.
///
/// Lines with a blank description are skipped.
fn parse_items(form: &HashMap<String, String>) -> Result<Vec<NewOrderItem>, AppError> {
    let field = |name: &str, n: usize| form.get(&format!("item_{name}_{n}")).map(String::as_str);

    let mut items = Vec::new();
    for n in 0..MAX_FORM_ITEMS {
        let Some(description) = text(form.get(&format!("item_description_{n}"))) else {
            continue;
        };
        items.push(NewOrderItem {
            description,
            quantity: parse_int("Quantity", field("quantity", n), 1)?,
            price: parse_amount("Price", field("price", n))?,
            inventory_id: parse_id::<InventoryItemId>("warehouse item", field("inventory", n))?,
        });
    }
    Ok(items)
}

/// Read the whole new-order form.
fn parse_new_order(form: &HashMap<String, String>) -> Result<NewOrder, AppError> {
    let get = |name: &str| form.get(name).map(String::as_str);

    Ok(NewOrder {
        client_id: require_id::<ClientId>("Client", get("client_id"))?,
        category: parse_enum("category", get("category").unwrap_or("print"))?,
        priority: parse_enum("priority", get("priority").unwrap_or("normal"))?,
        is_urgent: checkbox(form.get("is_urgent")),
        deadline: parse_deadline(get("deadline").unwrap_or_default())?,
        promocode: text(form.get("promocode")),
        advance_amount: parse_amount("Prepayment", get("advance_amount"))?,
        payment_method: parse_enum("payment method", get("payment_method").unwrap_or("cash"))?,
        items: parse_items(form)?,
    })
}

/// Create an order.
#[instrument(skip(user, state, form))]
pub async fn create(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let input = match parse_new_order(&form) {
        Ok(input) => input,
        Err(e) => return redirect_with("/orders/new", Err(e)),
    };

    match OrderService::new(state.pool()).create_order(&input, user.id).await {
        Ok(created) => {
            info!(order = %created.order_number, "Order created from form");
            Ok(Redirect::to(&with_flash(
                &format!("/orders/{}", created.id),
                "success",
                &format!("Order {} created", created.order_number),
            )))
        }
        Err(e) => redirect_with("/orders/new", Err(e.into())),
    }
}

// =============================================================================
// Card
// =============================================================================

/// Order card template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub layout: Layout,
    pub details: OrderDetails,
    pub balance_due: Decimal,
    pub next_statuses: &'static [OrderStatus],
    pub priorities: &'static [Priority],
    pub payment_methods: &'static [PaymentMethod],
    pub can_edit: bool,
    pub max_upload_mb: usize,
}

/// Order card handler.
#[instrument(skip(user, state))]
pub async fn show(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Query(flash): Query<Flash>,
) -> Result<OrderShowTemplate, AppError> {
    let mut details = OrderRepository::new(state.pool())
        .details(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    if user.hides_client_contacts() {
        details.order.hide_contacts();
    }

    let can_edit = details.order.created_by == Some(user.id) || user.is_management();
    Ok(OrderShowTemplate {
        layout: Layout::new(&state, &user, "/orders", flash).await,
        balance_due: details.order.balance_due(details.paid_amount),
        next_statuses: details.order.status.allowed_transitions(),
        details,
        priorities: Priority::ALL,
        payment_methods: PaymentMethod::ALL,
        can_edit,
        max_upload_mb: MAX_ATTACHMENT_BYTES / (1024 * 1024),
    })
}

/// Status change form.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
    pub cancel_reason: Option<String>,
}

/// Move an order to another status.
#[instrument(skip(user, state, form))]
pub async fn update_status(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let status: OrderStatus = parse_enum("status", &form.status)?;
        let reason = text(form.cancel_reason.as_ref());
        OrderService::new(state.pool())
            .update_status(id, status, reason.as_deref(), user.id)
            .await?;
        Ok::<_, AppError>(format!("Status changed to {}", status.label()))
    }
    .await;

    redirect_with(&format!("/orders/{id}"), outcome)
}

/// Inline field edit form.
#[derive(Debug, Deserialize)]
pub struct FieldForm {
    pub field: String,
    #[serde(default)]
    pub value: String,
}

/// Update one editable order field.
#[instrument(skip(user, state, form))]
pub async fn update_field(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Form(form): Form<FieldForm>,
) -> Result<Redirect, AppError> {
    let outcome = OrderService::new(state.pool())
        .update_field(id, &form.field, &form.value, &user)
        .await
        .map(|()| "Order updated".to_string())
        .map_err(AppError::from);

    redirect_with(&format!("/orders/{id}"), outcome)
}

/// Archive toggle form.
#[derive(Debug, Deserialize)]
pub struct ArchiveForm {
    pub archived: Option<String>,
}

/// Archive or restore an order. Admin or management only.
#[instrument(skip(user, state, form))]
pub async fn archive(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Form(form): Form<ArchiveForm>,
) -> Result<Redirect, AppError> {
    let archived = checkbox(form.archived.as_ref());
    let outcome = async {
        require_management(&user)?;
        OrderService::new(state.pool())
            .set_archived(&[id], archived, user.id)
            .await?;
        Ok::<_, AppError>(if archived { "Order archived" } else { "Order restored" }.to_string())
    }
    .await;

    redirect_with(&format!("/orders/{id}"), outcome)
}

/// Delete an order. Admin only.
#[instrument(skip(user, state))]
pub async fn delete(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Redirect, AppError> {
    if let Err(e) = require_admin(&user) {
        return redirect_with(&format!("/orders/{id}"), Err(e));
    }

    OrderService::new(state.pool()).delete(&[id], user.id).await?;
    Ok(Redirect::to(&with_flash("/orders", "success", "Order deleted")))
}

// =============================================================================
// Payments
// =============================================================================

/// Payment form.
#[derive(Debug, Deserialize)]
pub struct PaymentForm {
    pub amount: String,
    pub method: String,
    pub comment: Option<String>,
}

/// Record a payment against an order.
#[instrument(skip(user, state, form))]
pub async fn add_payment(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Form(form): Form<PaymentForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let amount = parse_amount("Amount", Some(&form.amount))?;
        let method: PaymentMethod = parse_enum("payment method", &form.method)?;
        let comment = text(form.comment.as_ref());
        OrderService::new(state.pool())
            .add_payment(id, amount, method, comment.as_deref(), user.id)
            .await?;
        Ok::<_, AppError>("Payment recorded".to_string())
    }
    .await;

    redirect_with(&format!("/orders/{id}"), outcome)
}

/// Refund form.
#[derive(Debug, Deserialize)]
pub struct RefundForm {
    pub amount: String,
    #[serde(default)]
    pub reason: String,
}

/// Refund part of an order.
#[instrument(skip(user, state, form))]
pub async fn refund(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Form(form): Form<RefundForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let amount = parse_amount("Amount", Some(&form.amount))?;
        OrderService::new(state.pool())
            .refund(id, amount, form.reason.trim(), user.id)
            .await?;
        Ok::<_, AppError>("Refund recorded".to_string())
    }
    .await;

    redirect_with(&format!("/orders/{id}"), outcome)
}

// =============================================================================
// Attachments
// =============================================================================

/// Upload a file to an order.
///
/// Expects one multipart field named `file`.
#[instrument(skip(user, state, multipart))]
pub async fn upload_attachment(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let outcome = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?
        {
            if field.name() != Some("file") {
                continue;
            }
            let file_name = field.file_name().unwrap_or("file").to_owned();
            let content_type = field.content_type().map(str::to_owned);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Invalid upload: {e}")))?;

            let upload = Upload {
                file_name: &file_name,
                content_type: content_type.as_deref(),
                bytes: &bytes,
            };
            OrderService::new(state.pool())
                .upload_attachment(id, &upload, state.storage(), user.id)
                .await?;
            return Ok(format!("File {file_name} uploaded"));
        }
        Err(AppError::BadRequest("No file selected".to_string()))
    }
    .await;

    redirect_with(&format!("/orders/{id}"), outcome)
}

/// Stream an attachment back.
#[instrument(skip(_user, state))]
pub async fn download_attachment(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path((id, attachment_id)): Path<(OrderId, AttachmentId)>,
) -> Result<Response, AppError> {
    let attachment = OrderRepository::new(state.pool())
        .attachment(id, attachment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    let bytes = state.storage().read(&attachment.file_key).await?;

    let content_type = attachment
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&attachment.file_name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// =============================================================================
// Bulk actions
// =============================================================================

/// Apply a bulk action to the selected orders.
///
/// Form fields: `action` (status, archive, unarchive, delete), the selected
/// ids, and `status` for the status action.
#[instrument(skip(user, state, form))]
pub async fn bulk(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let ids: Vec<OrderId> = selected_ids(&form);
        if ids.is_empty() {
            return Err(AppError::BadRequest("No orders selected".to_string()));
        }
        let service = OrderService::new(state.pool());

        let message = match form.get("action").map(String::as_str) {
            Some("status") => {
                let status: OrderStatus =
                    parse_enum("status", form.get("status").map_or("", String::as_str))?;
                let updated = service.bulk_update_status(&ids, status, user.id).await;
                format!("Status changed for {updated} of {} orders", ids.len())
            }
            Some("archive") => {
                require_management(&user)?;
                let n = service.set_archived(&ids, true, user.id).await?;
                format!("Archived orders: {n}")
            }
            Some("unarchive") => {
                require_management(&user)?;
                let n = service.set_archived(&ids, false, user.id).await?;
                format!("Restored orders: {n}")
            }
            Some("delete") => {
                require_admin(&user)?;
                let n = service.delete(&ids, user.id).await?;
                format!("Deleted orders: {n}")
            }
            _ => return Err(AppError::BadRequest("Unknown bulk action".to_string())),
        };
        Ok(message)
    }
    .await;

    redirect_with("/orders", outcome)
}

// =============================================================================
// JSON
// =============================================================================

/// Order counters for a period.
///
/// GET /api/orders/stats?from=&to=
#[instrument(skip(_user, state))]
pub async fn stats(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> Response {
    let (from, to) = range.resolve(30);
    let outcome = OrderRepository::new(state.pool())
        .stats(Some(from), Some(to))
        .await
        .map_err(AppError::from);
    ActionResult::respond(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use uuid::Uuid;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_items_skips_blank_lines() {
        let item = Uuid::new_v4().to_string();
        let form = form(&[
            ("item_description_0", "Hoodie with print"),
            ("item_quantity_0", "10"),
            ("item_price_0", "1 500,00"),
            ("item_inventory_0", &item),
            ("item_description_1", "  "),
            ("item_quantity_1", "3"),
            ("item_description_3", "Packaging"),
            ("item_price_3", ""),
        ]);

        let items = parse_items(&form).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 10);
        assert_eq!(items[0].price, "1500.00".parse::<Decimal>().unwrap());
        assert!(items[0].inventory_id.is_some());
        assert_eq!(items[1].quantity, 1);
        assert_eq!(items[1].price, Decimal::ZERO);
        assert!(items[1].inventory_id.is_none());
    }

    #[test]
    fn test_parse_items_rejects_bad_numbers() {
        let form = form(&[("item_description_0", "Cap"), ("item_quantity_0", "two")]);
        assert!(parse_items(&form).is_err());
    }

    #[test]
    fn test_parse_new_order_requires_client() {
        let err = parse_new_order(&form(&[("category", "print")])).unwrap_err();
        assert_eq!(err.user_message(), "Client is required");
    }

    #[test]
    fn test_parse_new_order_defaults() {
        let client = Uuid::new_v4().to_string();
        let order = parse_new_order(&form(&[
            ("client_id", &client),
            ("is_urgent", "on"),
            ("deadline", "2026-05-01"),
            ("item_description_0", "T-shirt"),
        ]))
        .unwrap();
        assert_eq!(order.category, OrderCategory::Print);
        assert_eq!(order.priority, Priority::Normal);
        assert_eq!(order.payment_method, PaymentMethod::Cash);
        assert!(order.is_urgent);
        assert!(order.deadline.is_some());
        assert_eq!(order.advance_amount, Decimal::ZERO);
        assert_eq!(order.items.len(), 1);
    }

    #[test]
    fn test_page_link() {
        let query = OrderListQuery {
            status: Some("done".to_string()),
            q: Some(String::new()),
            ..OrderListQuery::default()
        };
        assert_eq!(query.page_link(2), "/orders?page=2&status=done");
        assert_eq!(query.to_filter().status, Some(OrderStatus::Done));
        assert!(query.to_filter().from.is_none());
    }
}

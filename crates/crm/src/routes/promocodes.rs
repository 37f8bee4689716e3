//! Promocode route handlers.
//!
//! Management screens live under `/finance/promocodes`; the validation
//! endpoint is open to any signed-in user so the order form can preview a
//! discount.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    response::{Redirect, Response},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use merch_crm_core::{DiscountType, InventoryItemId, PromocodeId};

use crate::db::PromocodeRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{BulkPromocodes, CartItem, PromoConstraints, PromocodeInput, PromocodeListRow};
use crate::routes::{
    ActionResult, Flash, Layout, checkbox, parse_amount, parse_date, parse_enum, parse_int,
    redirect_with, require_management, text,
};
use crate::services::PromocodeService;
use crate::state::AppState;

const LIST_PATH: &str = "/finance/promocodes";

/// Build the promocodes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/finance/promocodes", get(index).post(create))
        .route("/finance/promocodes/bulk", post(bulk_create))
        .route("/finance/promocodes/{id}/edit", post(update))
        .route("/finance/promocodes/{id}/toggle", post(toggle))
        .route("/finance/promocodes/{id}/delete", post(delete))
        .route("/api/promocodes/validate", post(validate))
}

/// Promocode list template.
#[derive(Template, WebTemplate)]
#[template(path = "promocodes/index.html")]
pub struct PromocodesTemplate {
    pub layout: Layout,
    pub promocodes: Vec<PromocodeListRow>,
    pub total_saved: Decimal,
    pub active_count: usize,
    pub discount_types: &'static [DiscountType],
}

/// Promocode list handler.
#[instrument(skip(user, state))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<PromocodesTemplate, AppError> {
    require_management(&user)?;
    let promocodes = PromocodeRepository::new(state.pool()).list().await?;

    Ok(PromocodesTemplate {
        layout: Layout::new(&state, &user, LIST_PATH, flash).await,
        total_saved: promocodes.iter().map(|p| p.total_saved).sum(),
        active_count: promocodes.iter().filter(|p| p.promocode.is_active).count(),
        promocodes,
        discount_types: DiscountType::ALL,
    })
}

/// Start of a day in UTC.
fn day_start(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|d| d.and_utc())
}

/// Last second of a day in UTC.
fn day_end(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(23, 59, 59).map(|d| d.and_utc())
}

/// Comma or whitespace separated list.
fn split_list(raw: Option<&String>) -> impl Iterator<Item = &str> {
    raw.map(String::as_str)
        .unwrap_or_default()
        .split([',', '\n', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Optional usage limit; empty or zero means unlimited.
fn usage_limit(raw: Option<&str>) -> Result<Option<i32>, AppError> {
    let limit = parse_int("Usage limit", raw, 0)?;
    Ok((limit > 0).then_some(limit))
}

/// Promocode create and edit form.
#[derive(Debug, Deserialize)]
pub struct PromocodeForm {
    pub name: Option<String>,
    #[serde(default)]
    pub code: String,
    pub discount_type: String,
    pub value: Option<String>,
    pub min_order_amount: Option<String>,
    pub max_discount_amount: Option<String>,
    pub start_date: Option<String>,
    pub expires_at: Option<String>,
    pub usage_limit: Option<String>,
    pub is_active: Option<String>,
    pub admin_comment: Option<String>,
    /// Item ids, comma separated.
    pub included_products: Option<String>,
    /// Item ids, comma separated.
    pub excluded_products: Option<String>,
    /// Category names, comma separated.
    pub excluded_categories: Option<String>,
}

impl PromocodeForm {
    /// Validate the form into service input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for malformed numbers, dates or ids.
    pub fn to_input(&self) -> Result<PromocodeInput, AppError> {
        let ids = |raw: Option<&String>, field: &str| {
            split_list(raw)
                .map(|id| {
                    id.parse::<InventoryItemId>()
                        .map_err(|_| AppError::BadRequest(format!("Invalid {field}: {id}")))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(PromocodeInput {
            name: text(self.name.as_ref()),
            code: self.code.trim().to_uppercase(),
            discount_type: parse_enum("discount type", &self.discount_type)?,
            value: parse_amount("Value", self.value.as_deref())?,
            min_order_amount: parse_amount("Minimum order", self.min_order_amount.as_deref())?,
            max_discount_amount: parse_amount(
                "Maximum discount",
                self.max_discount_amount.as_deref(),
            )?,
            start_date: parse_date("Start date", self.start_date.as_deref())?.and_then(day_start),
            expires_at: parse_date("Expiry date", self.expires_at.as_deref())?.and_then(day_end),
            usage_limit: usage_limit(self.usage_limit.as_deref())?,
            is_active: checkbox(self.is_active.as_ref()),
            admin_comment: text(self.admin_comment.as_ref()),
            constraints: PromoConstraints {
                included_products: ids(self.included_products.as_ref(), "included product")?,
                excluded_products: ids(self.excluded_products.as_ref(), "excluded product")?,
                excluded_categories: split_list(self.excluded_categories.as_ref())
                    .map(str::to_owned)
                    .collect(),
            },
        })
    }
}

/// Create a promocode.
#[instrument(skip(user, state, form))]
pub async fn create(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<PromocodeForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        require_management(&user)?;
        let input = form.to_input()?;
        PromocodeService::new(state.pool())
            .create(&input, user.id)
            .await?;
        Ok::<_, AppError>(format!("Promocode {} created", input.code))
    }
    .await;

    redirect_with(LIST_PATH, outcome)
}

/// Update a promocode.
#[instrument(skip(user, state, form))]
pub async fn update(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<PromocodeId>,
    Form(form): Form<PromocodeForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        require_management(&user)?;
        let input = form.to_input()?;
        PromocodeService::new(state.pool())
            .update(id, &input, user.id)
            .await?;
        Ok::<_, AppError>(format!("Promocode {} updated", input.code))
    }
    .await;

    redirect_with(LIST_PATH, outcome)
}

/// Toggle form: the desired state.
#[derive(Debug, Deserialize)]
pub struct ToggleForm {
    pub active: Option<String>,
}

/// Activate or deactivate a promocode.
#[instrument(skip(user, state, form))]
pub async fn toggle(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<PromocodeId>,
    Form(form): Form<ToggleForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        require_management(&user)?;
        let active = checkbox(form.active.as_ref());
        PromocodeRepository::new(state.pool())
            .set_active(id, active, user.id)
            .await?;
        Ok::<_, AppError>(
            if active {
                "Promocode activated"
            } else {
                "Promocode deactivated"
            }
            .to_string(),
        )
    }
    .await;

    redirect_with(LIST_PATH, outcome)
}

/// Delete a promocode.
#[instrument(skip(user, state))]
pub async fn delete(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<PromocodeId>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        require_management(&user)?;
        PromocodeRepository::new(state.pool())
            .delete(id, user.id)
            .await?;
        Ok::<_, AppError>("Promocode deleted".to_string())
    }
    .await;

    redirect_with(LIST_PATH, outcome)
}

/// Bulk generation form.
#[derive(Debug, Deserialize)]
pub struct BulkForm {
    pub count: String,
    #[serde(default)]
    pub prefix: String,
    pub discount_type: String,
    pub value: Option<String>,
    pub min_order_amount: Option<String>,
    pub max_discount_amount: Option<String>,
    pub expires_at: Option<String>,
    pub usage_limit: Option<String>,
}

impl BulkForm {
    fn to_template(&self) -> Result<BulkPromocodes, AppError> {
        let count = parse_int("Count", Some(&self.count), 0)?;
        Ok(BulkPromocodes {
            count: u32::try_from(count).unwrap_or(0),
            prefix: self.prefix.trim().to_uppercase(),
            discount_type: parse_enum("discount type", &self.discount_type)?,
            value: parse_amount("Value", self.value.as_deref())?,
            min_order_amount: parse_amount("Minimum order", self.min_order_amount.as_deref())?,
            max_discount_amount: parse_amount(
                "Maximum discount",
                self.max_discount_amount.as_deref(),
            )?,
            expires_at: parse_date("Expiry date", self.expires_at.as_deref())?.and_then(day_end),
            // Generated codes are single use unless stated otherwise.
            usage_limit: Some(parse_int("Usage limit", self.usage_limit.as_deref(), 1)?.max(1)),
        })
    }
}

/// Generate a batch of random codes.
#[instrument(skip(user, state, form))]
pub async fn bulk_create(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Form(form): Form<BulkForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        require_management(&user)?;
        let template = form.to_template()?;
        let created = PromocodeService::new(state.pool())
            .bulk_create(&template, user.id)
            .await?;
        Ok::<_, AppError>(format!("Generated promocodes: {created}"))
    }
    .await;

    redirect_with(LIST_PATH, outcome)
}

/// Validation request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub code: String,
    pub total: Decimal,
    #[serde(default)]
    pub cart_items: Vec<CartItem>,
}

/// Check a code against a cart.
///
/// POST /api/promocodes/validate
#[instrument(skip(_user, state, body), fields(code = %body.code))]
pub async fn validate(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<ValidateRequest>,
) -> Response {
    let outcome = PromocodeService::new(state.pool())
        .validate(&body.code, body.total, &body.cart_items)
        .await
        .map_err(AppError::from);
    ActionResult::respond(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use uuid::Uuid;

    fn form() -> PromocodeForm {
        PromocodeForm {
            name: Some("Spring".to_string()),
            code: " spring10 ".to_string(),
            discount_type: "percentage".to_string(),
            value: Some("10".to_string()),
            min_order_amount: None,
            max_discount_amount: Some(String::new()),
            start_date: Some("2026-03-01".to_string()),
            expires_at: Some("2026-03-31".to_string()),
            usage_limit: Some("0".to_string()),
            is_active: Some("on".to_string()),
            admin_comment: None,
            included_products: None,
            excluded_products: None,
            excluded_categories: Some("Hoodies, caps".to_string()),
        }
    }

    #[test]
    fn test_form_to_input() {
        let input = form().to_input().unwrap();
        assert_eq!(input.code, "SPRING10");
        assert_eq!(input.discount_type, DiscountType::Percentage);
        assert_eq!(input.min_order_amount, Decimal::ZERO);
        assert_eq!(input.usage_limit, None);
        assert!(input.is_active);
        assert_eq!(
            input.expires_at.unwrap().to_rfc3339(),
            "2026-03-31T23:59:59+00:00"
        );
        assert_eq!(input.constraints.excluded_categories, vec!["Hoodies", "caps"]);
    }

    #[test]
    fn test_form_parses_product_ids() {
        let id = Uuid::new_v4();
        let mut form = form();
        form.included_products = Some(format!("{id}, "));
        let input = form.to_input().unwrap();
        assert_eq!(
            input.constraints.included_products,
            vec![InventoryItemId::new(id)]
        );

        form.excluded_products = Some("not-a-uuid".to_string());
        assert!(matches!(form.to_input(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_bulk_form_defaults_to_single_use() {
        let bulk = BulkForm {
            count: "25".to_string(),
            prefix: "vip".to_string(),
            discount_type: "fixed".to_string(),
            value: Some("500".to_string()),
            min_order_amount: None,
            max_discount_amount: None,
            expires_at: None,
            usage_limit: None,
        };
        let template = bulk.to_template().unwrap();
        assert_eq!(template.count, 25);
        assert_eq!(template.prefix, "VIP");
        assert_eq!(template.usage_limit, Some(1));
    }

    #[test]
    fn test_validate_request_uses_camel_case() {
        let body: ValidateRequest = serde_json::from_str(
            r#"{"code":"SPRING10","total":"1000","cartItems":[{"price":"500","quantity":2}]}"#,
        )
        .unwrap();
        assert_eq!(body.cart_items.len(), 1);
        assert_eq!(body.cart_items[0].line_total(), Decimal::from(1000));
    }
}

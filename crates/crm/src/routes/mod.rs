//! HTTP route handlers for the CRM.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! GET  /auth/login                        - Login page
//! POST /auth/login                        - Password login
//! POST /auth/logout                       - Logout
//!
//! # Dashboard
//! GET  /                                  - Overview; runs the daily checks
//!
//! # Clients
//! GET  /clients                           - Client list (search, filters, sort)
//! POST /clients                           - Create client (duplicate check)
//! GET  /clients/{id}                      - Client card
//! POST /clients/{id}/edit|comments|field|archive|delete
//! POST /clients/bulk                      - delete | archive | unarchive | manager
//! GET  /api/clients/duplicates            - Duplicate check (JSON)
//!
//! # Orders
//! GET  /orders, /orders/new, /orders/{id}
//! POST /orders                            - Create order
//! POST /orders/{id}/status|field|archive|delete|payments|refund|attachments
//! GET  /orders/{id}/attachments/{attachment_id}
//! POST /orders/bulk
//! GET  /api/orders/stats
//!
//! # Production
//! GET  /production
//! POST /production/items/{id}/stage|defect
//! GET  /api/production/stats
//!
//! # Warehouse
//! GET  /warehouse, /warehouse/items/{id}, /warehouse/history
//! POST /warehouse/items, /warehouse/items/{id}/edit|adjust|transfer
//! POST /warehouse/items/bulk, /warehouse/auto-archive
//! GET|POST /warehouse/categories, /warehouse/locations (+ edit/delete)
//!
//! # Finance (management only)
//! GET  /finance, /finance/transactions, /finance/salary, /finance/funds
//! POST /finance/expenses
//! GET|POST /finance/promocodes (+ bulk, edit, toggle, delete)
//! POST /api/promocodes/validate
//!
//! # Notifications
//! GET  /notifications
//! POST /notifications/{id}/read, /notifications/read-all
//! GET  /api/notifications/unread
//!
//! # Admin panel (administrators only)
//! /admin, /admin/branding, /admin/roles, /admin/departments, /admin/users,
//! /admin/audit, /admin/security, /admin/system, /admin/storage
//!
//! # Search
//! GET  /api/search?q=
//! ```
//!
//! HTML mutations are POST forms answered with a 303 redirect carrying a
//! `success` or `error` flash message in the query string. JSON endpoints
//! answer with [`ActionResult`].

use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    Json, Router,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use merch_crm_core::{UserId, non_empty, parse_optional_id};

use crate::db::NotificationRepository;
use crate::error::AppError;
use crate::models::{Branding, CurrentUser};
use crate::services::RequestMeta;
use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod clients;
pub mod dashboard;
pub mod finance;
pub mod notifications;
pub mod orders;
pub mod production;
pub mod promocodes;
pub mod search;
pub mod warehouse;

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(clients::router())
        .merge(orders::router())
        .merge(production::router())
        .merge(warehouse::router())
        .merge(finance::router())
        .merge(promocodes::router())
        .merge(notifications::router())
        .merge(admin::router())
        .merge(search::router())
}

// =============================================================================
// Layout
// =============================================================================

/// Signed-in user as shown in the layout.
#[derive(Debug, Clone)]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role_name: String,
    pub is_admin: bool,
    pub is_management: bool,
    pub hides_contacts: bool,
}

impl From<&CurrentUser> for UserView {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.to_string(),
            role_name: user.role_name.clone().unwrap_or_default(),
            is_admin: user.is_admin(),
            is_management: user.is_management(),
            hides_contacts: user.hides_client_contacts(),
        }
    }
}

/// Flash message carried in the query string after a redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Flash {
    pub success: Option<String>,
    pub error: Option<String>,
}

/// Data every page passes to `base.html`.
#[derive(Debug, Clone)]
pub struct Layout {
    pub current_user: UserView,
    pub current_path: String,
    pub branding: Branding,
    pub flash: Flash,
    pub unread_count: i64,
}

impl Layout {
    /// Collect layout data for a page.
    pub async fn new(
        state: &AppState,
        user: &CurrentUser,
        current_path: impl Into<String>,
        flash: Flash,
    ) -> Self {
        let unread_count = NotificationRepository::new(state.pool())
            .unread_count(user.id)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to count unread notifications");
                0
            });

        Self {
            current_user: UserView::from(user),
            current_path: current_path.into(),
            branding: state.settings().branding().await,
            flash,
            unread_count,
        }
    }

    /// Whether the nav link for `prefix` is the active one.
    #[must_use]
    pub fn is_active(&self, prefix: &str) -> bool {
        if prefix == "/" {
            return self.current_path == "/";
        }
        self.current_path.starts_with(prefix)
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Append a flash message to a redirect target.
#[must_use]
pub fn with_flash(path: &str, key: &str, message: &str) -> String {
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{key}={}", urlencoding::encode(message))
}

/// Redirect back to `path` with the outcome as a flash message.
///
/// Business-rule errors become an `error` flash; server errors propagate so
/// they are logged and answered with 500.
///
/// # Errors
///
/// Returns the original error if it is a server-side failure.
pub fn redirect_with(path: &str, outcome: Result<String, AppError>) -> Result<Redirect, AppError> {
    match outcome {
        Ok(message) => Ok(Redirect::to(&with_flash(path, "success", &message))),
        Err(e) if e.is_server_error() => Err(e),
        Err(e) => Ok(Redirect::to(&with_flash(path, "error", &e.user_message()))),
    }
}

/// JSON envelope for API endpoints: `{ success, data, error }`.
#[derive(Debug, Serialize)]
pub struct ActionResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ActionResult<T> {
    /// A successful result.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed result with a user-facing message.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Turn a handler outcome into a JSON response.
    ///
    /// Server errors keep the generic [`AppError`] response so they are
    /// captured and persisted.
    pub fn respond(outcome: Result<T, AppError>) -> Response {
        match outcome {
            Ok(data) => Json(Self::ok(data)).into_response(),
            Err(e) if e.is_server_error() => e.into_response(),
            Err(e) => (e.status(), Json(Self::err(e.user_message()))).into_response(),
        }
    }
}

/// Refuse users outside management.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for users who are neither admins nor in Management.
pub fn require_management(user: &CurrentUser) -> Result<(), AppError> {
    if user.is_management() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only management can perform this action".to_string(),
        ))
    }
}

/// Refuse users who are not administrators.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for non-admins.
pub fn require_admin(user: &CurrentUser) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only administrators can perform this action".to_string(),
        ))
    }
}

// =============================================================================
// Request metadata
// =============================================================================

/// Client IP and user agent, owned so they outlive the header map borrow.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Read the client's address from proxy headers and its user agent.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let ip_address = header("cf-connecting-ip")
            .or_else(|| header("x-forwarded-for").and_then(|s| s.split(',').next()))
            .or_else(|| header("x-real-ip"))
            .or_else(|| header("fly-client-ip"))
            .map(|s| s.trim().to_owned());

        Self {
            ip_address,
            user_agent: header("user-agent").map(str::to_owned),
        }
    }

    /// Borrow as the auth service's request metadata.
    #[must_use]
    pub fn meta(&self) -> RequestMeta<'_> {
        RequestMeta {
            ip_address: self.ip_address.as_deref(),
            user_agent: self.user_agent.as_deref(),
        }
    }
}

// =============================================================================
// Form parsing
// =============================================================================

/// Trimmed optional text; empty becomes `None`.
#[must_use]
pub fn text(value: Option<&String>) -> Option<String> {
    non_empty(value.map(String::as_str))
}

/// Parse a required enum value.
///
/// # Errors
///
/// Returns `AppError::BadRequest` naming the field when the value is unknown.
pub fn parse_enum<T: FromStr>(field: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid {field}")))
}

/// Parse an optional typed id; empty means none.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when a non-empty value is not a UUID.
pub fn parse_id<T: From<Uuid>>(field: &str, value: Option<&str>) -> Result<Option<T>, AppError> {
    parse_optional_id(value).map_err(|_| AppError::BadRequest(format!("Invalid {field}")))
}

/// Parse a required typed id.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when missing or not a UUID.
pub fn require_id<T: From<Uuid>>(field: &str, value: Option<&str>) -> Result<T, AppError> {
    parse_id(field, value)?.ok_or_else(|| AppError::BadRequest(format!("{field} is required")))
}

/// Parse a money amount; empty means zero.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when the value is not a number.
pub fn parse_amount(field: &str, value: Option<&str>) -> Result<Decimal, AppError> {
    parse_optional_amount(field, value).map(Option::unwrap_or_default)
}

/// Parse an optional money amount. Accepts `,` as the decimal separator.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when a non-empty value is not a number.
pub fn parse_optional_amount(field: &str, value: Option<&str>) -> Result<Option<Decimal>, AppError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .replace(' ', "")
            .replace(',', ".")
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{field} must be a number"))),
    }
}

/// Parse an integer; empty means `default`.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when the value is not an integer.
pub fn parse_int(field: &str, value: Option<&str>, default: i32) -> Result<i32, AppError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| AppError::BadRequest(format!("{field} must be a whole number"))),
    }
}

/// Parse an optional `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when the value is not a date.
pub fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{field} must be a date"))),
    }
}

/// HTML checkbox: present and not "false"/"off".
#[must_use]
pub fn checkbox(value: Option<&String>) -> bool {
    value.is_some_and(|v| !matches!(v.trim(), "" | "false" | "off" | "0"))
}

/// Ids selected on a list page.
///
/// Reads a comma-separated `ids` field and any `select_<uuid>` checkbox.
/// Unparseable entries are skipped.
#[must_use]
pub fn selected_ids<T: From<Uuid>>(form: &HashMap<String, String>) -> Vec<T> {
    let listed = form
        .get("ids")
        .map(|ids| ids.split(',').map(str::trim).collect::<Vec<_>>())
        .unwrap_or_default();
    let checked = form
        .iter()
        .filter(|(_, v)| checkbox(Some(v)))
        .filter_map(|(k, _)| k.strip_prefix("select_"));

    let mut ids: Vec<Uuid> = listed
        .into_iter()
        .chain(checked)
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter().map(T::from).collect()
}

/// `?from=YYYY-MM-DD&to=YYYY-MM-DD` date range.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl DateRangeQuery {
    /// Resolve to UTC instants, defaulting to the last `default_days` days.
    ///
    /// `to` is inclusive: the range ends at the start of the following day.
    #[must_use]
    pub fn resolve(&self, default_days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        let to = parse_date("to", self.to.as_deref())
            .ok()
            .flatten()
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(now, |d| d.and_utc());
        let from = parse_date("from", self.from.as_deref())
            .ok()
            .flatten()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or_else(|| to - Duration::days(default_days), |d| d.and_utc());
        (from, to)
    }

    /// Range from the first day of the current month until now.
    #[must_use]
    pub fn current_month() -> (DateTime<Utc>, DateTime<Utc>) {
        use chrono::Datelike;
        let now = Utc::now();
        let start = now
            .date_naive()
            .with_day(1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(now, |d| d.and_utc());
        (start, now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use merch_crm_core::{ClientId, OrderStatus};

    #[test]
    fn test_with_flash() {
        assert_eq!(
            with_flash("/clients", "success", "Client saved"),
            "/clients?success=Client%20saved"
        );
        assert_eq!(
            with_flash("/orders?page=2", "error", "a&b"),
            "/orders?page=2&error=a%26b"
        );
    }

    #[test]
    fn test_redirect_with_keeps_server_errors() {
        assert!(redirect_with("/", Ok("done".to_string())).is_ok());
        assert!(redirect_with("/", Err(AppError::BadRequest("nope".to_string()))).is_ok());
        assert!(redirect_with("/", Err(AppError::Internal("db down".to_string()))).is_err());
    }

    #[test]
    fn test_action_result_json() {
        let ok = serde_json::to_value(ActionResult::ok(3)).unwrap();
        assert_eq!(ok, serde_json::json!({ "success": true, "data": 3 }));

        let err = serde_json::to_value(ActionResult::<()>::err("Not allowed")).unwrap();
        assert_eq!(
            err,
            serde_json::json!({ "success": false, "error": "Not allowed" })
        );
    }

    #[test]
    fn test_action_result_business_error_status() {
        let response =
            ActionResult::<()>::respond(Err(AppError::Conflict("duplicate".to_string())));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("Price", None).unwrap(), Decimal::ZERO);
        assert_eq!(
            parse_amount("Price", Some("1 250,50")).unwrap(),
            "1250.50".parse::<Decimal>().unwrap()
        );
        assert!(parse_amount("Price", Some("abc")).is_err());
    }

    #[test]
    fn test_parse_enum_and_int() {
        assert_eq!(
            parse_enum::<OrderStatus>("status", " done ").unwrap(),
            OrderStatus::Done
        );
        assert!(parse_enum::<OrderStatus>("status", "lost").is_err());
        assert_eq!(parse_int("Quantity", Some(""), 7).unwrap(), 7);
        assert!(parse_int("Quantity", Some("1.5"), 0).is_err());
    }

    #[test]
    fn test_checkbox() {
        assert!(checkbox(Some(&"on".to_string())));
        assert!(!checkbox(Some(&"false".to_string())));
        assert!(!checkbox(None));
    }

    #[test]
    fn test_selected_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut form = HashMap::new();
        form.insert("ids".to_string(), format!("{a}, not-a-uuid"));
        form.insert(format!("select_{b}"), "on".to_string());
        form.insert(format!("select_{a}"), "on".to_string());
        form.insert("action".to_string(), "archive".to_string());

        let ids: Vec<ClientId> = selected_ids(&form);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&ClientId::new(a)));
        assert!(ids.contains(&ClientId::new(b)));
    }

    #[test]
    fn test_client_info_prefers_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("user-agent", "curl/8".parse().unwrap());
        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn test_date_range_defaults() {
        let (from, to) = DateRangeQuery::default().resolve(30);
        assert_eq!((to - from).num_days(), 30);

        let range = DateRangeQuery {
            from: Some("2026-01-01".to_string()),
            to: Some("2026-01-31".to_string()),
        };
        let (from, to) = range.resolve(30);
        assert_eq!(from.date_naive().to_string(), "2026-01-01");
        assert_eq!(to.date_naive().to_string(), "2026-02-01");
    }
}

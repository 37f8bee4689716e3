//! Dashboard route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use tracing::{instrument, warn};

use crate::db::{InventoryRepository, OrderRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{CriticalItem, OrderListRow, OrderStats};
use crate::routes::{DateRangeQuery, Flash, Layout};
use crate::services::NotificationService;
use crate::state::AppState;

/// How many orders the dashboard lists.
const RECENT_ORDERS: i64 = 5;

/// Dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub layout: Layout,
    pub stats: OrderStats,
    pub recent_orders: Vec<OrderListRow>,
    pub critical_items: Vec<CriticalItem>,
}

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// Dashboard page handler.
///
/// Loading the dashboard also runs the once-a-day checks. A failing check
/// is logged and never blocks the page.
#[instrument(skip(user, state))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<DashboardTemplate, AppError> {
    if let Err(e) = NotificationService::new(state.pool()).run_daily_checks().await {
        warn!(error = %e, "Daily checks failed");
    }

    let (from, to) = DateRangeQuery::current_month();
    let orders = OrderRepository::new(state.pool());
    let stats = orders.stats(Some(from), Some(to)).await?;
    let mut recent_orders = orders.recent(RECENT_ORDERS).await?;
    if user.hides_client_contacts() {
        recent_orders.iter_mut().for_each(OrderListRow::hide_contacts);
    }
    let critical_items = InventoryRepository::new(state.pool()).critical_items().await?;

    Ok(DashboardTemplate {
        layout: Layout::new(&state, &user, "/", flash).await,
        stats,
        recent_orders,
        critical_items,
    })
}

//! Production board route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::{Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use merch_crm_core::{OrderItemId, ProductionStage, StageStatus};

use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{ProductionItem, ProductionStats};
use crate::routes::{ActionResult, Flash, Layout, parse_enum, parse_int, redirect_with};
use crate::services::ProductionService;
use crate::state::AppState;

/// Build the production router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/production", get(index))
        .route("/production/items/{id}/stage", post(update_stage))
        .route("/production/items/{id}/defect", post(report_defect))
        .route("/api/production/stats", get(stats))
}

/// One stage cell on the board.
#[derive(Debug, Clone, Copy)]
pub struct StageCell {
    pub stage: ProductionStage,
    pub status: StageStatus,
}

/// A board row: the item and its four stage cells.
#[derive(Debug, Clone)]
pub struct BoardRow {
    pub item: ProductionItem,
    pub stages: Vec<StageCell>,
}

impl From<ProductionItem> for BoardRow {
    fn from(item: ProductionItem) -> Self {
        let stages = ProductionStage::ALL
            .iter()
            .map(|&stage| StageCell {
                stage,
                status: item.stage_status(stage),
            })
            .collect();
        Self { item, stages }
    }
}

/// Production board template.
#[derive(Template, WebTemplate)]
#[template(path = "production/index.html")]
pub struct ProductionTemplate {
    pub layout: Layout,
    pub rows: Vec<BoardRow>,
    pub stats: ProductionStats,
    pub statuses: &'static [StageStatus],
}

/// Production board handler.
#[instrument(skip(user, state))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<ProductionTemplate, AppError> {
    let (items, stats) = ProductionService::new(state.pool()).board().await?;

    Ok(ProductionTemplate {
        layout: Layout::new(&state, &user, "/production", flash).await,
        rows: items.into_iter().map(BoardRow::from).collect(),
        stats,
        statuses: StageStatus::ALL,
    })
}

/// Stage update form.
#[derive(Debug, Deserialize)]
pub struct StageForm {
    pub stage: String,
    pub status: String,
}

/// Set one stage of one item.
#[instrument(skip(user, state, form))]
pub async fn update_stage(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderItemId>,
    Form(form): Form<StageForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let stage: ProductionStage = parse_enum("stage", &form.stage)?;
        let status: StageStatus = parse_enum("stage status", &form.status)?;
        ProductionService::new(state.pool())
            .update_stage(id, stage, status, user.id)
            .await?;
        Ok::<_, AppError>(format!("{}: {}", stage.label(), status.label()))
    }
    .await;

    redirect_with("/production", outcome)
}

/// Defect report form.
#[derive(Debug, Deserialize)]
pub struct DefectForm {
    pub quantity: String,
    #[serde(default)]
    pub reason: String,
}

/// Write off spoiled stock for an item.
#[instrument(skip(user, state, form))]
pub async fn report_defect(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderItemId>,
    Form(form): Form<DefectForm>,
) -> Result<Redirect, AppError> {
    let outcome = async {
        let quantity = parse_int("Quantity", Some(&form.quantity), 0)?;
        let left = ProductionService::new(state.pool())
            .report_defect(id, quantity, form.reason.trim(), user.id)
            .await?;
        Ok::<_, AppError>(format!("Defect recorded, {left} left in stock"))
    }
    .await;

    redirect_with("/production", outcome)
}

/// Board counters as JSON.
///
/// GET /api/production/stats
#[instrument(skip(_user, state))]
pub async fn stats(RequireAuth(_user): RequireAuth, State(state): State<AppState>) -> Response {
    let outcome = ProductionService::new(state.pool())
        .board()
        .await
        .map(|(_, stats)| stats)
        .map_err(AppError::from);
    ActionResult::respond(outcome)
}

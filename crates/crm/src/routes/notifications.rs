//! Notification route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    extract::{Path, Query, State},
    response::{Redirect, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::instrument;

use merch_crm_core::NotificationId;

use crate::db::NotificationRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::Notification;
use crate::routes::{ActionResult, Flash, Layout, redirect_with};
use crate::state::AppState;

/// Build the notifications router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(index))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/api/notifications/unread", get(unread))
}

/// Notification list template.
#[derive(Template, WebTemplate)]
#[template(path = "notifications/index.html")]
pub struct NotificationsTemplate {
    pub layout: Layout,
    pub notifications: Vec<Notification>,
}

/// The signed-in user's latest notifications.
#[instrument(skip(user, state))]
pub async fn index(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Query(flash): Query<Flash>,
) -> Result<NotificationsTemplate, AppError> {
    let notifications = NotificationRepository::new(state.pool())
        .list(user.id)
        .await?;

    Ok(NotificationsTemplate {
        layout: Layout::new(&state, &user, "/notifications", flash).await,
        notifications,
    })
}

/// Mark one notification read.
#[instrument(skip(user, state))]
pub async fn mark_read(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Redirect, AppError> {
    NotificationRepository::new(state.pool())
        .mark_read(user.id, id)
        .await?;
    Ok(Redirect::to("/notifications"))
}

/// Mark every notification read.
#[instrument(skip(user, state))]
pub async fn mark_all_read(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let outcome = NotificationRepository::new(state.pool())
        .mark_all_read(user.id)
        .await
        .map(|n| format!("Marked as read: {n}"))
        .map_err(AppError::from);

    redirect_with("/notifications", outcome)
}

#[derive(Debug, Serialize)]
struct Unread {
    count: i64,
}

/// Unread badge counter.
///
/// GET /api/notifications/unread
#[instrument(skip(user, state))]
pub async fn unread(RequireAuth(user): RequireAuth, State(state): State<AppState>) -> Response {
    let outcome = NotificationRepository::new(state.pool())
        .unread_count(user.id)
        .await
        .map(|count| Unread { count })
        .map_err(AppError::from);
    ActionResult::respond(outcome)
}
